use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::negotiator::negotiate_with_event_id;
use super::observer::SessionObserver;
use super::outcome::{EndReason, LoopSide, SessionReport};
use super::state::{Session, SessionState};
use super::uplink::DEFAULT_PACING;
use super::{downlink, uplink};
use crate::audio::{AudioCapture, AudioPlayback};
use crate::protocol::codec::Codec;
use crate::protocol::models::SessionConfig;
use crate::transport::{ChannelSender, MessageChannel};
use crate::{Error, Result};

/// How long the final `on_ended` notification may take once everything has
/// been released.
const ENDED_NOTIFY_TIMEOUT: Duration = Duration::from_secs(1);

/// Owns one session end to end: negotiation, the two data-plane loops, and
/// release of the channel and both devices.
///
/// Whichever loop finishes first ends the session; the other is cancelled and
/// awaited, then capture, playback and channel are each closed exactly once.
/// Cancelling the shutdown token has the same effect from the outside.
pub struct SessionSupervisor {
    config: SessionConfig,
    codec: Codec,
    pacing: Duration,
    observer: Box<dyn SessionObserver>,
    shutdown: CancellationToken,
    update_event_id: Option<String>,
}

impl SessionSupervisor {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            codec: Codec::new(),
            pacing: DEFAULT_PACING,
            observer: Box::new(()),
            shutdown: CancellationToken::new(),
            update_event_id: None,
        }
    }

    #[must_use]
    pub const fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub const fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub(crate) fn with_boxed_observer(mut self, observer: Box<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Token that interrupts the session when cancelled.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Client `event_id` sent with the `session.update`.
    #[must_use]
    pub fn with_update_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.update_event_id = Some(event_id.into());
        self
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Negotiate, run both loops to completion, and release everything.
    ///
    /// # Errors
    /// Returns `Error::Negotiation` if the handshake fails and
    /// `Error::Interrupted` if shutdown is requested before the session becomes
    /// active. Failures after that are reported in the [`SessionReport`].
    pub async fn run(
        self,
        channel: Box<dyn MessageChannel>,
        mut capture: Box<dyn AudioCapture>,
        mut playback: Box<dyn AudioPlayback>,
    ) -> Result<SessionReport> {
        let Self { config, codec, pacing, observer, shutdown, update_event_id } = self;
        let (mut sender, mut receiver) = channel.split();

        let mut pending = Session::new();
        pending.advance(SessionState::Negotiating);
        let negotiated = tokio::select! {
            biased;
            () = shutdown.cancelled() => None,
            result = negotiate_with_event_id(
                sender.as_mut(),
                receiver.as_mut(),
                &codec,
                &config,
                update_event_id.as_deref(),
            ) => Some(result),
        };
        let mut session = match negotiated {
            Some(Ok(session)) => session,
            Some(Err(err)) => {
                tracing::error!("Negotiation failed: {err}");
                release(capture.as_mut(), playback.as_mut(), sender.as_mut()).await;
                pending.close();
                return Err(Error::Negotiation(err));
            }
            None => {
                tracing::info!("Interrupted during negotiation");
                release(capture.as_mut(), playback.as_mut(), sender.as_mut()).await;
                pending.close();
                return Err(Error::Interrupted);
            }
        };
        if let Some(id) = session.id() {
            // A stalled observer must not hold off shutdown; the loops then
            // start already cancelled.
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {}
                () = observer.on_session_created(id) => {}
            }
        }

        let loops = shutdown.child_token();
        let (first, uplink_outcome, downlink_outcome) = {
            let up = uplink::run(capture.as_mut(), sender.as_mut(), &codec, pacing, &loops);
            let down = downlink::run(
                receiver.as_mut(),
                &codec,
                playback.as_mut(),
                observer.as_ref(),
                &mut session,
                &loops,
            );
            tokio::pin!(up);
            tokio::pin!(down);

            tokio::select! {
                outcome = &mut up => {
                    loops.cancel();
                    (LoopSide::Uplink, outcome, down.await)
                }
                outcome = &mut down => {
                    loops.cancel();
                    (LoopSide::Downlink, up.await, outcome)
                }
            }
        };

        let reason = match first {
            LoopSide::Uplink => uplink_outcome.reason(),
            LoopSide::Downlink => downlink_outcome.reason(),
        }
        .cloned()
        .unwrap_or(EndReason::Interrupted);

        session.advance(SessionState::Terminating);
        tracing::info!(first = ?first, "Session ending: {reason}");
        release(capture.as_mut(), playback.as_mut(), sender.as_mut()).await;
        drop(receiver);
        session.close();
        if tokio::time::timeout(ENDED_NOTIFY_TIMEOUT, observer.on_ended(&reason)).await.is_err() {
            tracing::warn!("Observer did not accept the end notification in time");
        }

        Ok(SessionReport {
            session_id: session.id().map(str::to_string),
            reason,
            first,
            uplink: uplink_outcome,
            downlink: downlink_outcome,
        })
    }
}

async fn release(capture: &mut dyn AudioCapture, playback: &mut dyn AudioPlayback, sender: &mut dyn ChannelSender) {
    capture.close().await;
    playback.close().await;
    sender.close().await;
    tracing::debug!("Session resources released");
}
