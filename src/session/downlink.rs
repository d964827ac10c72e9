//! Channel -> playback/observer loop.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::observer::{SessionObserver, ToolCall};
use super::outcome::{EndReason, LoopOutcome};
use super::state::Session;
use crate::audio::AudioPlayback;
use crate::protocol::codec::Codec;
use crate::protocol::server_events::{ServerEvent, completed_transcript};
use crate::transport::ChannelReceiver;

/// Receive and dispatch inbound events one at a time, in arrival order, until
/// a terminal event, a playback fault, the channel ending, or `cancel`.
///
/// Undecodable messages and unknown event types are logged and skipped.
pub async fn run(
    receiver: &mut dyn ChannelReceiver,
    codec: &Codec,
    playback: &mut dyn AudioPlayback,
    observer: &dyn SessionObserver,
    session: &mut Session,
    cancel: &CancellationToken,
) -> LoopOutcome {
    let mut audio_chunks: u64 = 0;

    let outcome = loop {
        let received = tokio::select! {
            biased;
            () = cancel.cancelled() => break LoopOutcome::Cancelled,
            received = receiver.recv() => received,
        };
        let text = match received {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::info!("Channel closed by peer");
                break LoopOutcome::Ended(EndReason::ChannelClosed);
            }
            Err(err) => {
                tracing::warn!("Channel failed: {err}");
                break LoopOutcome::Ended(err.into());
            }
        };

        let event = match codec.decode(&text) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!("Skipping undecodable message: {err}");
                continue;
            }
        };

        let delivered = match event {
            ServerEvent::SessionCreated { session_id } => {
                if session.record_id(session_id.as_str()) {
                    notify(cancel, observer.on_session_created(&session_id)).await
                } else {
                    tracing::debug!(session_id, "Ignoring repeated session.created");
                    true
                }
            }
            ServerEvent::AudioDelta { pcm } => {
                if pcm.is_empty() {
                    continue;
                }
                let written = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break LoopOutcome::Cancelled,
                    written = playback.write(&pcm) => written,
                };
                if let Err(err) = written {
                    tracing::warn!("Playback device failed: {err}");
                    break LoopOutcome::Ended(EndReason::DeviceFault(err.to_string()));
                }
                audio_chunks += 1;
                true
            }
            ServerEvent::TranscriptDelta { text, is_final } => {
                notify(cancel, observer.on_transcript(&text, is_final)).await
            }
            ServerEvent::TextDelta { text } => notify(cancel, observer.on_text(&text)).await,
            ServerEvent::ResponseDone { response_id, output } => {
                let done = observer.on_response_done(response_id.as_deref(), completed_transcript(&output));
                notify(cancel, done).await
            }
            ServerEvent::ToolCall { call_id, name, arguments } => {
                let call = ToolCall { call_id, name, arguments };
                notify(cancel, observer.on_tool_call(&call)).await
            }
            ServerEvent::SessionTerminated { reason } => {
                notify(cancel, observer.on_terminated(reason.as_deref())).await;
                break LoopOutcome::Ended(EndReason::Terminated(reason));
            }
            ServerEvent::SessionError { message, .. } => {
                notify(cancel, observer.on_error(&message)).await;
                break LoopOutcome::Ended(EndReason::RemoteError(message));
            }
            unknown @ ServerEvent::Unknown { .. } => {
                tracing::debug!("Ignoring event: {}", unknown.event_type());
                true
            }
        };
        if !delivered {
            break LoopOutcome::Cancelled;
        }
    };

    tracing::debug!(audio_chunks, ?outcome, "Downlink stopped");
    outcome
}

/// Deliver one observer notification unless `cancel` fires first. Returns
/// `false` if the notification was abandoned.
async fn notify(cancel: &CancellationToken, notification: impl Future<Output = ()>) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = notification => true,
    }
}
