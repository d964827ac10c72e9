use crate::error::{ChannelError, NegotiationError};
use crate::protocol::client_events::ClientEvent;
use crate::protocol::codec::Codec;
use crate::protocol::models::SessionConfig;
use crate::protocol::server_events::ServerEvent;
use crate::transport::{ChannelReceiver, ChannelSender};

use super::state::{Session, SessionState};

/// Run the one-time `session.update` handshake.
///
/// Sends exactly one `session.update` carrying `config`, then performs exactly
/// one receive and classifies the reply. There are no retries.
///
/// # Errors
/// - `InvalidConfig` if `config` fails local validation (nothing is sent)
/// - `Send` if the update could not be sent
/// - `Rejected` if the service answered with an `error` event
/// - `Unexpected` for any other event type
/// - `Malformed` if the reply could not be decoded
/// - `ChannelClosed` if the channel ended before a reply arrived
pub async fn negotiate(
    sender: &mut dyn ChannelSender,
    receiver: &mut dyn ChannelReceiver,
    codec: &Codec,
    config: &SessionConfig,
) -> Result<Session, NegotiationError> {
    negotiate_with_event_id(sender, receiver, codec, config, None).await
}

/// [`negotiate`], tagging the `session.update` with a client `event_id`.
///
/// # Errors
/// Same as [`negotiate`].
pub async fn negotiate_with_event_id(
    sender: &mut dyn ChannelSender,
    receiver: &mut dyn ChannelReceiver,
    codec: &Codec,
    config: &SessionConfig,
    event_id: Option<&str>,
) -> Result<Session, NegotiationError> {
    let mut session = Session::new();
    session.advance(SessionState::Negotiating);

    let update = ClientEvent::SessionUpdate {
        event_id: event_id.map(str::to_string),
        session: Box::new(config.clone()),
    };
    let text = codec
        .encode(&update)
        .map_err(|err| NegotiationError::InvalidConfig(err.to_string()))?;
    sender.send(text).await.map_err(|err| NegotiationError::Send(err.to_string()))?;
    tracing::debug!("session.update sent, awaiting reply");

    let reply = match receiver.recv().await {
        Ok(Some(text)) => text,
        Ok(None) | Err(ChannelError::Closed) => return Err(NegotiationError::ChannelClosed),
        Err(ChannelError::Transport(reason)) => {
            tracing::warn!("channel failed during negotiation: {reason}");
            return Err(NegotiationError::ChannelClosed);
        }
    };

    match codec.decode(&reply) {
        Ok(ServerEvent::SessionCreated { session_id }) => {
            session.record_id(session_id);
            session.advance(SessionState::Active);
            tracing::info!(session_id = session.id().unwrap_or_default(), "Session created");
            Ok(session)
        }
        Ok(ServerEvent::SessionError { message, code }) => {
            tracing::warn!(code = code.as_deref().unwrap_or("-"), "Session rejected: {message}");
            Err(NegotiationError::Rejected { message })
        }
        Ok(other) => Err(NegotiationError::Unexpected {
            event_type: other.event_type().to_string(),
        }),
        Err(err) => Err(NegotiationError::Malformed(err.to_string())),
    }
}
