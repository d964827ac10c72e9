use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error payload carried by a remote `error` event.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct ServerError {
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Failed to parse or serialize JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Header error: {0}")]
    Header(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),

    #[error("Session negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    #[error("Audio device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Invalid session config: {0}")]
    InvalidConfig(String),

    #[error("Invalid client event: {0}")]
    InvalidClientEvent(String),

    #[error("Session interrupted before it became active")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of the one-time `session.update` handshake.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("session rejected by server: {message}")]
    Rejected { message: String },

    #[error("unexpected reply to session.update: {event_type}")]
    Unexpected { event_type: String },

    #[error("malformed reply to session.update: {0}")]
    Malformed(String),

    #[error("failed to send session.update: {0}")]
    Send(String),

    #[error("session config rejected locally: {0}")]
    InvalidConfig(String),

    #[error("channel closed before the session was created")]
    ChannelClosed,
}

/// A single inbound message that could not be turned into a `ServerEvent`.
///
/// Never fatal: the downlink loop logs it and moves on.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no string `type` discriminator")]
    MissingType,

    #[error("malformed `{event_type}` payload: {reason}")]
    Malformed { event_type: String, reason: String },

    #[error("audio payload is not valid base64: {0}")]
    Audio(#[from] base64::DecodeError),
}

/// Fault reported by a capture or playback device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("no default {0} device available")]
    Unavailable(&'static str),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("audio device closed")]
    Closed,
}

/// Failure of one direction of a message channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,

    #[error("channel transport error: {0}")]
    Transport(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::Closed,
            other => Self::Transport(other.to_string()),
        }
    }
}
