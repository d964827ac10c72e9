#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Duplex real-time speech session client.
//!
//! Captures microphone audio, streams it to a speech-to-speech service over a
//! persistent message channel, and plays back or surfaces the streamed
//! response events as they arrive.

pub mod audio;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::{ChannelError, DecodeError, DeviceError, Error, NegotiationError, Result, ServerError};
pub use protocol::client_events::ClientEvent;
pub use protocol::codec::Codec;
pub use protocol::models::{
    AudioFormat, ContentPart, MaxTokens, Modality, SessionConfig, Temperature, ToolChoice, ToolSpec,
    TurnDetection, Voice,
};
pub use protocol::server_events::ServerEvent;
pub use session::{
    EndReason, EventHandlers, LogObserver, LoopOutcome, SessionBuilder, SessionEvent, SessionObserver,
    SessionReport, SessionState, SessionSupervisor, SpeechSession, ToolCall,
};
