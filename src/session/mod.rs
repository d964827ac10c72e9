//! Session protocol engine.
//!
//! The supervisor negotiates once, then drives the uplink (capture -> channel)
//! and downlink (channel -> playback/observer) loops concurrently until one of
//! them ends, and releases every resource on the way out.

mod builder;
pub mod downlink;
pub mod negotiator;
mod observer;
mod outcome;
mod state;
mod supervisor;
pub mod uplink;

pub use builder::{SessionBuilder, SpeechSession};
pub use negotiator::{negotiate, negotiate_with_event_id};
pub use observer::{
    BoxFuture as HandlerFuture, EndedHandler, ErrorHandler, EventHandlers, LogObserver, ResponseDoneHandler,
    SessionCreatedHandler, SessionEvent, SessionObserver, TerminatedHandler, TextHandler, ToolCall, ToolCallHandler,
    TranscriptHandler,
};
pub use outcome::{EndReason, LoopOutcome, LoopSide, SessionReport};
pub use state::{IllegalTransition, Session, SessionState};
pub use supervisor::SessionSupervisor;
pub use uplink::DEFAULT_PACING;
