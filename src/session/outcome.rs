use std::fmt;

use crate::error::ChannelError;

/// Why a data-plane loop stopped on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The capture or playback device faulted.
    DeviceFault(String),
    /// The peer closed the channel normally.
    ChannelClosed,
    /// The channel went away abruptly.
    ChannelError(String),
    /// The service ended the session.
    Terminated(Option<String>),
    /// The service reported an error.
    RemoteError(String),
    /// The caller asked the session to stop.
    Interrupted,
}

impl From<ChannelError> for EndReason {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Closed => Self::ChannelClosed,
            ChannelError::Transport(reason) => Self::ChannelError(reason),
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceFault(reason) => write!(f, "audio device fault: {reason}"),
            Self::ChannelClosed => f.write_str("channel closed"),
            Self::ChannelError(reason) => write!(f, "channel error: {reason}"),
            Self::Terminated(Some(reason)) => write!(f, "session terminated: {reason}"),
            Self::Terminated(None) => f.write_str("session terminated"),
            Self::RemoteError(message) => write!(f, "remote error: {message}"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    Ended(EndReason),
    /// Stopped by cancellation before reaching an end of its own.
    Cancelled,
}

impl LoopOutcome {
    #[must_use]
    pub const fn reason(&self) -> Option<&EndReason> {
        match self {
            Self::Ended(reason) => Some(reason),
            Self::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSide {
    Uplink,
    Downlink,
}

/// What happened to an active session, returned once it is closed and all
/// resources are released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub session_id: Option<String>,
    /// The reason of whichever loop finished first.
    pub reason: EndReason,
    pub first: LoopSide,
    pub uplink: LoopOutcome,
    pub downlink: LoopOutcome,
}

impl SessionReport {
    /// The service ended the session, as opposed to a local fault or interruption.
    #[must_use]
    pub const fn ended_by_service(&self) -> bool {
        matches!(self.reason, EndReason::Terminated(_) | EndReason::ChannelClosed)
    }
}
