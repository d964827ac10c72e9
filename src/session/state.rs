use std::fmt;

/// Lifecycle of one session.
///
/// `Init -> Negotiating -> Active -> Terminating -> Closed`, with
/// `Negotiating -> Closed` on negotiation failure and `Init -> Closed` when
/// the session is torn down before negotiation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Init,
    Negotiating,
    Active,
    Terminating,
    Closed,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Negotiating => "negotiating",
            Self::Active => "active",
            Self::Terminating => "terminating",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Negotiating | Self::Closed)
                | (Self::Negotiating, Self::Active | Self::Closed)
                | (Self::Active, Self::Terminating)
                | (Self::Terminating, Self::Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal session transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// A session as seen by the client: the remotely assigned id and where it is
/// in its lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    id: Option<String>,
    state: SessionState,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Record the remote id. The first id wins; repeats are ignored.
    pub fn record_id(&mut self, id: impl Into<String>) -> bool {
        if self.id.is_some() {
            return false;
        }
        self.id = Some(id.into());
        true
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    ///
    /// # Errors
    /// Returns `IllegalTransition` and leaves the state unchanged.
    pub fn transition(&mut self, next: SessionState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition { from: self.state, to: next });
        }
        tracing::debug!(session_id = self.id.as_deref().unwrap_or("-"), "session {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Like [`Session::transition`] for transitions the caller knows are legal;
    /// an illegal one is logged and ignored.
    pub(crate) fn advance(&mut self, next: SessionState) {
        if let Err(err) = self.transition(next) {
            tracing::warn!("{err}");
        }
    }

    /// Drive the session to `Closed` along legal transitions from wherever it is.
    pub fn close(&mut self) {
        if self.state == SessionState::Active {
            self.state = SessionState::Terminating;
        }
        if self.state != SessionState::Closed {
            tracing::debug!(session_id = self.id.as_deref().unwrap_or("-"), "session {} -> closed", self.state);
            self.state = SessionState::Closed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_legal() {
        let mut session = Session::new();
        for next in [
            SessionState::Negotiating,
            SessionState::Active,
            SessionState::Terminating,
            SessionState::Closed,
        ] {
            session.transition(next).unwrap();
        }
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn failed_negotiation_skips_active() {
        let mut session = Session::new();
        session.transition(SessionState::Negotiating).unwrap();
        session.transition(SessionState::Closed).unwrap();
        assert!(session.transition(SessionState::Active).is_err());
    }

    #[test]
    fn active_cannot_jump_to_closed() {
        let mut session = Session::new();
        session.transition(SessionState::Negotiating).unwrap();
        session.transition(SessionState::Active).unwrap();
        let err = session.transition(SessionState::Closed).unwrap_err();
        assert_eq!(err.from, SessionState::Active);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn id_is_recorded_once() {
        let mut session = Session::new();
        assert!(session.record_id("sess_1"));
        assert!(!session.record_id("sess_2"));
        assert_eq!(session.id(), Some("sess_1"));
    }

    #[test]
    fn close_from_active_passes_through_terminating() {
        let mut session = Session::new();
        session.transition(SessionState::Negotiating).unwrap();
        session.transition(SessionState::Active).unwrap();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
    }
}
