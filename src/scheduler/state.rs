//! Poll loop state machine.

use std::fmt;

/// Lifecycle state of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollState {
    /// No authenticated session; the next step logs in.
    #[default]
    NoSession,
    /// A session exists; the next step checks availability.
    Checking,
    /// Sleeping between cycles.
    Idle,
    /// Loop has stopped and cannot be resumed.
    Terminated,
}

impl PollState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - NoSession -> Checking
    /// - Checking -> Idle
    /// - Checking -> NoSession
    /// - Idle -> Checking
    /// - any non-terminal state -> Terminated
    pub fn can_transition_to(&self, target: PollState) -> bool {
        use PollState::*;
        matches!(
            (*self, target),
            (NoSession, Checking)
                | (Checking, Idle)
                | (Checking, NoSession)
                | (Idle, Checking)
                | (NoSession, Terminated)
                | (Checking, Terminated)
                | (Idle, Terminated)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: PollState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::PassabotError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Terminated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PollState::NoSession => "NO_SESSION",
            PollState::Checking => "CHECKING",
            PollState::Idle => "IDLE",
            PollState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
