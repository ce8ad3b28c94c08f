//! Error types for passabot.

use std::time::Duration;

use thiserror::Error;

/// Main error type for passabot operations.
#[derive(Error, Debug)]
pub enum PassabotError {
    /// The identity provider rejected the credentials or the push approval.
    #[error("authentication rejected: {0}")]
    Authentication(String),

    /// The second-factor push was not approved before the deadline.
    #[error("second-factor approval not granted within {0:?}")]
    ApprovalTimeout(Duration),

    /// The booking site no longer accepts the current session.
    #[error("session is no longer authenticated")]
    SessionInvalid,

    /// A booking-site response could not be interpreted.
    #[error("response parse error: {0}")]
    Parse(String),

    /// Transport failure or unexpected HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// The messaging provider refused or failed to deliver a message.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::scheduler::PollState,
        to: crate::scheduler::PollState,
    },

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PassabotError {
    /// Errors that will never heal by retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::Config(_))
    }

    /// Errors worth retrying after a backoff delay.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ApprovalTimeout(_) | Self::Network(_))
    }
}

impl From<reqwest::Error> for PassabotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Convenience Result type for passabot operations.
pub type Result<T> = std::result::Result<T, PassabotError>;
