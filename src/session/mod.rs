//! Identity session management.
//!
//! This module owns the SPID login lifecycle: credentials, the push
//! approval wait, and the resulting booking-site session.

mod backend;
mod credentials;
mod fixed;
mod manager;
mod posteid;
mod token;

pub use backend::{ApprovalStatus, IdentityBackend, LoginChallenge};
pub use credentials::{Credentials, IdentityProviderKind};
pub use fixed::StaticBackend;
pub use manager::{SessionManager, DEFAULT_APPROVAL_POLL, DEFAULT_APPROVAL_TIMEOUT};
pub use posteid::{extract_csrf_token, PosteIdBackend, PosteIdSettings};
pub use token::{Session, SESSION_COOKIE};

#[cfg(test)]
pub(crate) use manager::tests as test_support;
