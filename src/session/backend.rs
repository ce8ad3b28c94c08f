//! Identity-provider boundary.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Credentials, Session};
use crate::Result;

/// Handle for one pending login attempt.
///
/// Produced by [`IdentityBackend::submit_credentials`] and consumed by
/// [`IdentityBackend::exchange`], so an attempt can be completed at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    id: String,
}

impl LoginChallenge {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Outcome of the out-of-band push approval, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    /// The user has not answered the push yet.
    Pending,
    /// The user approved the login.
    Granted,
    /// The user rejected the login.
    Denied,
}

/// Federated identity provider, treated as a black box.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Submit credentials; on acceptance the provider sends the push request.
    async fn submit_credentials(&self, credentials: &Credentials) -> Result<LoginChallenge>;

    /// Poll the approval state of a pending attempt.
    async fn approval_status(&self, challenge: &LoginChallenge) -> Result<ApprovalStatus>;

    /// Complete an approved attempt and obtain a booking-site session.
    async fn exchange(&self, challenge: LoginChallenge) -> Result<Session>;
}

#[async_trait]
impl<T: IdentityBackend + ?Sized> IdentityBackend for Box<T> {
    async fn submit_credentials(&self, credentials: &Credentials) -> Result<LoginChallenge> {
        (**self).submit_credentials(credentials).await
    }

    async fn approval_status(&self, challenge: &LoginChallenge) -> Result<ApprovalStatus> {
        (**self).approval_status(challenge).await
    }

    async fn exchange(&self, challenge: LoginChallenge) -> Result<Session> {
        (**self).exchange(challenge).await
    }
}

#[async_trait]
impl<T: IdentityBackend + ?Sized> IdentityBackend for Arc<T> {
    async fn submit_credentials(&self, credentials: &Credentials) -> Result<LoginChallenge> {
        (**self).submit_credentials(credentials).await
    }

    async fn approval_status(&self, challenge: &LoginChallenge) -> Result<ApprovalStatus> {
        (**self).approval_status(challenge).await
    }

    async fn exchange(&self, challenge: LoginChallenge) -> Result<Session> {
        (**self).exchange(challenge).await
    }
}
