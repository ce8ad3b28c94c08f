//! Login lifecycle and the time-bounded push approval wait.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::{ApprovalStatus, Credentials, IdentityBackend, LoginChallenge, Session};
use crate::error::PassabotError;
use crate::Result;

/// Deadline for the push approval, counted from the moment it is sent.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between approval status polls.
pub const DEFAULT_APPROVAL_POLL: Duration = Duration::from_secs(2);

/// Owns the credentials and the single live booking-site session.
pub struct SessionManager<B> {
    backend: B,
    credentials: Credentials,
    approval_timeout: Duration,
    approval_poll: Duration,
    session: Option<Session>,
}

impl<B: IdentityBackend> SessionManager<B> {
    pub fn new(backend: B, credentials: Credentials) -> Self {
        Self {
            backend,
            credentials,
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            approval_poll: DEFAULT_APPROVAL_POLL,
            session: None,
        }
    }

    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    pub fn with_approval_poll(mut self, interval: Duration) -> Self {
        self.approval_poll = interval;
        self
    }

    /// The live session, if any.
    pub fn current(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Return the live session, performing a full login when there is none.
    pub async fn ensure_session(&mut self) -> Result<&Session> {
        let session = match self.session.take() {
            Some(session) => session,
            None => self.login().await?,
        };
        Ok(self.session.insert(session))
    }

    /// Forget the live session after the site rejected it.
    pub fn invalidate(&mut self) {
        if self.session.take().is_some() {
            debug!("Session invalidated, next check will log in again");
        }
    }

    /// Drop the live session at shutdown.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            info!(
                age_secs = session.age().num_seconds(),
                "Closing booking-site session"
            );
        }
    }

    /// Run a full login: credentials, push approval, assertion exchange.
    ///
    /// Fails with [`PassabotError::ApprovalTimeout`] when the push is not
    /// approved within the configured window. The timed-out attempt is
    /// dropped and never exchanged.
    pub async fn login(&self) -> Result<Session> {
        info!(provider = %self.credentials.provider(), "Submitting SPID credentials");
        let challenge = self.backend.submit_credentials(&self.credentials).await?;

        info!(
            "Push approval requested, waiting up to {}s for confirmation",
            self.approval_timeout.as_secs()
        );
        match tokio::time::timeout(self.approval_timeout, self.wait_for_approval(&challenge)).await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!("Push approval not granted in time, abandoning login attempt");
                return Err(PassabotError::ApprovalTimeout(self.approval_timeout));
            }
        }

        let session = self.backend.exchange(challenge).await?;
        info!("Logged in to the booking site");
        Ok(session)
    }

    async fn wait_for_approval(&self, challenge: &LoginChallenge) -> Result<()> {
        loop {
            match self.backend.approval_status(challenge).await? {
                ApprovalStatus::Granted => return Ok(()),
                ApprovalStatus::Denied => {
                    return Err(PassabotError::Authentication(
                        "push approval was denied".into(),
                    ))
                }
                ApprovalStatus::Pending => {
                    debug!("Push approval still pending");
                    tokio::time::sleep(self.approval_poll).await;
                }
            }
        }
    }
}
