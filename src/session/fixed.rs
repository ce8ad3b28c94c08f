//! Backend for a session obtained by hand in a browser.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::info;

use super::{ApprovalStatus, Credentials, IdentityBackend, LoginChallenge, Session};
use crate::error::PassabotError;
use crate::Result;

/// Hands out a pre-obtained `JSESSIONID`/CSRF pair exactly once.
///
/// No push approval is involved. When the site later invalidates the
/// session there is no way to get a new one unattended, so the second
/// login attempt fails with [`PassabotError::Authentication`].
pub struct StaticBackend {
    session: Session,
    used: AtomicBool,
}

impl StaticBackend {
    pub fn new(session_id: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            session: Session::new(session_id, csrf_token),
            used: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl IdentityBackend for StaticBackend {
    async fn submit_credentials(&self, _credentials: &Credentials) -> Result<LoginChallenge> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(PassabotError::Authentication(
                "configured session expired; supply a fresh JSESSIONID and CSRF token".into(),
            ));
        }
        info!("Using configured booking-site session");
        Ok(LoginChallenge::new("static"))
    }

    async fn approval_status(&self, _challenge: &LoginChallenge) -> Result<ApprovalStatus> {
        Ok(ApprovalStatus::Granted)
    }

    async fn exchange(&self, _challenge: LoginChallenge) -> Result<Session> {
        Ok(self.session.clone())
    }
}
