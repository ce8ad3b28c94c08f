//! Authenticated booking-site session.

use std::fmt;

use chrono::{DateTime, Utc};

/// Name of the servlet session cookie issued by the booking site.
pub const SESSION_COOKIE: &str = "JSESSIONID";

/// Authenticated context for the booking site.
///
/// Holds the `JSESSIONID` cookie and the CSRF token the site expects in the
/// `X-Csrf-Token` header. Expiry is enforced by the site only.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    session_id: String,
    csrf_token: String,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, csrf_token: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            csrf_token: csrf_token.into(),
            created_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time elapsed since the session was established.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }

    /// Value for the `Cookie` request header.
    pub fn cookie_header(&self) -> String {
        format!("{}={}", SESSION_COOKIE, self.session_id)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &mask(&self.session_id))
            .field("csrf_token", &mask(&self.csrf_token))
            .field("created_at", &self.created_at)
            .finish()
    }
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}***", visible)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        let session = Session::new("ABC123", "csrf-token");
        assert_eq!(session.cookie_header(), "JSESSIONID=ABC123");
        assert_eq!(session.csrf_token(), "csrf-token");
    }

    #[test]
    fn test_debug_masks_tokens() {
        let session = Session::new("0123456789ABCDEF", "fedcba9876543210");
        let debug = format!("{:?}", session);
        assert!(debug.contains("0123***"));
        assert!(!debug.contains("0123456789ABCDEF"));
        assert!(!debug.contains("fedcba9876543210"));
    }

    #[test]
    fn test_age_is_non_negative() {
        let session = Session::new("a", "b");
        assert!(session.age() >= chrono::Duration::zero());
    }
}
