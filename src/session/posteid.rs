//! PosteID identity backend over HTTP.
//!
//! Login runs in three legs: credentials are posted to the PosteID login
//! endpoint asking for push-mode second factor, the push state is polled
//! until the app answers, then consent is given and the resulting SAML
//! assertion is posted to the booking site's assertion consumer. The
//! booking site answers with a `JSESSIONID` cookie; the CSRF token is read
//! from the `_csrf` meta tag of an authenticated page.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{redirect, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use super::token::SESSION_COOKIE;
use super::{
    ApprovalStatus, Credentials, IdentityBackend, IdentityProviderKind, LoginChallenge, Session,
};
use crate::booking::{DEFAULT_BOOKING_URL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT};
use crate::error::PassabotError;
use crate::Result;

const LOGIN_PATH: &str = "/jod-login-schema/login";
const PUSH_STATUS_PATH: &str = "/jod-login-schema/push/status";
const CONSENT_PATH: &str = "/jod-login-schema/consent";

/// Authenticated booking-site page carrying the `_csrf` meta tag.
const CSRF_PAGE_PATH: &str = "/a/sc/wizardAppuntamentoCittadino/sceltaComune";

/// Endpoint settings for [`PosteIdBackend`].
#[derive(Debug, Clone)]
pub struct PosteIdSettings {
    /// PosteID base URL.
    pub idp_url: String,
    /// Booking site base URL.
    pub booking_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for PosteIdSettings {
    fn default() -> Self {
        Self {
            idp_url: IdentityProviderKind::PosteId.entity_id().to_string(),
            booking_url: DEFAULT_BOOKING_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    challenge_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum PushState {
    Pending,
    Approved,
    Rejected,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct PushStatusResponse {
    status: PushState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsentResponse {
    acs_url: String,
    saml_response: String,
    #[serde(default)]
    relay_state: Option<String>,
}

/// HTTP client for the PosteID login flow.
pub struct PosteIdBackend {
    client: Client,
    settings: PosteIdSettings,
}

impl PosteIdBackend {
    pub fn new(settings: PosteIdSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| PassabotError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }

    fn idp(&self, path: &str) -> String {
        format!("{}{}", self.settings.idp_url.trim_end_matches('/'), path)
    }

    fn booking(&self, path: &str) -> String {
        format!("{}{}", self.settings.booking_url.trim_end_matches('/'), path)
    }

    async fn post_assertion(&self, consent: &ConsentResponse) -> Result<String> {
        let mut form = vec![("SAMLResponse", consent.saml_response.as_str())];
        if let Some(ref relay) = consent.relay_state {
            form.push(("RelayState", relay.as_str()));
        }

        let response = self.client.post(&consent.acs_url).form(&form).send().await?;
        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(unexpected_status("assertion consumer", status));
        }

        let session_id = response
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .map(|c| c.value().to_string());

        session_id.ok_or_else(|| {
            PassabotError::Parse(format!(
                "booking site did not set the {} cookie",
                SESSION_COOKIE
            ))
        })
    }

    async fn fetch_csrf_token(&self, session_id: &str) -> Result<String> {
        let response = self
            .client
            .get(self.booking(CSRF_PAGE_PATH))
            .header(
                reqwest::header::COOKIE,
                format!("{}={}", SESSION_COOKIE, session_id),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(unexpected_status("booking page", status));
        }

        let html = response.text().await?;
        extract_csrf_token(&html)
            .ok_or_else(|| PassabotError::Parse("no _csrf meta tag on booking page".into()))
    }
}

#[async_trait]
impl IdentityBackend for PosteIdBackend {
    async fn submit_credentials(&self, credentials: &Credentials) -> Result<LoginChallenge> {
        let response = self
            .client
            .post(self.idp(LOGIN_PATH))
            .form(&[
                ("username", credentials.username()),
                ("password", credentials.password()),
                ("entityID", credentials.provider().entity_id()),
                ("mode", "push"),
            ])
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                PassabotError::Authentication("credentials rejected by PosteID".into()),
            ),
            status if status.is_success() => {
                let body: LoginResponse = response.json().await?;
                debug!("PosteID accepted credentials, push sent");
                Ok(LoginChallenge::new(body.challenge_id))
            }
            status => Err(unexpected_status("PosteID login", status)),
        }
    }

    async fn approval_status(&self, challenge: &LoginChallenge) -> Result<ApprovalStatus> {
        let response = self
            .client
            .get(self.idp(PUSH_STATUS_PATH))
            .query(&[("challengeId", challenge.id())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(unexpected_status("PosteID push status", status));
        }

        let body: PushStatusResponse = response.json().await?;
        Ok(match body.status {
            PushState::Approved => ApprovalStatus::Granted,
            PushState::Rejected => ApprovalStatus::Denied,
            PushState::Pending | PushState::Unknown => ApprovalStatus::Pending,
        })
    }

    async fn exchange(&self, challenge: LoginChallenge) -> Result<Session> {
        let response = self
            .client
            .post(self.idp(CONSENT_PATH))
            .form(&[("challengeId", challenge.id()), ("consent", "true")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(unexpected_status("PosteID consent", status));
        }
        let consent: ConsentResponse = response.json().await?;

        let session_id = self.post_assertion(&consent).await?;
        let csrf_token = self.fetch_csrf_token(&session_id).await?;
        info!("Obtained booking-site session");

        Ok(Session::new(session_id, csrf_token))
    }
}

fn unexpected_status(what: &str, status: StatusCode) -> PassabotError {
    PassabotError::Network(format!("{} returned status {}", what, status))
}

/// Extract the `content` of `<meta name="_csrf" ...>` from an HTML page.
///
/// Tag and attribute names match case-insensitively; values may be
/// double-quoted, single-quoted or bare.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let meta = Regex::new(r"(?is)<meta\b[^>]*>").ok()?;
    let attr = Regex::new(
        r#"(?i)\s([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
    )
    .ok()?;

    let token = meta
        .find_iter(html)
        .map(|tag| {
            attr.captures_iter(tag.as_str())
                .filter_map(|caps| {
                    let name = caps.get(1)?.as_str().to_ascii_lowercase();
                    let value = caps.get(2).or(caps.get(3)).or(caps.get(4))?;
                    Some((name, value.as_str().to_string()))
                })
                .collect::<Vec<_>>()
        })
        .find(|attrs| attrs.iter().any(|(k, v)| k == "name" && v == "_csrf"))
        .and_then(|attrs| attrs.into_iter().find(|(k, _)| k == "content"))
        .map(|(_, token)| token)
        .filter(|token| !token.is_empty());
    token
}
