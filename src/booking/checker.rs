//! Availability checks against the booking site.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE, LOCATION};
use reqwest::{redirect, Client, StatusCode};
use serde_json::json;
use tracing::{debug, info};

use super::{AvailabilityParser, AvailabilityResult, OfficeAvailability, PassaportoParser};
use crate::error::PassabotError;
use crate::session::Session;
use crate::Result;

/// Default booking site base URL.
pub const DEFAULT_BOOKING_URL: &str = "https://passaportonline.poliziadistato.it/cittadino";

/// Default request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser user agent; the site rejects obvious non-browser clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

const OFFICES_PATH: &str = "/a/rc/v1/appuntamento/elenca-sede-prima-disponibilita";
const AGENDA_PATH: &str = "/n/rc/v1/utility/elenca-agenda-appuntamenti-sede-mese";

const CSRF_HEADER: &str = "X-Csrf-Token";

/// Substrings that identify the SPID login page or a redirect to it.
const LOGIN_MARKERS: &[&str] = &["logincittadino", "sceltalogin", "entra con spid"];

/// Queries the booking system for open slots.
#[async_trait]
pub trait AvailabilityCheck: Send + Sync {
    /// Fetch and parse current availability.
    ///
    /// Fails with [`PassabotError::SessionInvalid`] when the site no longer
    /// accepts `session`.
    async fn check(&self, session: &Session) -> Result<AvailabilityResult>;
}

#[async_trait]
impl<T: AvailabilityCheck + ?Sized> AvailabilityCheck for Arc<T> {
    async fn check(&self, session: &Session) -> Result<AvailabilityResult> {
        (**self).check(session).await
    }
}

/// Booking site settings.
#[derive(Debug, Clone)]
pub struct BookingSettings {
    /// Base URL, without trailing slash.
    pub base_url: String,
    /// Province code (`provinciaQuestura`) to search in.
    pub province: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl BookingSettings {
    pub fn new(province: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BOOKING_URL.to_string(),
            province: province.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// HTTP client for the booking site's REST endpoints.
pub struct BookingClient<P = PassaportoParser> {
    client: Client,
    settings: BookingSettings,
    parser: P,
}

impl BookingClient<PassaportoParser> {
    pub fn new(settings: BookingSettings) -> Result<Self> {
        Self::with_parser(settings, PassaportoParser)
    }
}

impl<P: AvailabilityParser> BookingClient<P> {
    pub fn with_parser(settings: BookingSettings, parser: P) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| PassabotError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            settings,
            parser,
        })
    }

    pub fn settings(&self) -> &BookingSettings {
        &self.settings
    }

    async fn post(&self, session: &Session, path: &str, body: serde_json::Value) -> Result<String> {
        let url = format!("{}{}", self.settings.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .header(CSRF_HEADER, session.csrf_token())
            .header(COOKIE, session.cookie_header())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        debug!(%status, path, "Booking site responded");

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(PassabotError::SessionInvalid);
        }

        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if location.is_empty() || is_login_marker(location) {
                return Err(PassabotError::SessionInvalid);
            }
            return Err(PassabotError::Network(format!(
                "unexpected redirect from {} to {}",
                path, location
            )));
        }

        if !status.is_success() {
            return Err(PassabotError::Network(format!(
                "{} returned status {}",
                path, status
            )));
        }

        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/html"));
        let text = response.text().await?;

        if is_html && is_login_marker(&text) {
            return Err(PassabotError::SessionInvalid);
        }

        Ok(text)
    }
}

#[async_trait]
impl<P: AvailabilityParser> AvailabilityCheck for BookingClient<P> {
    async fn check(&self, session: &Session) -> Result<AvailabilityResult> {
        let body = self
            .post(
                session,
                OFFICES_PATH,
                json!({ "comune": { "provinciaQuestura": self.settings.province } }),
            )
            .await?;
        let offices = self.parser.parse_offices(&body)?;
        debug!("Found {} offices in {}", offices.len(), self.settings.province);

        let mut entries = Vec::with_capacity(offices.len());
        for office in offices {
            let slots = if office.first_available.is_some() {
                let body = self
                    .post(session, AGENDA_PATH, json!({ "sede": { "id": office.id } }))
                    .await?;
                self.parser.parse_slots(&body)?
            } else {
                Vec::new()
            };
            entries.push(OfficeAvailability::new(office, slots));
        }

        let result = AvailabilityResult::new(entries);
        info!(
            offices = result.offices().len(),
            available = result.offices_with_slots().count(),
            slots = result.total_slots(),
            "Availability check complete"
        );
        Ok(result)
    }
}

fn is_login_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    LOGIN_MARKERS.iter().any(|marker| lower.contains(marker))
}
