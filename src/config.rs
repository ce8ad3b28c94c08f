//! Configuration management for passabot.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::booking::{BookingSettings, DEFAULT_BOOKING_URL, DEFAULT_USER_AGENT};
use crate::cli::Args;
use crate::notify::{ChatId, DEFAULT_API_URL};
use crate::scheduler::PollSettings;
use crate::session::{Credentials, IdentityProviderKind, PosteIdSettings};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SPID login settings.
    pub identity: IdentitySection,
    /// Booking site settings.
    pub booking: BookingSection,
    /// Telegram settings.
    pub telegram: TelegramSection,
    /// Poll cadence settings.
    pub polling: PollingSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// SPID identity section.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySection {
    /// SPID username.
    pub username: String,
    /// SPID password.
    pub password: String,
    /// Identity provider name.
    pub provider: String,
    /// Identity provider base URL.
    pub idp_url: String,
    /// Pre-obtained `JSESSIONID`; skips the SPID login together with `csrf_token`.
    pub session_id: Option<String>,
    /// Pre-obtained CSRF token.
    pub csrf_token: Option<String>,
}

impl Default for IdentitySection {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            provider: IdentityProviderKind::PosteId.as_str().to_string(),
            idp_url: IdentityProviderKind::PosteId.entity_id().to_string(),
            session_id: None,
            csrf_token: None,
        }
    }
}

impl fmt::Debug for IdentitySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentitySection")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("provider", &self.provider)
            .field("idp_url", &self.idp_url)
            .field("session_id", &self.session_id.as_ref().map(|_| "<redacted>"))
            .field("csrf_token", &self.csrf_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Booking site section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingSection {
    /// Booking site base URL.
    pub base_url: String,
    /// Province code to search in (e.g. "MI").
    pub province: String,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
    /// User agent for booking-site and identity-provider requests.
    pub user_agent: String,
}

impl Default for BookingSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BOOKING_URL.to_string(),
            province: String::new(),
            request_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Telegram section.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSection {
    /// Bot API base URL.
    pub api_url: String,
    /// Bot token.
    pub bot_token: String,
    /// Chat receiving availability notifications.
    pub data_chat_id: String,
    /// Chat receiving operator alerts.
    pub control_chat_id: Option<String>,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            bot_token: String::new(),
            data_chat_id: String::new(),
            control_chat_id: None,
        }
    }
}

impl fmt::Debug for TelegramSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSection")
            .field("api_url", &self.api_url)
            .field("bot_token", &"<redacted>")
            .field("data_chat_id", &self.data_chat_id)
            .field("control_chat_id", &self.control_chat_id)
            .finish()
    }
}

/// Poll cadence section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSection {
    /// Seconds between availability checks.
    pub interval_secs: u64,
    /// Seconds to wait after a transient login failure.
    pub retry_backoff_secs: u64,
    /// Seconds allowed for the push approval.
    pub approval_timeout_secs: u64,
    /// Seconds between push approval polls.
    pub approval_poll_secs: u64,
    /// Consecutive notifying cycles before notifications turn silent (0 = never).
    pub quiet_after: u32,
    /// Consecutive parse failures before alerting the control chat (0 = never).
    pub parse_alert_threshold: u32,
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            retry_backoff_secs: 300,
            approval_timeout_secs: 60,
            approval_poll_secs: 2,
            quiet_after: 20,
            parse_alert_threshold: 3,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = var("PASSABOT_SPID_USERNAME") {
            self.identity.username = v;
        }
        if let Some(v) = var("PASSABOT_SPID_PASSWORD") {
            self.identity.password = v;
        }
        if let Some(v) = var("PASSABOT_SPID_SESSION_ID") {
            self.identity.session_id = Some(v);
        }
        if let Some(v) = var("PASSABOT_CSRF_TOKEN") {
            self.identity.csrf_token = Some(v);
        }
        if let Some(v) = var("PASSABOT_PROVINCE") {
            self.booking.province = v;
        }
        if let Some(v) = var("PASSABOT_TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = var("PASSABOT_TELEGRAM_DATA_CHAT_ID") {
            self.telegram.data_chat_id = v;
        }
        if let Some(v) = var("PASSABOT_TELEGRAM_CONTROL_CHAT_ID") {
            self.telegram.control_chat_id = Some(v);
        }
        if let Some(v) = var("PASSABOT_POLL_INTERVAL") {
            if let Ok(secs) = v.parse() {
                self.polling.interval_secs = secs;
            }
        }

        if let Some(level) = var("PASSABOT_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref province) = args.province {
            self.booking.province = province.clone();
        }
        if let Some(interval) = args.interval {
            self.polling.interval_secs = interval;
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain and validate it.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);
        config.validate()?;

        Ok(config)
    }

    /// Check that every value needed to run is present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.identity.session_id, &self.identity.csrf_token) {
            (Some(_), Some(_)) => {}
            (None, None) => {
                if self.identity.username.is_empty() {
                    return Err(ConfigError::Missing("identity.username"));
                }
                if self.identity.password.is_empty() {
                    return Err(ConfigError::Missing("identity.password"));
                }
            }
            (Some(_), None) => return Err(ConfigError::Missing("identity.csrf_token")),
            (None, Some(_)) => return Err(ConfigError::Missing("identity.session_id")),
        }

        self.provider()?;

        if self.booking.province.is_empty() {
            return Err(ConfigError::Missing("booking.province"));
        }
        if self.telegram.bot_token.is_empty() {
            return Err(ConfigError::Missing("telegram.bot_token"));
        }
        if self.telegram.data_chat_id.is_empty() {
            return Err(ConfigError::Missing("telegram.data_chat_id"));
        }
        if self.polling.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling.interval_secs must be greater than zero".into(),
            ));
        }
        if self.polling.approval_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "polling.approval_timeout_secs must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    pub fn provider(&self) -> Result<IdentityProviderKind, ConfigError> {
        self.identity
            .provider
            .parse()
            .map_err(|e: crate::PassabotError| ConfigError::Invalid(e.to_string()))
    }

    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        Ok(Credentials::new(
            self.identity.username.clone(),
            self.identity.password.clone(),
            self.provider()?,
        ))
    }

    /// Pre-obtained `(session_id, csrf_token)` pair, when both are set.
    pub fn static_session(&self) -> Option<(String, String)> {
        match (&self.identity.session_id, &self.identity.csrf_token) {
            (Some(id), Some(csrf)) => Some((id.clone(), csrf.clone())),
            _ => None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.booking.request_timeout_secs)
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.polling.approval_timeout_secs)
    }

    pub fn approval_poll(&self) -> Duration {
        Duration::from_secs(self.polling.approval_poll_secs.max(1))
    }

    pub fn booking_settings(&self) -> BookingSettings {
        BookingSettings {
            base_url: self.booking.base_url.clone(),
            province: self.booking.province.clone(),
            request_timeout: self.request_timeout(),
            user_agent: self.booking.user_agent.clone(),
        }
    }

    pub fn posteid_settings(&self) -> PosteIdSettings {
        PosteIdSettings {
            idp_url: self.identity.idp_url.clone(),
            booking_url: self.booking.base_url.clone(),
            request_timeout: self.request_timeout(),
            user_agent: self.booking.user_agent.clone(),
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.polling.interval_secs),
            retry_backoff: Duration::from_secs(self.polling.retry_backoff_secs),
            quiet_after: self.polling.quiet_after,
            parse_alert_threshold: self.polling.parse_alert_threshold,
        }
    }

    pub fn data_chat(&self) -> ChatId {
        ChatId::new(self.telegram.data_chat_id.clone())
    }

    pub fn control_chat(&self) -> Option<ChatId> {
        self.telegram
            .control_chat_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(ChatId::new)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Required value not provided.
    Missing(&'static str),
    /// Value present but unusable.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::Missing(key) => write!(f, "missing required setting: {}", key),
            Self::Invalid(msg) => write!(f, "invalid setting: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::PassabotError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
