//! Telegram Bot API transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::format::{escape_html, format_messages, truncate_html, MESSAGE_LIMIT};
use super::{ChatId, Notifier};
use crate::booking::AvailabilityResult;
use crate::error::PassabotError;
use crate::Result;

/// Default Bot API base URL.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_notification: bool,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends notifications through a Telegram bot.
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    token: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PassabotError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Send one HTML-formatted message.
    pub async fn send_message(&self, chat: &ChatId, text: &str, silent: bool) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_url.trim_end_matches('/'),
            self.token
        );
        let request = SendMessage {
            chat_id: chat.as_str(),
            text,
            parse_mode: "HTML",
            disable_notification: silent,
            disable_web_page_preview: true,
        };

        // the bot token is part of the URL; keep it out of error messages
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PassabotError::Delivery(e.without_url().to_string()))?;

        let status = response.status();
        let body: ApiResponse = response.json().await.map_err(|e| {
            PassabotError::Delivery(format!("status {}: {}", status, e.without_url()))
        })?;

        if !status.is_success() || !body.ok {
            return Err(PassabotError::Delivery(format!(
                "Telegram rejected message to {}: {}",
                chat,
                body.description.unwrap_or_else(|| status.to_string())
            )));
        }

        debug!(chat = %chat, silent, "Telegram message delivered");
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(
        &self,
        destination: &ChatId,
        result: &AvailabilityResult,
        silent: bool,
    ) -> Result<()> {
        let messages = format_messages(result, MESSAGE_LIMIT);
        for text in &messages {
            self.send_message(destination, text, silent).await?;
        }
        if !messages.is_empty() {
            info!(
                chat = %destination,
                parts = messages.len(),
                "Availability notification sent"
            );
        }
        Ok(())
    }

    async fn alert(&self, destination: &ChatId, text: &str) -> Result<()> {
        let escaped = escape_html(text);
        self.send_message(destination, truncate_html(&escaped, MESSAGE_LIMIT), false)
            .await
    }
}
