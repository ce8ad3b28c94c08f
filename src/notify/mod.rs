//! Notification dispatch.
//!
//! Formats availability results and delivers them to a chat. The
//! [`Notifier`] trait is the messaging boundary; [`TelegramNotifier`] is
//! the production implementation.

mod format;
mod telegram;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::booking::AvailabilityResult;
use crate::Result;

pub use format::{
    escape_html, format_availability, format_messages, format_office, truncate_html, MESSAGE_LIMIT,
};
pub use telegram::{TelegramNotifier, DEFAULT_API_URL};

/// Identifier of a destination chat (numeric id or `@channel`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Messaging boundary.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the offices with slots in `result` as one notification.
    ///
    /// `silent` asks the provider to deliver without sound.
    async fn notify(&self, destination: &ChatId, result: &AvailabilityResult, silent: bool)
        -> Result<()>;

    /// Deliver a plain-text operator message.
    async fn alert(&self, destination: &ChatId, text: &str) -> Result<()>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn notify(
        &self,
        destination: &ChatId,
        result: &AvailabilityResult,
        silent: bool,
    ) -> Result<()> {
        (**self).notify(destination, result, silent).await
    }

    async fn alert(&self, destination: &ChatId, text: &str) -> Result<()> {
        (**self).alert(destination, text).await
    }
}
