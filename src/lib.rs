//! # passabot
//!
//! Watches the Italian passport booking site for free appointment slots
//! and posts them to a Telegram chat.
//!
//! The bot logs in through SPID (PosteID with push approval), keeps the
//! resulting booking-site session alive, checks availability for one
//! province on a fixed cadence and notifies a chat whenever an office
//! has open slots.
//!
//! ## Features
//!
//! - **Session management**: SPID login with a bounded wait for the push approval
//! - **Availability checks**: office and agenda queries per province
//! - **Notifications**: HTML-formatted Telegram messages, split at the size limit
//! - **Scheduling**: fixed-interval polling with relogin on session expiry
//!
//! ## Quick Start
//!
//! ```no_run
//! use passabot::booking::{BookingClient, BookingSettings};
//! use passabot::notify::{ChatId, TelegramNotifier};
//! use passabot::scheduler::PollScheduler;
//! use passabot::session::{Credentials, IdentityProviderKind, PosteIdBackend, PosteIdSettings, SessionManager};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> passabot::Result<()> {
//!     passabot::logging::try_init().ok();
//!
//!     let credentials = Credentials::new("mario.rossi", "secret", IdentityProviderKind::PosteId);
//!     let backend = PosteIdBackend::new(PosteIdSettings::default())?;
//!     let sessions = SessionManager::new(backend, credentials);
//!
//!     let checker = BookingClient::new(BookingSettings::new("MI"))?;
//!     let notifier = TelegramNotifier::new("123:abc", Duration::from_secs(30))?;
//!
//!     let (_stop, shutdown) = tokio::sync::watch::channel(false);
//!     PollScheduler::new(sessions, checker, notifier, ChatId::new("-100123"))
//!         .run(shutdown)
//!         .await
//! }
//! ```

pub mod booking;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod scheduler;
pub mod session;

// Re-export commonly used types
pub use booking::{AvailabilityCheck, AvailabilityResult, BookingClient, Office, SlotOffer};
pub use error::{PassabotError, Result};
pub use notify::{ChatId, Notifier, TelegramNotifier};
pub use scheduler::{PollScheduler, PollState};
pub use session::{Credentials, IdentityBackend, Session, SessionManager};
