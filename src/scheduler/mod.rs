//! Poll scheduling.
//!
//! This module drives the whole bot: it keeps a session alive, checks
//! availability on a fixed cadence and hands results to the notifier.

mod poller;
mod state;

pub use poller::{
    PollScheduler, PollSettings, PollStats, DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_BACKOFF,
};
pub use state::PollState;
