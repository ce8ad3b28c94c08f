//! Availability checking.
//!
//! This module queries the booking site with an authenticated session and
//! turns its responses into an [`AvailabilityResult`]:
//! - Office listing per province
//! - Slot agenda per office with advertised availability
//! - Detection of expired sessions
//!
//! Site-specific parsing is confined to [`AvailabilityParser`].

mod checker;
mod model;
mod parser;

pub use checker::{
    AvailabilityCheck, BookingClient, BookingSettings, DEFAULT_BOOKING_URL,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT,
};
pub use model::{AvailabilityResult, Office, OfficeAvailability, SlotOffer};
pub use parser::{AvailabilityParser, PassaportoParser};
