//! Availability data model.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A passport office (questura or commissariato) as listed by the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Office {
    /// Booking-site identifier, used to request the slot agenda.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Street address.
    pub address: String,
    /// First date the site advertises availability for residents.
    pub first_available: Option<NaiveDate>,
}

impl Office {
    pub fn new(id: u64, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            address: address.into(),
            first_available: None,
        }
    }

    pub fn with_first_available(mut self, date: NaiveDate) -> Self {
        self.first_available = Some(date);
        self
    }
}

/// One bookable time window at an office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotOffer {
    date: NaiveDate,
    time: NaiveTime,
    seats: u32,
}

impl SlotOffer {
    pub fn new(date: NaiveDate, time: NaiveTime, seats: u32) -> Self {
        Self { date, time, seats }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    pub fn seats(&self) -> u32 {
        self.seats
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// An office together with its open slots, in chronological order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfficeAvailability {
    pub office: Office,
    pub slots: Vec<SlotOffer>,
}

impl OfficeAvailability {
    pub fn new(office: Office, mut slots: Vec<SlotOffer>) -> Self {
        slots.sort();
        Self { office, slots }
    }

    pub fn has_slots(&self) -> bool {
        !self.slots.is_empty()
    }
}

/// Outcome of one availability check.
///
/// Offices keep the order the site listed them in. Offices without slots
/// are kept with an empty slot list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityResult {
    offices: Vec<OfficeAvailability>,
}

impl AvailabilityResult {
    pub fn new(offices: Vec<OfficeAvailability>) -> Self {
        Self { offices }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn offices(&self) -> &[OfficeAvailability] {
        &self.offices
    }

    /// True when the site listed no offices at all.
    pub fn is_empty(&self) -> bool {
        self.offices.is_empty()
    }

    /// True when at least one office has at least one slot.
    pub fn has_slots(&self) -> bool {
        self.offices.iter().any(OfficeAvailability::has_slots)
    }

    pub fn offices_with_slots(&self) -> impl Iterator<Item = &OfficeAvailability> {
        self.offices.iter().filter(|o| o.has_slots())
    }

    pub fn total_slots(&self) -> usize {
        self.offices.iter().map(|o| o.slots.len()).sum()
    }
}
