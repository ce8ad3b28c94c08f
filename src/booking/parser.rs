//! Booking-site response parsing.
//!
//! Everything that depends on the shape of the site's JSON lives here.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use super::{Office, SlotOffer};
use crate::error::PassabotError;
use crate::Result;

/// Separator used inside agenda `objectKey` values.
const KEY_SEPARATOR: &str = "||_||";

/// Format of the date/time part of an agenda `objectKey`.
const KEY_DATETIME_FORMAT: &str = "%d/%m/%Y||_||%H.%M";

/// Turns raw booking-site responses into the availability model.
pub trait AvailabilityParser: Send + Sync {
    /// Parse the office list returned for a province.
    fn parse_offices(&self, body: &str) -> Result<Vec<Office>>;

    /// Parse the slot agenda of one office.
    fn parse_slots(&self, body: &str) -> Result<Vec<SlotOffer>>;
}

/// Parser for the passaportonline.poliziadistato.it REST endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassaportoParser;

#[derive(Debug, Deserialize)]
struct OfficeList {
    #[serde(default)]
    list: Option<Vec<RawOffice>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOffice {
    id: u64,
    descrizione: String,
    #[serde(default)]
    indirizzo: Option<String>,
    #[serde(default)]
    data_prima_disponibilita_residenti: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Agenda {
    #[serde(default)]
    elenco: Option<Vec<RawSlot>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSlot {
    object_key: String,
    tot_appuntamenti: u32,
}

impl AvailabilityParser for PassaportoParser {
    fn parse_offices(&self, body: &str) -> Result<Vec<Office>> {
        let parsed: OfficeList = serde_json::from_str(body)
            .map_err(|e| PassabotError::Parse(format!("office list: {}", e)))?;

        parsed
            .list
            .unwrap_or_default()
            .into_iter()
            .map(|raw| {
                let first_available = raw
                    .data_prima_disponibilita_residenti
                    .as_deref()
                    .map(parse_first_available)
                    .transpose()?;

                Ok(Office {
                    id: raw.id,
                    name: office_name(&raw.descrizione).to_string(),
                    address: raw.indirizzo.unwrap_or_default().trim().to_string(),
                    first_available,
                })
            })
            .collect()
    }

    fn parse_slots(&self, body: &str) -> Result<Vec<SlotOffer>> {
        let parsed: Agenda = serde_json::from_str(body)
            .map_err(|e| PassabotError::Parse(format!("slot agenda: {}", e)))?;

        let mut slots = parsed
            .elenco
            .unwrap_or_default()
            .into_iter()
            .filter(|raw| raw.tot_appuntamenti > 0)
            .map(|raw| {
                let starts_at = parse_object_key(&raw.object_key)?;
                Ok(SlotOffer::new(
                    starts_at.date(),
                    starts_at.time(),
                    raw.tot_appuntamenti,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        slots.sort();
        Ok(slots)
    }
}

/// `"0123 - Questura di Milano"` -> `"Questura di Milano"`.
fn office_name(descrizione: &str) -> &str {
    descrizione
        .split_once(" - ")
        .map_or(descrizione, |(_, name)| name)
        .trim()
}

/// `"2024-05-01T00:00:00"` -> 2024-05-01.
fn parse_first_available(value: &str) -> Result<NaiveDate> {
    let date = value.split('T').next().unwrap_or(value);
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| PassabotError::Parse(format!("first available date {:?}: {}", value, e)))
}

/// `"<sede>||_||01/05/2024||_||10.00"` -> 2024-05-01 10:00.
fn parse_object_key(key: &str) -> Result<NaiveDateTime> {
    let (_, datetime) = key
        .split_once(KEY_SEPARATOR)
        .ok_or_else(|| PassabotError::Parse(format!("malformed slot key {:?}", key)))?;

    NaiveDateTime::parse_from_str(datetime, KEY_DATETIME_FORMAT)
        .map_err(|e| PassabotError::Parse(format!("slot key {:?}: {}", key, e)))
}
