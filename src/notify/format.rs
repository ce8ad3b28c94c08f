//! Message formatting for availability notifications.

use crate::booking::{AvailabilityResult, OfficeAvailability, SlotOffer};

/// Maximum length of one Telegram message.
pub const MESSAGE_LIMIT: usize = 4096;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render one office and its slots.
pub fn format_office(entry: &OfficeAvailability) -> String {
    let mut out = office_header(entry, false);
    for slot in &entry.slots {
        out.push('\n');
        out.push_str(&slot_line(slot));
    }
    out
}

fn office_header(entry: &OfficeAvailability, continued: bool) -> String {
    format!(
        "<b>Sede:</b> {}{}\n<b>Indirizzo:</b> {}\n<b>Slot disponibili:</b>",
        escape_html(&entry.office.name),
        if continued { " (segue)" } else { "" },
        escape_html(&entry.office.address)
    )
}

fn slot_line(slot: &SlotOffer) -> String {
    format!(
        "- <code>{} {}</code>: <b>{}</b> posti",
        slot.date().format(DATE_FORMAT),
        slot.time().format(TIME_FORMAT),
        slot.seats()
    )
}

/// Render a full availability result, or `None` when no office has slots.
///
/// Offices without slots are left out.
pub fn format_availability(result: &AvailabilityResult) -> Option<String> {
    let blocks: Vec<String> = result.offices_with_slots().map(format_office).collect();
    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n\n"))
    }
}

/// Render a result as one or more messages no longer than `limit` chars.
///
/// Messages break between offices. An office too large on its own is
/// broken between slot lines, and every continuation repeats the office
/// header.
pub fn format_messages(result: &AvailabilityResult, limit: usize) -> Vec<String> {
    match format_availability(result) {
        None => return Vec::new(),
        Some(text) if char_len(&text) <= limit => return vec![text],
        Some(_) => {}
    }

    let mut messages = Vec::new();
    let mut current = String::new();

    for entry in result.offices_with_slots() {
        let block = format_office(entry);
        if char_len(&block) > limit {
            flush(&mut messages, &mut current);
            split_office(&mut messages, entry, limit);
        } else {
            if !current.is_empty() && char_len(&current) + 2 + char_len(&block) > limit {
                flush(&mut messages, &mut current);
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&block);
        }
    }
    flush(&mut messages, &mut current);
    messages
}

fn split_office(messages: &mut Vec<String>, entry: &OfficeAvailability, limit: usize) {
    let mut current = office_header(entry, false);
    let mut has_lines = false;

    for line in entry.slots.iter().map(slot_line) {
        if has_lines && char_len(&current) + 1 + char_len(&line) > limit {
            let done = std::mem::replace(&mut current, office_header(entry, true));
            messages.push(truncate_html(&done, limit).to_string());
        }
        current.push('\n');
        current.push_str(&line);
        has_lines = true;
    }
    messages.push(truncate_html(&current, limit).to_string());
}

fn flush(messages: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        messages.push(std::mem::take(current));
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Cut `text` to at most `limit` chars without splitting a tag, an
/// entity or a `<b>`/`<code>` pair.
pub fn truncate_html(text: &str, limit: usize) -> &str {
    let end = text
        .char_indices()
        .nth(limit)
        .map_or(text.len(), |(idx, _)| idx);
    let mut cut = &text[..end];
    if end == text.len() {
        return cut;
    }

    if let Some(open) = cut.rfind('<') {
        if !cut[open..].contains('>') {
            cut = &cut[..open];
        }
    }
    if let Some(amp) = cut.rfind('&') {
        if !cut[amp..].contains(';') {
            cut = &cut[..amp];
        }
    }
    for (open, close) in [("<b>", "</b>"), ("<code>", "</code>")] {
        if let Some(start) = cut.rfind(open) {
            if !cut[start..].contains(close) {
                cut = &cut[..start];
            }
        }
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{Office, SlotOffer};
    use chrono::{NaiveDate, NaiveTime};

    fn slot(day: u32, hour: u32, minute: u32, seats: u32) -> SlotOffer {
        SlotOffer::new(
            NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
            seats,
        )
    }

    #[test]
    fn test_format_single_office() {
        let result = AvailabilityResult::new(vec![OfficeAvailability::new(
            Office::new(1, "Office Y", "Via Roma 1"),
            vec![slot(1, 10, 0, 2)],
        )]);

        let text = format_availability(&result).unwrap();
        assert!(text.contains("Office Y"));
        assert!(text.contains("Via Roma 1"));
        assert!(text.contains("2024-05-01"));
        assert!(text.contains("10:00"));
        assert!(text.contains("<b>2</b>"));
    }

    #[test]
    fn test_offices_without_slots_omitted() {
        let result = AvailabilityResult::new(vec![
            OfficeAvailability::new(Office::new(1, "Office X", "Via Po 3"), vec![]),
            OfficeAvailability::new(
                Office::new(2, "Office Y", "Via Roma 1"),
                vec![slot(2, 9, 30, 1)],
            ),
        ]);

        let text = format_availability(&result).unwrap();
        assert!(!text.contains("Office X"));
        assert!(text.contains("Office Y"));
        assert!(text.contains("09:30"));
    }

    #[test]
    fn test_nothing_to_report() {
        let result = AvailabilityResult::new(vec![OfficeAvailability::new(
            Office::new(1, "Office X", "addr"),
            vec![],
        )]);
        assert!(format_availability(&result).is_none());
        assert!(format_messages(&result, MESSAGE_LIMIT).is_empty());
        assert!(format_availability(&AvailabilityResult::empty()).is_none());
    }

    #[test]
    fn test_html_is_escaped() {
        let result = AvailabilityResult::new(vec![OfficeAvailability::new(
            Office::new(1, "Ufficio <Centro> & Co", "Via \"A\""),
            vec![slot(1, 8, 0, 1)],
        )]);
        let text = format_availability(&result).unwrap();
        assert!(text.contains("Ufficio &lt;Centro&gt; &amp; Co"));
        assert!(text.contains("Via &quot;A&quot;"));
    }

    #[test]
    fn test_messages_split_between_offices() {
        let offices = (0..5)
            .map(|i| {
                OfficeAvailability::new(
                    Office::new(i, format!("Office {}", i), "Via Roma 1"),
                    vec![slot(1, 10, 0, 1), slot(2, 11, 0, 3)],
                )
            })
            .collect();
        let result = AvailabilityResult::new(offices);
        let single = format_office(&result.offices()[0]).chars().count();

        let messages = format_messages(&result, single * 2 + 2);
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.chars().count() <= single * 2 + 2));
        assert!(messages[2].contains("Office 4"));
    }

    #[test]
    fn test_oversized_office_split_by_line() {
        let slots = (1..=28).map(|d| slot(d, 10, 0, 1)).collect();
        let result = AvailabilityResult::new(vec![OfficeAvailability::new(
            Office::new(1, "Big", "Via Lunga"),
            slots,
        )]);

        let messages = format_messages(&result, 200);
        assert!(messages.len() > 1);
        assert!(messages.iter().all(|m| m.chars().count() <= 200));
        assert!(messages[0].contains("Big"));
    }

    #[test]
    fn test_every_part_names_its_office() {
        let slots = (0..120)
            .map(|i| slot(1 + i / 12, 8 + i % 12, 0, 1))
            .collect();
        let result = AvailabilityResult::new(vec![OfficeAvailability::new(
            Office::new(1, "Questura di Milano", "Via Fatebenefratelli 11"),
            slots,
        )]);

        let messages = format_messages(&result, MESSAGE_LIMIT / 2);
        assert!(messages.len() >= 2);
        for message in &messages {
            assert!(message.chars().count() <= MESSAGE_LIMIT / 2);
            assert!(message.contains("Questura di Milano"));
            assert!(message.contains("Via Fatebenefratelli 11"));
        }
        assert!(messages[1].starts_with("<b>Sede:</b> Questura di Milano (segue)"));

        let lines: usize = messages
            .iter()
            .map(|m| m.lines().filter(|l| l.starts_with("- ")).count())
            .sum();
        assert_eq!(lines, 120);
    }

    #[test]
    fn test_single_message_when_it_fits() {
        let result = AvailabilityResult::new(vec![OfficeAvailability::new(
            Office::new(1, "Office Y", "Via Roma 1"),
            vec![slot(1, 10, 0, 2)],
        )]);
        assert_eq!(
            format_messages(&result, MESSAGE_LIMIT),
            vec![format_availability(&result).unwrap()]
        );
    }

    #[test]
    fn test_truncate_html_keeps_markup_whole() {
        assert_eq!(truncate_html("short", 10), "short");
        assert_eq!(truncate_html("abc <b>bold</b>", 6), "abc ");
        assert_eq!(truncate_html("abc <b>bold</b>", 10), "abc ");
        assert_eq!(truncate_html("a &amp; b", 4), "a ");
        assert_eq!(truncate_html("a &amp; b", 7), "a &amp;");
        assert_eq!(truncate_html("<code>x</code> tail", 15), "<code>x</code> ");
    }
}
