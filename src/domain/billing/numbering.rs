//! Human-readable numbers for invoices, payments and tickets.
//!
//! Sequences come from per-scope counters in the store; this module only
//! names the scopes and formats the results.

use crate::domain::foundation::EventId;
use uuid::Uuid;

/// Longest event slug carried into a ticket number.
const MAX_SLUG_LEN: usize = 16;

/// Fallback slug for event names with no usable characters.
const EMPTY_SLUG: &str = "EVENT";

/// Hex digits of the event id carried into a ticket number.
const EVENT_TAG_LEN: usize = 8;

/// Counter scope. Each scope has its own monotonic sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberScope {
    Invoice { year: i32 },
    Payment { year: i32 },
    Ticket { event_id: EventId, year: i32 },
}

impl NumberScope {
    /// Stable key of the counter row backing this scope.
    pub fn key(&self) -> String {
        match self {
            NumberScope::Invoice { year } => format!("invoice:{}", year),
            NumberScope::Payment { year } => format!("payment:{}", year),
            NumberScope::Ticket { event_id, year } => format!("ticket:{}:{}", event_id, year),
        }
    }
}

/// `INV-2026-000042`
pub fn invoice_number(prefix: &str, year: i32, seq: i64) -> String {
    format!("{}-{}-{:06}", prefix, year, seq)
}

/// `PAY-2026-000042`
pub fn payment_number(year: i32, seq: i64) -> String {
    format!("PAY-{}-{:06}", year, seq)
}

/// `SUMMER-CAMP-9F1C04AB-2026-00042` for "Summer Camp" in 2026.
///
/// The ticket counter is kept per event, so the number carries a tag of the
/// event id. Events whose names share a slug still draw from disjoint
/// number spaces.
pub fn ticket_number(event_id: EventId, event_name: &str, year: i32, seq: i64) -> String {
    format!(
        "{}-{}-{}-{:05}",
        event_slug(event_name),
        event_tag(event_id),
        year,
        seq
    )
}

/// Leading hex digits of the event id, uppercased.
pub fn event_tag(event_id: EventId) -> String {
    let mut tag = event_id.as_uuid().simple().to_string();
    tag.truncate(EVENT_TAG_LEN);
    tag.to_ascii_uppercase()
}

/// Uppercase ASCII words of the event name joined by dashes, capped in length.
pub fn event_slug(name: &str) -> String {
    let mut slug = String::new();
    for word in name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&word.to_ascii_uppercase());
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// Opaque code encoded in the ticket's QR/barcode.
pub fn new_scan_code() -> String {
    Uuid::new_v4().simple().to_string().to_ascii_uppercase()
}
