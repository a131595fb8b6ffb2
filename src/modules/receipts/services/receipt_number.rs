// Receipt number scheme: RCP-{YYYY}{MM}-{NNNN}, sequence taken from the
// school's receipt count in the calendar month. The count-then-format read
// can race under concurrent creation; the storage unique index is the
// backstop and callers retry with a fresh count, then fall back to a random
// suffix. Numbers are unique, not gap-free or strictly monotonic.

use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

/// Sequential number for the given month: `RCP-202608-0042`
pub fn format_receipt_number(at: DateTime<Utc>, sequence: i64) -> String {
    format!("RCP-{:04}{:02}-{:04}", at.year(), at.month(), sequence)
}

/// Availability fallback when sequential allocation keeps colliding:
/// same prefix, random uppercase suffix
pub fn fallback_receipt_number(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!("RCP-{:04}{:02}-{}", at.year(), at.month(), suffix)
}

/// Lookup normalization: receipt numbers compare case-insensitively
pub fn normalize(raw: &str) -> String {
    raw.trim().to_uppercase()
}
