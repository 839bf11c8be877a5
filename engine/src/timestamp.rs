//! Modification timestamps and offline identifier synthesis.
//!
//! Timestamps travel as formatted strings but are always compared as
//! calendar instants, never lexically.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

/// Format used for timestamps stamped by the engine.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a stored timestamp into a UTC instant.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]`, `YYYY-MM-DDTHH:MM:SS[.fff]`
/// and bare dates (midnight). Zone-less values are taken as UTC.
pub fn parse(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Compare two stored timestamps by time.
///
/// Returns `None` when either side cannot be parsed.
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    Some(parse(a)?.cmp(&parse(b)?))
}

/// True only when `local` is strictly later than `remote`.
///
/// Missing or unparseable values are never newer.
pub fn is_newer(local: Option<&str>, remote: Option<&str>) -> bool {
    match (local, remote) {
        (Some(local), Some(remote)) => compare(local, remote) == Some(Ordering::Greater),
        _ => false,
    }
}

/// Current time in the engine's stamp format.
pub fn now() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

static LAST_ISSUED_ID: AtomicI64 = AtomicI64::new(0);

/// Synthesize an identifier for an offline-created record.
///
/// The value is the current Unix time in milliseconds, bumped past the
/// last issued value so identifiers stay unique within the process.
pub fn next_local_id() -> String {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_ISSUED_ID.load(AtomicOrdering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_ISSUED_ID.compare_exchange_weak(
            last,
            candidate,
            AtomicOrdering::Relaxed,
            AtomicOrdering::Relaxed,
        ) {
            Ok(_) => return candidate.to_string(),
            Err(actual) => last = actual,
        }
    }
}
