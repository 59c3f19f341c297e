//! 🕰️ Time-like field resolution.
//!
//! Producers say "when" in a dozen dialects: epoch millis, RFC 3339, RFC 2822,
//! a bare date. We squint at the first time-like field and settle on one UTC instant.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Number, Value};

/// 🔎 Looked up in this order; the first one present wins, even if it's garbage.
const TIME_LIKE_FIELDS: [&str; 3] = ["time", "timestamp", "@timestamp"];

/// 📏 ±100,000,000 days around the epoch, the classic JavaScript `Date` range.
const MAX_EPOCH_MILLIS: f64 = 8.64e15;

/// 📅 Four-digit years only. Index names and `@timestamp` both assume `YYYY-`.
const LAST_FOUR_DIGIT_YEAR: i32 = 9999;

/// 🕰️ ISO-ish shapes with an offset that RFC 3339 is too strict for:
/// `+0000` without the colon, or no seconds at all.
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M%z",
];

/// 🕰️ No offset at all (or a bare `Z` on a seconds-less time): read as UTC.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%dT%H:%M",
];

/// 🕰️ Settle on the record's timestamp.
///
/// - non-empty string → parsed, `None` if no format fits
/// - non-negative number → epoch millis (fraction dropped), `None` if out of range
/// - anything else, or no time-like field at all → `now`
///
/// Instants past year 9999 are `None` too; they have no `YYYY-MM-DD` to index under.
pub(crate) fn resolve_timestamp(
    fields: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let candidate = TIME_LIKE_FIELDS.iter().find_map(|key| fields.get(*key));
    let resolved = match candidate {
        Some(Value::String(text)) if !text.is_empty() => parse_time_text(text),
        Some(Value::Number(number)) if number.as_f64().is_some_and(|n| n >= 0.0) => {
            from_epoch_millis(number)
        }
        _ => Some(now),
    };
    resolved.filter(|instant| (0..=LAST_FOUR_DIGIT_YEAR).contains(&instant.year()))
}

fn from_epoch_millis(number: &Number) -> Option<DateTime<Utc>> {
    let millis = number.as_f64()?.trunc();
    if !millis.is_finite() || millis > MAX_EPOCH_MILLIS {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}

fn parse_time_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_rfc2822(text))
        .ok()
        .or_else(|| {
            OFFSET_FORMATS
                .iter()
                .find_map(|format| DateTime::parse_from_str(text, format).ok())
        })
        .map(|parsed| parsed.with_timezone(&Utc))
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}
