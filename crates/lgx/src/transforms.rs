// ai
//! 🔄 Transforms — raw records in, canonical shapes out 🎭
//!
//! 🎬 COLD OPEN — INT. SCHEMA REVIEW — 4:55 PM ON A FRIDAY
//!
//! "Every service logs the same fields," they said. One service calls it `msg`.
//! One nests the request under `req`. One sends `pid` as a string because of course it does.
//! This module is where all of that gets flattened into one schema the index can search.
//!
//! ## Knowledge Graph 🧠
//! - [`EcsDocument`]: rich profile, `RawRecord` → [`CanonicalDocument`] (ECS-ish, nested groups)
//! - [`PlainLine`]: minimal profile, `RawRecord` → [`MinimalDocument`] (id, message, stack)
//! - Pattern: zero-sized marker types + a static trait method. No state. No I/O. No clock.
//!   Same input, same output, every time.
//!
//! ```text
//!   RawRecord ──┬── EcsDocument ──▶ CanonicalDocument ──▶ bulk body
//!               └── PlainLine   ──▶ MinimalDocument   ──▶ one line on stdout
//! ```

use crate::common::RawRecord;

pub(crate) mod ecs;
pub(crate) mod plain;

pub use ecs::EcsDocument;
pub use plain::PlainLine;

/// 🔄 A pure mapping from a raw record to some output document shape.
///
/// # Contract 📜
/// - No I/O, no ambient state, no wall clock: the record already carries its timestamp.
/// - Missing optional inputs are omitted from the output, never an error.
/// - The input is borrowed and never mutated.
pub trait Normalize {
    type Output;

    fn normalize(record: &RawRecord) -> Self::Output;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::{SplitOutcome, parse_line};

    fn record(line: &str) -> RawRecord {
        match parse_line(line) {
            SplitOutcome::Record(record) => record,
            SplitOutcome::Unknown(unknown) => panic!("💀 fixture did not parse: {unknown:?}"),
        }
    }

    /// 🧪 The grand tour: one NDJSON line, through the splitter, into both profiles.
    #[test]
    fn the_one_where_one_line_feeds_both_profiles() {
        let raw = record(
            r#"{"msg":"hello","time":1700000000000,"err":{"type":"Error","message":"bad","stack":"Error: bad"},"req":{"id":9}}"#,
        );

        let rich = EcsDocument::normalize(&raw);
        assert_eq!(rich.message.as_deref(), Some("hello"));
        assert_eq!(rich.timestamp, "2023-11-14T22:13:20.000Z");

        let plain = PlainLine::normalize(&raw);
        assert_eq!(plain.render_line(), "9 hello Error: bad");
    }

    #[test]
    fn the_one_where_normalizing_twice_changes_nothing() {
        let raw = record(
            r#"{"msg":"again","time":"2024-01-02T03:04:05.678Z","req":{"headers":{"user-agent":"curl","x-a":"1"}}}"#,
        );
        let first = serde_json::to_string(&EcsDocument::normalize(&raw)).unwrap();
        let second = serde_json::to_string(&EcsDocument::normalize(&raw)).unwrap();
        assert_eq!(first, second);
        assert_eq!(PlainLine::normalize(&raw), PlainLine::normalize(&raw));
    }
}
