//! 🪶 Plain transform — the "no index, just tell me what happened" profile.
//!
//! Keeps the correlation id, the message and the stack. Everything else is dropped on
//! purpose: this is what lands on stdout when there's nowhere fancier to go.

use super::Normalize;
use crate::common::{MinimalDocument, RawRecord, is_truthy, value_to_text};

/// 🪶 The minimal profile. Produces a [`MinimalDocument`].
#[derive(Debug, Clone, Copy)]
pub struct PlainLine;

impl Normalize for PlainLine {
    type Output = MinimalDocument;

    fn normalize(record: &RawRecord) -> MinimalDocument {
        let message = record
            .get("msg")
            .filter(|msg| is_truthy(msg))
            .map(value_to_text);
        let stack = record
            .get("err")
            .filter(|err| is_truthy(err))
            .and_then(|err| err.get("stack"))
            .filter(|stack| !stack.is_null())
            .map(value_to_text);
        let id = record
            .get("req")
            .filter(|req| is_truthy(req))
            .and_then(|req| req.get("id"))
            .filter(|id| !id.is_null())
            .map(value_to_text);
        MinimalDocument { id, message, stack }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::{Value, json};

    fn raw(value: Value) -> RawRecord {
        match value {
            Value::Object(fields) => RawRecord::new(fields, Utc::now()),
            other => panic!("💀 fixture must be an object, got {other}"),
        }
    }

    #[test]
    fn the_one_where_only_the_essentials_survive() {
        let minimal = PlainLine::normalize(&raw(json!({
            "msg": "payment failed",
            "level": "error",
            "hostname": "box",
            "err": {"type": "Error", "message": "declined", "stack": "Error: declined"},
            "req": {"id": "req-7", "method": "POST"}
        })));
        assert_eq!(
            minimal,
            MinimalDocument {
                id: Some("req-7".into()),
                message: Some("payment failed".into()),
                stack: Some("Error: declined".into()),
            }
        );
    }

    #[test]
    fn the_one_where_a_bare_message_is_just_a_message() {
        let minimal = PlainLine::normalize(&raw(json!({"msg": "hi", "stack": "ignored here"})));
        assert_eq!(minimal.render_line(), "hi");
    }

    #[test]
    fn the_one_where_an_empty_record_renders_an_empty_line() {
        assert_eq!(PlainLine::normalize(&raw(json!({}))).render_line(), "");
    }
}
