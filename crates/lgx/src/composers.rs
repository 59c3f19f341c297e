// ai
//! 🎼 Composers — documents in, `/_bulk` body out.
//!
//! 🎬 *[the batch is full. the backend awaits. somebody has to write the NDJSON.]*
//!
//! The bulk API has rules:
//! 1. Two lines per document. Action, then source. Always.
//! 2. Newline-delimited. Not commas. Not brackets. NEWLINES.
//! 3. The trailing newline on the whole body matters. It MATTERS.
//!
//! 🧠 Knowledge graph:
//! - [`BulkItem`]: one `(index target, document)` pair — the unit a batch is made of
//! - [`index_target`]: `{prefix}-{YYYY-MM-DD}` from the document's OWN timestamp,
//!   so one batch can land in several daily indices. Midnight is not our problem.
//! - [`BulkComposer::compose`]: 2×N lines plus the trailing `\n`
//!
//! 🦆 (the duck has read the bulk API docs. the duck has questions.)

use anyhow::{Context, Result};
use serde_json::json;

use crate::common::CanonicalDocument;

/// 📦 One slot in a batch: where it's going, and what's going there.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub index: String,
    pub document: CanonicalDocument,
}

impl BulkItem {
    pub fn new(index_prefix: &str, document: CanonicalDocument) -> Self {
        Self {
            index: index_target(index_prefix, &document),
            document,
        }
    }
}

/// 📅 `app-logs` + a document from 2023-11-14 → `app-logs-2023-11-14`.
pub fn index_target(index_prefix: &str, document: &CanonicalDocument) -> String {
    format!("{}-{}", index_prefix, document.index_date())
}

/// 🎼 Builds the NDJSON `/_bulk` request body.
#[derive(Debug, Clone, Copy)]
pub struct BulkComposer;

impl BulkComposer {
    /// 📎 `{"index":{"_index":"<target>"}}` — the cover letter for each document.
    pub fn action_line(index: &str) -> Result<String> {
        serde_json::to_string(&json!({ "index": { "_index": index } })).context(
            "💀 Failed to serialize bulk action metadata. \
             The JSON that describes JSON has failed to become JSON.",
        )
    }

    /// 🎼 Action line + source line per item, each `\n`-terminated.
    pub fn compose(items: &[BulkItem]) -> Result<String> {
        let mut payload = String::with_capacity(items.len() * 256);
        for item in items {
            payload.push_str(&Self::action_line(&item.index)?);
            payload.push('\n');
            let source = serde_json::to_string(&item.document).context(format!(
                "💀 A document bound for '{}' refused to become JSON. \
                 It was a struct a moment ago. It had such promise.",
                item.index
            ))?;
            payload.push_str(&source);
            payload.push('\n');
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn doc(timestamp: &str, message: &str) -> CanonicalDocument {
        serde_json::from_value(json!({ "@timestamp": timestamp, "message": message }))
            .expect("💀 fixture document should deserialize")
    }

    #[test]
    fn the_one_where_n_documents_become_two_n_lines() -> Result<()> {
        let items = vec![
            BulkItem::new("app", doc("2023-11-14T23:59:59.999Z", "before midnight")),
            BulkItem::new("app", doc("2023-11-15T00:00:00.000Z", "after midnight")),
            BulkItem::new("app", doc("2024-02-29T12:00:00.000Z", "leap day")),
        ];

        let body = BulkComposer::compose(&items)?;
        assert!(body.ends_with('\n'), "the bulk API wants its trailing newline");

        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 6);

        let targets: Vec<String> = lines
            .iter()
            .step_by(2)
            .map(|line| {
                let action: Value = serde_json::from_str(line).unwrap();
                action["index"]["_index"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(targets, vec!["app-2023-11-14", "app-2023-11-15", "app-2024-02-29"]);

        let second_source: Value = serde_json::from_str(lines[3])?;
        assert_eq!(second_source["message"], "after midnight");
        Ok(())
    }

    #[test]
    fn the_one_where_an_empty_batch_composes_to_nothing() -> Result<()> {
        assert!(BulkComposer::compose(&[])?.is_empty());
        Ok(())
    }

    #[test]
    fn the_one_where_the_action_line_names_only_the_index() -> Result<()> {
        assert_eq!(
            BulkComposer::action_line("logs-2024-01-01")?,
            r#"{"index":{"_index":"logs-2024-01-01"}}"#
        );
        Ok(())
    }
}
