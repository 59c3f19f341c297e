//! # Previously, on lgx...
//!
//! 🎬 The cluster was down. Or up. Or half up. Nobody could tell, because the tests
//! kept needing it to be all three in the same afternoon.
//!
//! `InMemoryBackend` is a pretend index that does exactly what it's told. Every
//! request is recorded behind an `Arc<Mutex<...>>` so tests can peek at what arrived,
//! and every reply comes off a script: accept everything, reject some positions,
//! blow up the whole request, or just take its sweet time.
//!
//! ⚠️ This is for tests and dry runs. It remembers everything and indexes nothing. 🦆

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use crate::backends::{BulkResponse, IndexBackend, ItemResult};
use crate::composers::BulkItem;

/// 🎬 What the pretend cluster says to the next request. Unscripted requests get `Accept`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    /// ✅ everything created
    Accept,
    /// 💀 these positions (0-based, submission order) get an item-level error
    RejectPositions(Vec<usize>),
    /// 💀 the whole request fails before any item is looked at
    TransportError(String),
    /// 🐌 wait this long, then accept
    Stall(Duration),
}

/// 📦 A backend that never forgets. Clone it before handing it off; clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    /// 🔒 every request, as the list of items it carried
    received: Arc<Mutex<Vec<Vec<BulkItem>>>>,
    script: Arc<Mutex<VecDeque<ScriptedReply>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📝 Queue a reply for the next unanswered request.
    pub async fn script(&self, reply: ScriptedReply) {
        self.script.lock().await.push_back(reply);
    }

    /// 🔍 Everything that was sent, one inner `Vec` per request.
    pub async fn received(&self) -> Vec<Vec<BulkItem>> {
        self.received.lock().await.clone()
    }

    async fn answer(&self, items: &[BulkItem]) -> Result<Vec<ItemResult>> {
        self.received.lock().await.push(items.to_vec());
        let reply = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or(ScriptedReply::Accept);

        let rejected = match reply {
            ScriptedReply::Accept => Vec::new(),
            ScriptedReply::RejectPositions(positions) => positions,
            ScriptedReply::TransportError(message) => anyhow::bail!("💀 {message}"),
            ScriptedReply::Stall(pause) => {
                tokio::time::sleep(pause).await;
                Vec::new()
            }
        };

        Ok(items
            .iter()
            .enumerate()
            .map(|(position, item)| {
                let raw = if rejected.contains(&position) {
                    json!({
                        "_index": item.index,
                        "status": 400,
                        "error": {"type": "mapper_parsing_exception", "reason": "scripted rejection"}
                    })
                } else {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    json!({
                        "_index": item.index,
                        "_id": format!("mem-{id}"),
                        "status": 201,
                        "result": "created"
                    })
                };
                ItemResult::from_metadata(&raw, &item.index)
            })
            .collect())
    }
}

#[async_trait]
impl IndexBackend for InMemoryBackend {
    async fn bulk_write(&self, items: &[BulkItem]) -> Result<BulkResponse> {
        let items = self.answer(items).await?;
        Ok(BulkResponse {
            errors: items.iter().any(|item| !item.is_success()),
            items,
        })
    }

    async fn write(&self, item: &BulkItem) -> Result<ItemResult> {
        let mut results = self.answer(std::slice::from_ref(item)).await?;
        results
            .pop()
            .ok_or_else(|| anyhow::anyhow!("💀 the pretend cluster lost a document it was holding"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CanonicalDocument;

    fn item(n: u8) -> BulkItem {
        let doc: CanonicalDocument = serde_json::from_value(
            json!({"@timestamp": "2024-01-01T00:00:00.000Z", "message": n.to_string()}),
        )
        .unwrap();
        BulkItem::new("mem", doc)
    }

    #[tokio::test]
    async fn the_one_where_the_script_is_followed_to_the_letter() -> Result<()> {
        let backend = InMemoryBackend::new();
        backend.script(ScriptedReply::RejectPositions(vec![1])).await;
        backend.script(ScriptedReply::TransportError("cable unplugged".into())).await;

        let first = backend.bulk_write(&[item(1), item(2), item(3)]).await?;
        assert!(first.errors);
        let verdicts: Vec<bool> = first.items.iter().map(ItemResult::is_success).collect();
        assert_eq!(verdicts, vec![true, false, true]);

        let second = backend.bulk_write(&[item(4)]).await;
        assert!(second.is_err());

        let third = backend.write(&item(5)).await?;
        assert!(third.is_success(), "unscripted requests are accepted");

        assert_eq!(backend.received().await.len(), 3);
        Ok(())
    }
}
