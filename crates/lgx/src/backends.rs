//! 🔌 Backends — where the documents actually leave the building.
//!
//! 🎭 This module is the casting agency. Need to talk to a real Elasticsearch cluster?
//! We've got a backend for that. Need a pretend cluster that says exactly what a test
//! tells it to say? Also got one. Both speak [`IndexBackend`].
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls → [`BackendClient`] enum dispatcher
//! - Backends do I/O and parse replies. They don't batch, retry, or fall back.
//!   That's the `BatchWriter`'s whole personality.
//! - Transport errors come back as `Err`. Per-item rejections come back as `Ok`
//!   with an error on the item. The writer treats both the same way anyway.
//!
//! 🦆 The duck is here because every file must have one. Do not question the duck.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::composers::BulkItem;
use crate::common::value_to_text;

pub(crate) mod elasticsearch;
pub(crate) mod in_mem;

pub use elasticsearch::{ElasticsearchBackend, ElasticsearchConfig};
pub use in_mem::{InMemoryBackend, ScriptedReply};

/// 📬 The backend's verdict on one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemResult {
    pub index: String,
    pub id: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
    /// 📎 the per-item metadata exactly as the backend sent it
    pub raw: Value,
}

impl ItemResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_none_or(|status| (200..300).contains(&status))
    }

    /// 🔍 Read one item of a bulk reply (`{"index":{...}}`) or a single-doc reply (`{...}`).
    pub(crate) fn from_metadata(metadata: &Value, requested_index: &str) -> Self {
        // -- bulk items are wrapped in their action name; single replies aren't
        let body = match metadata.as_object() {
            Some(object) if object.len() == 1 && !object.contains_key("_index") => {
                object.values().next().unwrap_or(metadata)
            }
            _ => metadata,
        };
        let error = body.get("error").filter(|error| !error.is_null()).map(|error| {
            match (error.get("type"), error.get("reason")) {
                (Some(kind), Some(reason)) => format!("{}: {}", value_to_text(kind), value_to_text(reason)),
                _ => value_to_text(error),
            }
        });
        Self {
            index: body
                .get("_index")
                .and_then(Value::as_str)
                .unwrap_or(requested_index)
                .to_string(),
            id: body.get("_id").and_then(Value::as_str).map(str::to_string),
            status: body
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|status| u16::try_from(status).ok()),
            error,
            raw: body.clone(),
        }
    }
}

/// 📦 A bulk reply: per-item results in submission order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BulkResponse {
    /// the backend's own "something in here failed" flag
    pub errors: bool,
    pub items: Vec<ItemResult>,
}

/// 🚀 Something that can index documents, one at a time or in bulk.
///
/// # Contract 📜
/// - `bulk_write` returns one [`ItemResult`] per accepted slot, in submission order.
///   Fewer items than documents is allowed; the caller treats the missing ones as failed.
/// - `write` is the single-document version.
/// - Neither retries. Neither falls back. `Err` means the request itself failed.
#[async_trait]
pub trait IndexBackend: std::fmt::Debug + Send + Sync {
    async fn bulk_write(&self, items: &[BulkItem]) -> Result<BulkResponse>;
    async fn write(&self, item: &BulkItem) -> Result<ItemResult>;
}

/// 🎭 The many faces of an index backend.
#[derive(Debug)]
pub enum BackendClient {
    Elasticsearch(ElasticsearchBackend),
    InMemory(InMemoryBackend),
}

#[async_trait]
impl IndexBackend for BackendClient {
    async fn bulk_write(&self, items: &[BulkItem]) -> Result<BulkResponse> {
        match self {
            BackendClient::Elasticsearch(backend) => backend.bulk_write(items).await,
            BackendClient::InMemory(backend) => backend.bulk_write(items).await,
        }
    }

    async fn write(&self, item: &BulkItem) -> Result<ItemResult> {
        match self {
            BackendClient::Elasticsearch(backend) => backend.write(item).await,
            BackendClient::InMemory(backend) => backend.write(item).await,
        }
    }
}
