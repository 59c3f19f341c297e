use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use flate2::{Compression, write::GzEncoder};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::backends::{BulkResponse, IndexBackend, ItemResult};
use crate::composers::{BulkComposer, BulkItem};

// 📡 ElasticsearchConfig — lives right next to the backend that uses it.
// One backend = one config = one file. No "where is that defined" scavenger hunt at 2am.
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchConfig {
    /// 📡 Cluster root, e.g. `http://localhost:9200`.
    pub url: String,
    /// 📦 Daily indices are named `{index_prefix}-{YYYY-MM-DD}`.
    #[serde(alias = "index")]
    pub index_prefix: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key beats basic auth when both are set. This is not a democracy.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 🫁 gzip request bodies. Bulk bodies are very squishy.
    #[serde(default)]
    pub compress_requests: bool,
}

// ⏱️ 30 seconds — long enough for a meaty bulk, short enough that a hung cluster
// shows up as a failure instead of a stall
fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// 📡 Talks `/_bulk` and `/{index}/_doc` over HTTP. Pure I/O, zero buffering.
///
/// Internally holds:
/// - `client`: the HTTP muscle 💪, reused across requests
/// - `config`: auth, URL, timeouts
///
/// 🔄 Never retries. A failed request is the `BatchWriter`'s problem, and the
/// `BatchWriter` solves it by writing to the fallback sink and moving on.
#[derive(Debug)]
pub struct ElasticsearchBackend {
    client: reqwest::Client,
    config: ElasticsearchConfig,
}

impl ElasticsearchBackend {
    /// 🚀 Build the HTTP client. No network traffic happens here.
    pub fn new(config: ElasticsearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. We tried to build a reqwest::Client and the universe said 'no'. Probably a TLS setup problem.")?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    /// 📡 "Hello? Is this thing on?" — a GET on the cluster root.
    ///
    /// Only logs. An unreachable cluster at startup is not fatal: documents will go
    /// to the fallback sink until it comes back.
    pub async fn ping(&self) -> bool {
        let request = self.authorize(self.client.get(&self.config.url));
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!("✅ cluster at {} answered the door", self.config.url);
                true
            }
            Ok(response) => {
                warn!(
                    "⚠️ cluster at {} answered with {} — documents may end up in the fallback sink",
                    self.config.url,
                    response.status()
                );
                false
            }
            Err(err) => {
                warn!(
                    "⚠️ cluster at {} is not answering ({}) — documents will end up in the fallback sink until it does",
                    self.config.url, err
                );
                false
            }
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    /// 🔒 API key first, basic auth second, nothing third.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else {
            request
        }
    }

    /// 🫁 Attach the body, gzipped if configured.
    fn with_body(
        &self,
        request: reqwest::RequestBuilder,
        body: String,
    ) -> Result<reqwest::RequestBuilder> {
        if !self.config.compress_requests {
            return Ok(request.body(body));
        }
        let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 4), Compression::default());
        encoder
            .write_all(body.as_bytes())
            .context("💀 gzip choked on the request body. The bytes were not squishy after all.")?;
        let compressed = encoder
            .finish()
            .context("💀 gzip swallowed the body and then couldn't close its mouth.")?;
        Ok(request.header("Content-Encoding", "gzip").body(compressed))
    }

    /// 📡 Send, then insist on a 2xx and a JSON body.
    async fn send_for_json(&self, request: reqwest::RequestBuilder, what: &str) -> Result<Value> {
        let response = request.send().await.context(format!(
            "💀 The {what} request never made it to Elasticsearch. \
             Check connectivity, check timeouts, check your feelings."
        ))?;

        let status = response.status();
        let body = response.text().await.context(format!(
            "💀 Elasticsearch answered the {what} request, then the body evaporated mid-read."
        ))?;
        if !status.is_success() {
            anyhow::bail!(
                "💀 The {what} request arrived, but Elasticsearch said '{}'. The body of the response read: '{}'.",
                status,
                body
            );
        }
        serde_json::from_str(&body).context(format!(
            "💀 Elasticsearch said yes to the {what} request in a dialect that isn't JSON."
        ))
    }
}

#[async_trait]
impl IndexBackend for ElasticsearchBackend {
    /// 📡 POST the composed NDJSON to `/_bulk` and read the per-item verdicts.
    async fn bulk_write(&self, items: &[BulkItem]) -> Result<BulkResponse> {
        let payload = BulkComposer::compose(items)?;
        debug!(
            "📡 sending {} documents ({} bytes) to /_bulk",
            items.len(),
            payload.len()
        );

        let request = self
            .authorize(self.client.post(self.endpoint("_bulk")))
            // ⚠️ application/x-ndjson, not application/json. ES cares. Deeply.
            .header("Content-Type", "application/x-ndjson");
        let request = self.with_body(request, payload)?;
        let reply = self.send_for_json(request, "bulk").await?;

        let results = reply
            .get("items")
            .and_then(Value::as_array)
            .map(|raw_items| {
                raw_items
                    .iter()
                    .zip(items)
                    .map(|(raw, item)| ItemResult::from_metadata(raw, &item.index))
                    .collect()
            })
            .unwrap_or_default();
        trace!("🚀 bulk reply carried verdicts for {} documents", items.len());

        Ok(BulkResponse {
            errors: reply.get("errors").and_then(Value::as_bool).unwrap_or(false),
            items: results,
        })
    }

    /// 📡 POST one document to `/{index}/_doc`.
    async fn write(&self, item: &BulkItem) -> Result<ItemResult> {
        let body = serde_json::to_string(&item.document).context(
            "💀 A single document refused to become JSON on its way to /_doc.",
        )?;
        let request = self
            .authorize(self.client.post(self.endpoint(&format!("{}/_doc", item.index))))
            .header("Content-Type", "application/json");
        let request = self.with_body(request, body)?;
        let reply = self.send_for_json(request, "index").await?;
        Ok(ItemResult::from_metadata(&reply, &item.index))
    }
}
