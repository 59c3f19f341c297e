//! 📦 Common data structures — the building blocks of lgx
//!
//! 🎬 COLD OPEN — INT. SOME APP'S STDOUT — 3:47 AM
//!
//! A line of JSON is printed. Nobody reads it. It scrolls off the terminal
//! and into a pipe, and from the pipe into us. We turn it into a [`RawRecord`],
//! the [`RawRecord`] into a [`CanonicalDocument`], and the document into a row
//! in an index somebody will grep at 9am wondering why prod fell over.
//!
//! If the index is down, the document degrades into a [`MinimalDocument`] and
//! gets printed anyway. Nobody gets lost. Some of them just get less fancy. 🦆

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================
// 📥 RawRecord — parsed, stamped, not yet normalized
// ============================================================

/// 📥 One parsed line: an open JSON object plus the timestamp we settled on.
///
/// The timestamp is kept out of the field map so there's exactly one source of truth
/// for "when did this happen". The original `time` field stays in `fields` untouched;
/// the normalizer never reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    timestamp: DateTime<Utc>,
    fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(fields: Map<String, Value>, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, fields }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 🕰️ `2023-11-14T22:13:20.000Z` — millis, always, with the Z. One format to rule them all.
    pub fn timestamp_iso(&self) -> String {
        to_iso_millis(self.timestamp)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// 🕰️ Canonical timestamp rendering shared by the splitter and the normalizer.
pub(crate) fn to_iso_millis(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================
// 🚨 UnknownLine — the lines that didn't make it
// ============================================================

/// 🚨 A line the splitter refused, and why. Diagnostic only, never delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLine {
    pub line: String,
    pub reason: String,
}

// ============================================================
// 📤 CanonicalDocument — the ECS-shaped thing the index gets
// ============================================================

/// 📤 The backend-ready document. Groups are `None` (and skipped on the wire)
/// unless the raw record actually carried the matching input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<HostFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<ProcessFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<UrlFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<UserAgentFields>,
}

impl CanonicalDocument {
    /// 📅 `YYYY-MM-DD` slice of the document's own timestamp. Drives the daily index name.
    pub fn index_date(&self) -> &str {
        self.timestamp.get(..10).unwrap_or(&self.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostFields {
    pub hostname: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessFields {
    pub id: Value,
}

/// 💀 `error.stack` is not ECS-standard. We ship it anyway, stack traces are the whole point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFields {
    pub id: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<HttpRequestFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<HttpResponseFields>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyFields>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponseFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyFields>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyFields {
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAgentFields {
    pub original: Value,
}

// ============================================================
// 🪶 MinimalDocument — the fallback profile
// ============================================================

/// 🪶 What's left of a log line when the fancy schema isn't an option.
///
/// Correlation id, message, stack. Rendered as a single line for stdout or a file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MinimalDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl MinimalDocument {
    /// 📝 `"<id> <message> <stack>"`, absent parts skipped. Could be an empty string.
    /// An empty line in the fallback is still a line that says "something happened here".
    pub fn render_line(&self) -> String {
        [&self.id, &self.message, &self.stack]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<&CanonicalDocument> for MinimalDocument {
    fn from(doc: &CanonicalDocument) -> Self {
        Self {
            id: doc.event.as_ref().map(|event| value_to_text(&event.id)),
            message: doc.message.clone(),
            stack: doc
                .error
                .as_ref()
                .and_then(|error| error.stack.as_ref())
                .filter(|stack| !stack.is_null())
                .map(value_to_text),
        }
    }
}

// ============================================================
// 📬 DeliveryOutcome — what happened to one document
// ============================================================

/// 📬 Per-document verdict from a flush. Order matches submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// ✅ The backend took it and gave it an id.
    Inserted { index: String, id: Option<String> },
    /// 💀 The backend didn't, and the fallback sink got it instead.
    Failed { index: String, reason: String },
}

impl DeliveryOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, DeliveryOutcome::Inserted { .. })
    }
}

// ============================================================
// 🔧 tiny JSON helpers
// ============================================================

/// 🔧 Strings come out bare, everything else as its JSON text. `42` → `"42"`, `"hi"` → `"hi"`.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// 🔧 Log producers test fields the loose way: `""`, `0`, `false` and `null` all mean "not really there".
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
