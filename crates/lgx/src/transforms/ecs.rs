// ai
//! 📡 ECS transform — pino-ish records into Elastic Common Schema-ish documents 🚀
//!
//! 🧠 Knowledge graph:
//! - `msg` → `message`, `level` → `log.level`, `log_from` → `log.source`
//! - `hostname` → `host.hostname`, `pid` → `process.id`
//! - `err` / `stack` → `error.{code,message,stack}` (structured `err` wins)
//! - `req` → `http.request.*`, `url.*`, `client.*`, `event.id`, `user_agent.original`
//! - `res` → `http.response.*`
//! - header maps are copied, never edited: extracted keys are left out of the copy
//!
//! ⚠️ 204/205/304 responses still get `body.bytes` if a content-length shows up.
//! Deciding those have no body is the request-timing middleware's business, not ours. 🦆

use serde_json::{Map, Value};

use super::Normalize;
use crate::common::{
    BodyFields, CanonicalDocument, ClientFields, ErrorFields, EventFields, HostFields,
    HttpFields, HttpRequestFields, HttpResponseFields, LogFields, ProcessFields, RawRecord,
    UrlFields, UserAgentFields, is_truthy, value_to_text,
};

const USER_AGENT_HEADER: &str = "user-agent";
const CONTENT_LENGTH_HEADER: &str = "content-length";
const HOST_HEADER: &str = "host";

/// 📡 The rich profile. Produces a [`CanonicalDocument`] ready for a bulk body.
#[derive(Debug, Clone, Copy)]
pub struct EcsDocument;

impl Normalize for EcsDocument {
    type Output = CanonicalDocument;

    fn normalize(record: &RawRecord) -> CanonicalDocument {
        let level = truthy(record, "level");
        let source = truthy(record, "log_from");
        let log = (level.is_some() || source.is_some()).then(|| LogFields { level, source });

        let request = record.get("req").and_then(Value::as_object);
        let response = record.get("res").and_then(Value::as_object);

        let mut doc = CanonicalDocument {
            timestamp: record.timestamp_iso(),
            message: truthy(record, "msg").map(|msg| value_to_text(&msg)),
            log,
            host: truthy(record, "hostname").map(|hostname| HostFields { hostname }),
            process: truthy(record, "pid").map(|id| ProcessFields { id }),
            error: error_fields(record),
            event: None,
            http: None,
            url: None,
            client: None,
            user_agent: None,
        };

        let mut http = HttpFields {
            request: None,
            response: None,
        };
        if let Some(request) = request {
            apply_request(&mut doc, &mut http, request);
        }
        if let Some(response) = response {
            http.response = Some(response_fields(response));
        }
        if http.request.is_some() || http.response.is_some() {
            doc.http = Some(http);
        }
        doc
    }
}

/// 🔎 A top-level field, but only if it's truthy. `""`, `0`, `null` and `false` don't count.
fn truthy(record: &RawRecord, key: &str) -> Option<Value> {
    record.get(key).filter(|value| is_truthy(value)).cloned()
}

/// 🔎 A nested field, as long as it isn't `null`.
fn present(object: &Map<String, Value>, key: &str) -> Option<Value> {
    object.get(key).filter(|value| !value.is_null()).cloned()
}

/// 💀 `err` or a bare `stack` means there's an error group. A structured `err` object
/// supplies everything; otherwise the top-level message and stack stand in.
fn error_fields(record: &RawRecord) -> Option<ErrorFields> {
    let err = record.get("err").filter(|value| is_truthy(value));
    let stack = truthy(record, "stack");
    if err.is_none() && stack.is_none() {
        return None;
    }

    Some(match err {
        Some(Value::Object(err)) => ErrorFields {
            code: present(err, "type"),
            message: present(err, "message"),
            stack: present(err, "stack"),
        },
        // -- `err` that isn't an object is just a message wearing a costume
        Some(loose) => ErrorFields {
            code: None,
            message: Some(loose.clone()),
            stack,
        },
        None => ErrorFields {
            code: None,
            message: truthy(record, "msg"),
            stack,
        },
    })
}

fn apply_request(doc: &mut CanonicalDocument, http: &mut HttpFields, request: &Map<String, Value>) {
    doc.event = request
        .get("id")
        .filter(|id| is_truthy(id))
        .map(|id| EventFields { id: id.clone() });

    let mut request_fields = HttpRequestFields {
        method: present(request, "method"),
        headers: None,
        body: None,
    };

    let mut url = UrlFields {
        path: present(request, "url"),
        domain: None,
        port: None,
    };

    if let Some(headers) = request.get("headers").and_then(Value::as_object) {
        if let Some(host) = header(headers, HOST_HEADER).and_then(Value::as_str) {
            let (domain, port) = split_host_port(host);
            url.domain = Some(domain.to_string());
            url.port = port;
        }

        let user_agent = header(headers, USER_AGENT_HEADER).filter(|value| is_truthy(value));
        let content_length = header(headers, CONTENT_LENGTH_HEADER).filter(|value| is_truthy(value));

        doc.user_agent = user_agent.map(|original| UserAgentFields {
            original: original.clone(),
        });
        request_fields.body = content_length.and_then(body_bytes);

        let mut extracted = Vec::with_capacity(2);
        if user_agent.is_some() {
            extracted.push(USER_AGENT_HEADER);
        }
        if content_length.is_some() {
            extracted.push(CONTENT_LENGTH_HEADER);
        }
        request_fields.headers = remaining_headers(headers, &extracted);
    }

    let client = ClientFields {
        address: present(request, "remoteAddress"),
        port: present(request, "remotePort"),
    };

    if url.path.is_some() || url.domain.is_some() {
        doc.url = Some(url);
    }
    if client.address.is_some() || client.port.is_some() {
        doc.client = Some(client);
    }
    http.request = Some(request_fields);
}

fn response_fields(response: &Map<String, Value>) -> HttpResponseFields {
    let mut fields = HttpResponseFields {
        status_code: present(response, "statusCode"),
        headers: None,
        body: None,
    };
    if let Some(headers) = response.get("headers").and_then(Value::as_object) {
        let content_length = header(headers, CONTENT_LENGTH_HEADER).filter(|value| is_truthy(value));
        fields.body = content_length.and_then(body_bytes);
        let extracted: &[&str] = if content_length.is_some() {
            &[CONTENT_LENGTH_HEADER]
        } else {
            &[]
        };
        fields.headers = remaining_headers(headers, extracted);
    }
    fields
}

/// 🔎 Header lookup, case-insensitive, because HTTP said so.
fn header<'a>(headers: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
}

/// 📋 A fresh copy of the header map minus the extracted keys. `None` if nothing is left.
fn remaining_headers(headers: &Map<String, Value>, extracted: &[&str]) -> Option<Map<String, Value>> {
    let remaining: Map<String, Value> = headers
        .iter()
        .filter(|(key, _)| !extracted.iter().any(|name| key.eq_ignore_ascii_case(name)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    (!remaining.is_empty()).then_some(remaining)
}

/// 📏 `content-length` arrives as `"123"` or `123`. Anything else doesn't get a body size.
fn body_bytes(value: &Value) -> Option<BodyFields> {
    let bytes = match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }?;
    Some(BodyFields { bytes })
}

/// 🔪 `example.com:8080` → (`example.com`, Some(8080)). Splits on the LAST colon,
/// so `[::1]:8080` works; a bracketed IPv6 host with no port stays whole.
fn split_host_port(host: &str) -> (&str, Option<u16>) {
    if host.ends_with(']') {
        return (host, None);
    }
    match host.rsplit_once(':') {
        Some((domain, port)) => (domain, port.parse().ok()),
        None => (host, None),
    }
}
