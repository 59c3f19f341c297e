// ai
//! ✂️ The Line Splitter — bytes in, records out, garbage politely declined.
//!
//! 🎬 *[a pipe fills with bytes. some are JSON. some are `true`. one is a stack trace
//! somebody printed with `println!`. the splitter sees them all.]*
//!
//! 🧠 Knowledge graph:
//! - [`LineSplitter`] finds `\n` boundaries with `memchr`, carrying the unfinished tail
//!   across chunks. `\r\n` is tolerated. Blank lines are skipped without comment.
//! - [`parse_line`] decides what a line is:
//!   objects → records (timestamp re-derived), strings/numbers → `{ msg }` records,
//!   `null`/booleans/arrays/broken JSON/unparseable times → [`UnknownLine`].
//! - [`split_stream`] is the async driver. It pushes records into a bounded channel,
//!   so a slow writer stalls the reader instead of growing the heap.
//!
//! ```text
//! reader ──bytes──▶ LineSplitter ──RawRecord──▶ bounded channel ──▶ WriterWorker
//!                        │
//!                        └──UnknownLine──▶ EventBus + warn!
//! ```
//!
//! Nothing in here returns an error for bad input. Bad input is a Tuesday. 🦆

mod timestamp;

use anyhow::{Context, Result};
use async_channel::Sender;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{trace, warn};

use crate::common::{RawRecord, UnknownLine};
use crate::events::{EventBus, PipelineEvent};
use timestamp::resolve_timestamp;

pub const NULL_VALUE_IGNORED: &str = "Null value ignored";
pub const BOOLEAN_VALUE_IGNORED: &str = "Boolean value ignored";
pub const ARRAY_VALUE_IGNORED: &str = "Array value ignored";
pub const INVALID_TIME_VALUE: &str = "Invalid time value";

// 📦 64KiB per read — big enough to amortize syscalls, small enough to not care
const READ_CHUNK_BYTES: usize = 64 * 1024;

/// ✂️ What one line turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitOutcome {
    Record(RawRecord),
    Unknown(UnknownLine),
}

/// 🎯 Parse one line using the wall clock for records that carry no usable time.
pub fn parse_line(line: &str) -> SplitOutcome {
    parse_line_at(line, Utc::now())
}

/// 🎯 Same as [`parse_line`] but with an injected "now". Pure.
pub fn parse_line_at(line: &str, now: DateTime<Utc>) -> SplitOutcome {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(decode_error) => return unknown(line, decode_error.to_string()),
    };

    match value {
        Value::Null => unknown(line, NULL_VALUE_IGNORED),
        Value::Bool(_) => unknown(line, BOOLEAN_VALUE_IGNORED),
        Value::Array(_) => unknown(line, ARRAY_VALUE_IGNORED),
        scalar @ (Value::String(_) | Value::Number(_)) => {
            // 📦 bare scalars become the message of an otherwise empty record
            let mut fields = Map::new();
            fields.insert("msg".to_string(), scalar);
            SplitOutcome::Record(RawRecord::new(fields, now))
        }
        Value::Object(fields) => match resolve_timestamp(&fields, now) {
            Some(timestamp) => SplitOutcome::Record(RawRecord::new(fields, timestamp)),
            None => unknown(line, INVALID_TIME_VALUE),
        },
    }
}

fn unknown(line: &str, reason: impl Into<String>) -> SplitOutcome {
    SplitOutcome::Unknown(UnknownLine {
        line: line.to_string(),
        reason: reason.into(),
    })
}

/// ✂️ Stateful record-boundary splitter. Feed it chunks, it hands back whole lines, parsed.
#[derive(Debug, Default)]
pub struct LineSplitter {
    /// 🧺 bytes after the last `\n` we've seen, waiting for their terminator
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// ✂️ Split a chunk. Complete lines are parsed now; the tail waits for the next chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SplitOutcome> {
        self.feed_at(chunk, Utc::now())
    }

    pub(crate) fn feed_at(&mut self, chunk: &[u8], now: DateTime<Utc>) -> Vec<SplitOutcome> {
        let mut outcomes = Vec::new();
        let mut line_start = 0;
        for newline_at in memchr::memchr_iter(b'\n', chunk) {
            let piece = &chunk[line_start..newline_at];
            if self.pending.is_empty() {
                decode_line(piece, now, &mut outcomes);
            } else {
                self.pending.extend_from_slice(piece);
                let stitched = std::mem::take(&mut self.pending);
                decode_line(&stitched, now, &mut outcomes);
            }
            line_start = newline_at + 1;
        }
        self.pending.extend_from_slice(&chunk[line_start..]);
        outcomes
    }

    /// 🏁 End of stream: whatever is left is the last line, terminator or not.
    pub fn finish(&mut self) -> Option<SplitOutcome> {
        self.finish_at(Utc::now())
    }

    pub(crate) fn finish_at(&mut self, now: DateTime<Utc>) -> Option<SplitOutcome> {
        let leftover = std::mem::take(&mut self.pending);
        let mut outcomes = Vec::with_capacity(1);
        decode_line(&leftover, now, &mut outcomes);
        outcomes.pop()
    }
}

fn decode_line(raw: &[u8], now: DateTime<Utc>, outcomes: &mut Vec<SplitOutcome>) {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if line.trim().is_empty() {
        return;
    }
    outcomes.push(parse_line_at(&line, now));
}

/// 📊 What the splitter saw on its way through a stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SplitStats {
    /// non-blank lines
    pub lines: u64,
    pub records: u64,
    pub unknown: u64,
}

/// 🚰 Drive a reader to EOF, sending records downstream and unknown lines to the event bus.
///
/// `records.send` awaits when the channel is full. That's the backpressure.
/// Returns early (with what it has) if the receiving side hangs up.
/// 💀 Only read errors come back as `Err`.
pub async fn split_stream<R>(
    mut reader: R,
    records: Sender<RawRecord>,
    events: &EventBus,
) -> Result<SplitStats>
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut stats = SplitStats::default();
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];

    loop {
        let bytes_read = reader.read(&mut chunk).await.context(
            "💀 The input stream stopped making sense at the byte level. \
             Not bad JSON — the read itself failed. Pipe closed weird, file vanished, something.",
        )?;
        if bytes_read == 0 {
            break;
        }
        trace!("✂️ splitting {} bytes", bytes_read);
        for outcome in splitter.feed(&chunk[..bytes_read]) {
            if !forward(outcome, &records, events, &mut stats).await {
                return Ok(stats);
            }
        }
    }

    if let Some(outcome) = splitter.finish() {
        forward(outcome, &records, events, &mut stats).await;
    }
    Ok(stats)
}

/// 📬 Route one outcome. `false` means downstream is gone and we should stop reading.
async fn forward(
    outcome: SplitOutcome,
    records: &Sender<RawRecord>,
    events: &EventBus,
    stats: &mut SplitStats,
) -> bool {
    stats.lines += 1;
    match outcome {
        SplitOutcome::Record(record) => {
            if records.send(record).await.is_err() {
                warn!("✂️ the writer hung up mid-stream — no one left to hand records to, stopping");
                return false;
            }
            stats.records += 1;
        }
        SplitOutcome::Unknown(unknown_line) => {
            stats.unknown += 1;
            warn!(
                reason = %unknown_line.reason,
                "🚨 unknown line ignored: {}",
                unknown_line.line
            );
            events.publish(PipelineEvent::UnknownLine(unknown_line));
        }
    }
    true
}
