//! 🧵 Workers — the ones who actually do the work while the Supervisor takes the credit.
//!
//! 🧠 Knowledge graph:
//! - [`DocumentWriter`]: push / flush / close over raw records.
//!   - [`BatchWriter`]: rich profile, talks to an index backend, falls back on failure
//!   - [`LocalWriter`]: plain profile, writes lines locally, no backend at all
//!   - [`WriterBackend`]: the enum dispatcher, same trait → impls → enum shape as everywhere else
//! - [`Worker`]: something that spawns itself onto the runtime and reports back.
//!   - `SplitterWorker` reads bytes and feeds the record channel
//!   - `WriterWorker` drains the record channel into a `DocumentWriter`
//!
//! ```text
//!   stdin ──▶ SplitterWorker ──[bounded(bulk_size)]──▶ WriterWorker ──▶ DocumentWriter
//! ```
//!
//! ⚠️ Writers never return errors. Delivery problems become fallback lines, log lines
//! and events. The only thing a worker can fail on is reading its input. 🦆

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::common::{DeliveryOutcome, RawRecord};

mod batch_writer;
mod local_writer;
mod splitter_worker;
mod writer_worker;

pub use batch_writer::{BatchWriter, BatchWriterConfig};
pub use local_writer::LocalWriter;
pub(crate) use splitter_worker::SplitterWorker;
pub(crate) use writer_worker::WriterWorker;

/// 📦 Buffers grow into `bulk_size` as documents arrive; only this much is reserved up front.
pub(crate) const PREALLOCATED_SLOTS: usize = 1024;

/// 🏗️ A background worker, that does work. duh.
pub(crate) trait Worker {
    type Output;

    fn start(self) -> JoinHandle<Result<Self::Output>>;
}

/// 📊 What one writer did over its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    pub inserted: u64,
    pub failed: u64,
    pub flushes: u64,
    /// lines that reached the fallback sink: mirrors, failures and plain output alike
    pub local_lines: u64,
}

/// 📥 Takes raw records, ships documents somewhere.
///
/// # Contract 📜
/// - `push` buffers one record and flushes on its own once the buffer is full.
///   The outcomes of that flush (if any) are returned.
/// - `flush` ships whatever is buffered. Empty buffer → no I/O, no outcomes.
/// - `close` is the last flush, bounded by `deadline`, and closes the local sink.
/// - None of these fail. A document that can't be delivered is reported, not raised.
#[async_trait]
pub trait DocumentWriter: std::fmt::Debug + Send {
    async fn push(&mut self, record: RawRecord) -> Vec<DeliveryOutcome>;
    async fn flush(&mut self) -> Vec<DeliveryOutcome>;
    async fn close(&mut self, deadline: Duration) -> Vec<DeliveryOutcome>;
    fn stats(&self) -> WriterStats;
}

/// 🎭 The many faces of a document writer.
#[derive(Debug)]
pub enum WriterBackend {
    Indexed(BatchWriter),
    Local(LocalWriter),
}

#[async_trait]
impl DocumentWriter for WriterBackend {
    async fn push(&mut self, record: RawRecord) -> Vec<DeliveryOutcome> {
        match self {
            WriterBackend::Indexed(writer) => writer.push(record).await,
            WriterBackend::Local(writer) => writer.push(record).await,
        }
    }

    async fn flush(&mut self) -> Vec<DeliveryOutcome> {
        match self {
            WriterBackend::Indexed(writer) => writer.flush().await,
            WriterBackend::Local(writer) => writer.flush().await,
        }
    }

    async fn close(&mut self, deadline: Duration) -> Vec<DeliveryOutcome> {
        match self {
            WriterBackend::Indexed(writer) => writer.close(deadline).await,
            WriterBackend::Local(writer) => writer.close(deadline).await,
        }
    }

    fn stats(&self) -> WriterStats {
        match self {
            WriterBackend::Indexed(writer) => writer.stats(),
            WriterBackend::Local(writer) => writer.stats(),
        }
    }
}
