//! 🪶 LocalWriter — for when there's no index, only a terminal and hope.
//!
//! Plain profile all the way: each record becomes a [`MinimalDocument`] line, buffered
//! up to `bulk_size` and written to the fallback sink on flush. Nothing is "inserted"
//! here, so flushes hand back no delivery outcomes.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use super::{DocumentWriter, PREALLOCATED_SLOTS, WriterStats};
use crate::common::{DeliveryOutcome, MinimalDocument, RawRecord};
use crate::fallback::{FallbackBackend, FallbackSink};
use crate::transforms::{Normalize, PlainLine};

#[derive(Debug)]
pub struct LocalWriter {
    fallback: FallbackBackend,
    bulk_size: usize,
    buffer: Vec<MinimalDocument>,
    stats: WriterStats,
}

impl LocalWriter {
    pub fn new(fallback: FallbackBackend, bulk_size: usize) -> Self {
        let bulk_size = bulk_size.max(1);
        Self {
            fallback,
            bulk_size,
            buffer: Vec::with_capacity(bulk_size.min(PREALLOCATED_SLOTS)),
            stats: WriterStats::default(),
        }
    }
}

#[async_trait]
impl DocumentWriter for LocalWriter {
    fn stats(&self) -> WriterStats {
        self.stats
    }

    async fn push(&mut self, record: RawRecord) -> Vec<DeliveryOutcome> {
        self.buffer.push(PlainLine::normalize(&record));
        if self.buffer.len() >= self.bulk_size {
            return self.flush().await;
        }
        Vec::new()
    }

    async fn flush(&mut self) -> Vec<DeliveryOutcome> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let batch = std::mem::take(&mut self.buffer);
        self.stats.flushes += 1;
        debug!("🪶 writing {} plain lines", batch.len());
        for document in batch {
            match self.fallback.write_line(&document.render_line()).await {
                Ok(()) => self.stats.local_lines += 1,
                Err(err) => {
                    self.stats.failed += 1;
                    error!("💀 local output refused a line, it is lost: {err:#}");
                }
            }
        }
        Vec::new()
    }

    async fn close(&mut self, deadline: Duration) -> Vec<DeliveryOutcome> {
        let pending = self.buffer.len();
        if tokio::time::timeout(deadline, self.flush()).await.is_err() {
            warn!("⏰ local output was still writing {pending} lines when the {deadline:?} deadline hit");
        }
        if let Err(err) = self.fallback.close().await {
            error!("💀 could not close the local output: {err:#}");
        }
        Vec::new()
    }
}
