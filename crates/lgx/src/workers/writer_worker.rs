//! 🗑️ WriterWorker — drains the record channel into a writer. Asks no questions.
//!
//! Each round: wait for one record, then grab whatever else is already queued (up to
//! `bulk_size`), push them all, and flush if the channel has gone quiet. When the
//! splitter hangs up and the channel is drained, close the writer under the deadline.

use std::time::Duration;

use anyhow::Result;
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{DocumentWriter, Worker, WriterBackend, WriterStats};
use crate::common::RawRecord;

#[derive(Debug)]
pub(crate) struct WriterWorker {
    rx: Receiver<RawRecord>,
    writer: WriterBackend,
    bulk_size: usize,
    flush_deadline: Duration,
}

impl WriterWorker {
    pub(crate) fn new(
        rx: Receiver<RawRecord>,
        writer: WriterBackend,
        bulk_size: usize,
        flush_deadline: Duration,
    ) -> Self {
        Self {
            rx,
            writer,
            bulk_size: bulk_size.max(1),
            flush_deadline,
        }
    }

    async fn drain(mut self) -> WriterStats {
        debug!("📥 WriterWorker started draining channel...");
        while let Ok(record) = self.rx.recv().await {
            self.writer.push(record).await;
            let mut taken = 1;
            while taken < self.bulk_size {
                match self.rx.try_recv() {
                    Ok(record) => {
                        self.writer.push(record).await;
                        taken += 1;
                    }
                    Err(_) => break,
                }
            }
            if self.rx.is_empty() {
                self.writer.flush().await;
            }
        }
        debug!("🏁 WriterWorker: channel closed. Final flush and shutting down.");
        self.writer.close(self.flush_deadline).await;
        self.writer.stats()
    }
}

impl Worker for WriterWorker {
    type Output = WriterStats;

    fn start(self) -> JoinHandle<Result<WriterStats>> {
        tokio::spawn(async move { Ok(self.drain().await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::{FallbackBackend, InMemoryFallback};
    use crate::workers::LocalWriter;
    use chrono::Utc;
    use serde_json::{Map, Value};

    fn record(msg: &str) -> RawRecord {
        let mut fields = Map::new();
        fields.insert("msg".to_string(), Value::String(msg.to_string()));
        RawRecord::new(fields, Utc::now())
    }

    #[tokio::test]
    async fn the_one_where_the_channel_closes_and_nothing_is_left_behind() -> Result<()> {
        let fallback = InMemoryFallback::new();
        let writer = WriterBackend::Local(LocalWriter::new(FallbackBackend::InMemory(fallback.clone()), 4));
        let (tx, rx) = async_channel::bounded(4);

        let handle = WriterWorker::new(rx, writer, 4, Duration::from_secs(1)).start();
        for msg in ["a", "b", "c", "d", "e", "f", "g"] {
            tx.send(record(msg)).await?;
        }
        drop(tx);

        let stats = handle.await??;
        assert_eq!(stats.local_lines, 7);
        assert_eq!(fallback.lines().await, vec!["a", "b", "c", "d", "e", "f", "g"]);
        Ok(())
    }
}
