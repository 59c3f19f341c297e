//! 📦 BatchWriter — buffer, flush, resolve, repeat.
//!
//! 🎬 *[the buffer hits five hundred. the writer takes a deep breath. POST.]*
//!
//! The lifecycle of one batch:
//! 1. **Accumulating**: `push` normalizes each record (rich profile), optionally mirrors a
//!    minimal line to the fallback sink, and buffers it.
//! 2. **Flushing**: one document goes through `write`, more than one through `bulk_write`.
//! 3. **Resolved**: accepted documents become insert events in submission order. Everything
//!    else (item errors, missing items, a request that never came back) lands in the
//!    fallback sink, gets logged once, and gets one aggregate failure event.
//!
//! Then it's back to accumulating. No retries. A flush never fails the pipeline.
//!
//! ⚠️ The buffer is taken (not borrowed) at the start of a flush, so a push can never
//! sneak into a batch that is already on the wire.

use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::{debug, error, trace, warn};

use super::{DocumentWriter, PREALLOCATED_SLOTS, WriterStats};
use crate::backends::{BackendClient, IndexBackend, ItemResult};
use crate::common::{DeliveryOutcome, MinimalDocument, RawRecord};
use crate::composers::BulkItem;
use crate::events::{EventBus, PipelineEvent};
use crate::fallback::{FallbackBackend, FallbackSink};
use crate::transforms::{EcsDocument, Normalize};

/// 🔧 The three knobs a batch writer cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchWriterConfig {
    pub index_prefix: String,
    pub bulk_size: usize,
    pub mirror_to_local_output: bool,
}

/// 📦 Rich-profile writer in front of an [`IndexBackend`].
#[derive(Debug)]
pub struct BatchWriter {
    client: BackendClient,
    fallback: FallbackBackend,
    events: EventBus,
    config: BatchWriterConfig,
    buffer: Vec<BulkItem>,
    stats: WriterStats,
}

impl BatchWriter {
    pub fn new(
        client: BackendClient,
        fallback: FallbackBackend,
        events: EventBus,
        config: BatchWriterConfig,
    ) -> Self {
        let bulk_size = config.bulk_size.max(1);
        Self {
            client,
            fallback,
            events,
            buffer: Vec::with_capacity(bulk_size.min(PREALLOCATED_SLOTS)),
            config: BatchWriterConfig { bulk_size, ..config },
            stats: WriterStats::default(),
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// ✂️ Take the whole buffer as one batch, so later pushes start a fresh one.
    fn take_batch(&mut self) -> Option<Vec<BulkItem>> {
        if self.buffer.is_empty() {
            return None;
        }
        let batch = std::mem::take(&mut self.buffer);
        self.stats.flushes += 1;
        debug!("🚀 flushing {} documents", batch.len());
        Some(batch)
    }

    /// 📡 One round trip: a lone document goes through `write`, more through `bulk_write`.
    async fn deliver(&self, batch: &[BulkItem]) -> Result<Vec<ItemResult>> {
        match batch {
            [single] => self.client.write(single).await.map(|item| vec![item]),
            many => self.client.bulk_write(many).await.map(|response| response.items),
        }
    }

    /// ⚖️ Pair every document with its verdict (or lack of one) and act on it.
    async fn resolve(
        &mut self,
        batch: Vec<BulkItem>,
        verdicts: Result<Vec<ItemResult>>,
    ) -> Vec<DeliveryOutcome> {
        let (verdicts, transport_error) = match verdicts {
            Ok(items) => (items, None),
            Err(err) => (Vec::new(), Some(format!("{err:#}"))),
        };
        let mut verdicts = verdicts.into_iter();
        let mut outcomes = Vec::with_capacity(batch.len());
        let mut failed_lines = Vec::new();
        let mut first_reason: Option<String> = None;

        for item in batch {
            match verdicts.next() {
                Some(verdict) if transport_error.is_none() && verdict.is_success() => {
                    self.events.publish(PipelineEvent::Inserted {
                        index: verdict.index.clone(),
                        id: verdict.id.clone(),
                        response: verdict.raw,
                        document: Box::new(item.document),
                    });
                    outcomes.push(DeliveryOutcome::Inserted {
                        index: verdict.index,
                        id: verdict.id,
                    });
                }
                verdict => {
                    let reason = failure_reason(transport_error.as_deref(), verdict);
                    first_reason.get_or_insert_with(|| reason.clone());
                    failed_lines.push(MinimalDocument::from(&item.document).render_line());
                    outcomes.push(DeliveryOutcome::Failed {
                        index: item.index,
                        reason,
                    });
                }
            }
        }

        let failed = failed_lines.len();
        self.stats.inserted += (outcomes.len() - failed) as u64;
        self.stats.failed += failed as u64;

        if failed > 0 {
            let reason = first_reason.unwrap_or_default();
            error!(
                failed,
                total = outcomes.len(),
                "💀 backend did not take {} of {} documents: {}",
                failed,
                outcomes.len(),
                reason
            );
            if self.config.mirror_to_local_output {
                trace!("🪞 failed documents were already mirrored, not writing them twice");
            } else {
                for line in &failed_lines {
                    if self.write_fallback(line).await {
                        self.stats.local_lines += 1;
                    }
                }
            }
            self.events.publish(PipelineEvent::DeliveryFailed {
                documents: failed,
                reason,
            });
        }
        outcomes
    }

    /// 🪂 `false` if even the fallback said no. That gets logged, never raised.
    async fn write_fallback(&mut self, line: &str) -> bool {
        match self.fallback.write_line(line).await {
            Ok(()) => true,
            Err(err) => {
                error!("💀 fallback sink refused a line, it is lost: {err:#}");
                false
            }
        }
    }
}

#[async_trait]
impl DocumentWriter for BatchWriter {
    fn stats(&self) -> WriterStats {
        self.stats
    }

    /// 📥 Normalize, maybe mirror, buffer. Flushes (and returns its outcomes) at capacity.
    async fn push(&mut self, record: RawRecord) -> Vec<DeliveryOutcome> {
        let document = EcsDocument::normalize(&record);
        if self.config.mirror_to_local_output {
            let line = MinimalDocument::from(&document).render_line();
            if self.write_fallback(&line).await {
                self.stats.local_lines += 1;
            }
        }
        self.buffer.push(BulkItem::new(&self.config.index_prefix, document));
        if self.buffer.len() >= self.config.bulk_size {
            return self.flush().await;
        }
        Vec::new()
    }

    /// 🚀 Ship whatever is buffered. Empty buffer, empty answer, no request.
    async fn flush(&mut self) -> Vec<DeliveryOutcome> {
        let Some(batch) = self.take_batch() else {
            return Vec::new();
        };
        let verdicts = self.deliver(&batch).await;
        self.resolve(batch, verdicts).await
    }

    /// 🏁 Final flush. Only the backend round trip is bounded by `deadline`; when the clock
    /// runs out the batch is resolved as failed and routed to the fallback, exactly once.
    /// The fallback is closed afterwards.
    async fn close(&mut self, deadline: Duration) -> Vec<DeliveryOutcome> {
        let outcomes = match self.take_batch() {
            None => Vec::new(),
            Some(batch) => {
                let verdicts = match tokio::time::timeout(deadline, self.deliver(&batch)).await {
                    Ok(verdicts) => verdicts,
                    Err(_) => {
                        warn!(
                            "⏰ final flush blew through its {:?} deadline, routing {} documents to fallback",
                            deadline,
                            batch.len()
                        );
                        Err(anyhow!("💀 final flush did not finish within {deadline:?}"))
                    }
                };
                self.resolve(batch, verdicts).await
            }
        };
        if let Err(err) = self.fallback.close().await {
            error!("💀 could not close the fallback sink: {err:#}");
        }
        outcomes
    }
}

fn failure_reason(transport_error: Option<&str>, verdict: Option<ItemResult>) -> String {
    match (transport_error, verdict) {
        (Some(transport_error), _) => transport_error.to_string(),
        (None, Some(verdict)) => verdict.error.unwrap_or_else(|| match verdict.status {
            Some(status) => format!("backend answered with status {status}"),
            None => "backend reported a failure without saying why".to_string(),
        }),
        (None, None) => "backend reply had no entry for this document".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemoryBackend, ScriptedReply};
    use crate::fallback::InMemoryFallback;
    use async_channel::Receiver;
    use chrono::{TimeZone, Utc};
    use serde_json::{Value, json};

    fn record(msg: &str, req_id: &str) -> RawRecord {
        let fields = match json!({"msg": msg, "req": {"id": req_id}}) {
            Value::Object(fields) => fields,
            _ => unreachable!(),
        };
        RawRecord::new(fields, Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap())
    }

    struct Rig {
        writer: BatchWriter,
        backend: InMemoryBackend,
        fallback: InMemoryFallback,
        events: Receiver<PipelineEvent>,
    }

    fn rig(bulk_size: usize, mirror_to_local_output: bool) -> Rig {
        let backend = InMemoryBackend::new();
        let fallback = InMemoryFallback::new();
        let bus = EventBus::default();
        let events = bus.subscribe();
        let writer = BatchWriter::new(
            BackendClient::InMemory(backend.clone()),
            FallbackBackend::InMemory(fallback.clone()),
            bus,
            BatchWriterConfig {
                index_prefix: "app".to_string(),
                bulk_size,
                mirror_to_local_output,
            },
        );
        Rig {
            writer,
            backend,
            fallback,
            events,
        }
    }

    fn drain(events: &Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        std::iter::from_fn(|| events.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn the_one_where_one_of_three_is_rejected_and_life_goes_on() {
        let mut rig = rig(3, false);
        rig.backend.script(ScriptedReply::RejectPositions(vec![1])).await;

        assert!(rig.writer.push(record("first", "r1")).await.is_empty());
        assert!(rig.writer.push(record("second", "r2")).await.is_empty());
        let outcomes = rig.writer.push(record("third", "r3")).await;

        let inserted: Vec<bool> = outcomes.iter().map(DeliveryOutcome::is_inserted).collect();
        assert_eq!(inserted, vec![true, false, true]);
        assert_eq!(rig.fallback.lines().await, vec!["r2 second"]);

        let events = drain(&rig.events);
        let inserted_messages: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                PipelineEvent::Inserted { document, index, .. } => {
                    assert_eq!(index, "app-2024-03-01");
                    document.message.clone()
                }
                _ => None,
            })
            .collect();
        assert_eq!(inserted_messages, vec!["first", "third"]);
        let failures = events
            .iter()
            .filter(|event| matches!(event, PipelineEvent::DeliveryFailed { documents: 1, .. }))
            .count();
        assert_eq!(failures, 1);

        rig.writer.push(record("fourth", "r4")).await;
        rig.writer.push(record("fifth", "r5")).await;
        let next = rig.writer.push(record("sixth", "r6")).await;
        assert!(next.iter().all(DeliveryOutcome::is_inserted), "the next batch is untouched");
        assert_eq!(rig.writer.stats().inserted, 5);
        assert_eq!(rig.writer.stats().failed, 1);
    }

    #[tokio::test]
    async fn the_one_where_the_whole_request_falls_over() {
        let mut rig = rig(2, false);
        rig.backend
            .script(ScriptedReply::TransportError("connection reset by peer".into()))
            .await;

        rig.writer.push(record("a", "r1")).await;
        let outcomes = rig.writer.push(record("b", "r2")).await;
        assert!(outcomes.iter().all(|outcome| !outcome.is_inserted()));
        assert_eq!(rig.fallback.lines().await, vec!["r1 a", "r2 b"]);

        let events = drain(&rig.events);
        assert_eq!(events.len(), 1, "one aggregate failure, no inserts");
        match &events[0] {
            PipelineEvent::DeliveryFailed { documents, reason } => {
                assert_eq!(*documents, 2);
                assert!(reason.contains("connection reset by peer"));
            }
            other => panic!("💀 expected an aggregate failure, got {other:?}"),
        }

        rig.writer.push(record("c", "r3")).await;
        let next = rig.writer.push(record("d", "r4")).await;
        assert!(next.iter().all(DeliveryOutcome::is_inserted));
    }

    #[tokio::test]
    async fn the_one_where_a_lonely_document_takes_the_single_write_path() {
        let mut rig = rig(10, false);
        rig.writer.push(record("solo", "r1")).await;
        assert_eq!(rig.writer.buffered(), 1);

        let outcomes = rig.writer.flush().await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_inserted());
        assert_eq!(rig.backend.received().await.len(), 1);
        assert!(rig.writer.flush().await.is_empty(), "an empty flush sends nothing");
        assert_eq!(rig.backend.received().await.len(), 1);
    }

    #[tokio::test]
    async fn the_one_where_mirrored_failures_are_not_written_twice() {
        let mut rig = rig(2, true);
        rig.backend.script(ScriptedReply::RejectPositions(vec![0, 1])).await;

        rig.writer.push(record("x", "r1")).await;
        rig.writer.push(record("y", "r2")).await;

        assert_eq!(rig.fallback.lines().await, vec!["r1 x", "r2 y"]);
        assert_eq!(rig.writer.stats().failed, 2);
    }

    #[tokio::test]
    async fn the_one_where_the_deadline_wins() {
        let mut rig = rig(10, false);
        rig.backend.script(ScriptedReply::Stall(Duration::from_secs(30))).await;
        rig.writer.push(record("late", "r1")).await;
        rig.writer.push(record("later", "r2")).await;

        let outcomes = rig.writer.close(Duration::from_millis(50)).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|outcome| !outcome.is_inserted()));
        assert_eq!(rig.fallback.lines().await, vec!["r1 late", "r2 later"]);

        let stats = rig.writer.stats();
        assert_eq!((stats.inserted, stats.failed, stats.flushes), (0, 2, 1));
        assert_eq!(stats.local_lines, 2, "each late document hits the fallback once");

        let events = drain(&rig.events);
        assert_eq!(events.len(), 1, "one aggregate failure, no inserts");
        match &events[0] {
            PipelineEvent::DeliveryFailed { documents, reason } => {
                assert_eq!(*documents, 2);
                assert!(reason.contains("did not finish within"));
            }
            other => panic!("💀 expected an aggregate failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn the_one_where_the_last_batch_makes_it_home_in_time() {
        let mut rig = rig(10, false);
        rig.backend.script(ScriptedReply::Stall(Duration::from_millis(10))).await;
        rig.writer.push(record("just", "r1")).await;
        rig.writer.push(record("in time", "r2")).await;

        let outcomes = rig.writer.close(Duration::from_secs(5)).await;
        assert!(outcomes.iter().all(DeliveryOutcome::is_inserted));
        assert_eq!(outcomes.len(), 2);
        assert!(rig.fallback.lines().await.is_empty());
        assert_eq!(rig.writer.stats().inserted, 2);
        assert_eq!(rig.writer.buffered(), 0);

        assert!(rig.writer.close(Duration::from_millis(50)).await.is_empty(), "nothing left to ship");
        assert_eq!(rig.backend.received().await.len(), 1);
    }

    #[tokio::test]
    async fn the_one_where_a_gigantic_bulk_size_does_not_reserve_the_moon() {
        let mut rig = rig(1 << 60, false);
        assert!(rig.writer.buffer.capacity() <= PREALLOCATED_SLOTS);

        rig.writer.push(record("tiny", "r1")).await;
        rig.writer.push(record("batch", "r2")).await;
        assert_eq!(rig.writer.buffered(), 2, "nowhere near capacity, nothing flushed");

        let outcomes = rig.writer.flush().await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(DeliveryOutcome::is_inserted));
    }
}
