//! ✂️ SplitterWorker — the source end. Bytes in, records out, unknown lines reported.

use anyhow::Result;
use async_channel::Sender;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tracing::debug;

use super::Worker;
use crate::common::RawRecord;
use crate::events::EventBus;
use crate::splitter::{SplitStats, split_stream};

pub(crate) struct SplitterWorker<R> {
    reader: R,
    tx: Sender<RawRecord>,
    events: EventBus,
}

impl<R> SplitterWorker<R> {
    pub(crate) fn new(reader: R, tx: Sender<RawRecord>, events: EventBus) -> Self {
        Self { reader, tx, events }
    }
}

impl<R> Worker for SplitterWorker<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    type Output = SplitStats;

    fn start(self) -> JoinHandle<Result<SplitStats>> {
        tokio::spawn(async move {
            let stats = split_stream(self.reader, self.tx, &self.events).await?;
            // -- the sender drops here, which is how the writer learns we're done
            debug!(
                "✂️ SplitterWorker done: {} lines, {} records, {} unknown",
                stats.lines, stats.records, stats.unknown
            );
            Ok(stats)
        })
    }
}
