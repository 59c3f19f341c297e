//! 🎬 *[camera pans across a dimly lit terminal]*
//! 🎬 "In a world where stdin never ends..."
//! 🎬 "One supervisor dared to read it all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor wires the pipeline together and waits for it to finish:
//!
//! ```text
//!   input ──▶ SplitterWorker ──[bounded(bulk_size)]──▶ WriterWorker ──▶ BatchWriter | LocalWriter
//!                  │                                          │
//!                  └──────────── EventBus (observers) ◀───────┘
//! ```
//!
//! A full channel suspends the splitter, which stops reading, which pushes back on
//! whoever is writing into our stdin. That's the whole backpressure story.
//!
//! ⚠️ The workers stay private. You talk to the Supervisor; the Supervisor talks to them.

use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::app_config::{AppConfig, SinkConfig};
use crate::backends::{BackendClient, ElasticsearchBackend, InMemoryBackend};
use crate::events::EventBus;
use crate::fallback::FallbackBackend;
use crate::stats::PipelineReport;
use crate::workers::{
    BatchWriter, BatchWriterConfig, LocalWriter, SplitterWorker, Worker, WriterBackend,
    WriterWorker,
};

/// 📦 Owns the config and the event bus; builds and runs one pipeline.
///
/// Subscribe through [`Supervisor::events`] before calling [`Supervisor::run`], or
/// you'll miss the early events. They don't get replayed.
#[derive(Debug)]
pub struct Supervisor {
    app_config: AppConfig,
    events: EventBus,
    backend: Option<BackendClient>,
    fallback: Option<FallbackBackend>,
}

impl Supervisor {
    pub fn new(app_config: AppConfig) -> Self {
        let events = EventBus::new(app_config.runtime.event_capacity);
        Self {
            app_config,
            events,
            backend: None,
            fallback: None,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// 🔌 Use this backend instead of whatever `sink_config` says.
    pub fn with_backend(mut self, backend: BackendClient) -> Self {
        self.backend = Some(backend);
        self
    }

    /// 🪂 Use this fallback sink instead of whatever `fallback_config` says.
    pub fn with_fallback(mut self, fallback: FallbackBackend) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// 🚀 Read `input` to EOF, deliver everything, return the numbers.
    ///
    /// 💀 Errors are setup problems (fallback file, HTTP client) or a failing read.
    /// Delivery failures are in the report, not in the `Err`.
    pub async fn run<R>(mut self, input: R) -> Result<PipelineReport>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        self.app_config.validate()?;
        let started = Instant::now();
        let runtime = self.app_config.runtime.clone();
        let writer = self.build_writer().await?;

        let (tx, rx) = async_channel::bounded(runtime.bulk_size);
        let writer_handle =
            WriterWorker::new(rx, writer, runtime.bulk_size, runtime.flush_deadline()).start();
        let splitter_handle = SplitterWorker::new(input, tx, self.events.clone()).start();

        // -- wait for both before bailing; a failed read still lets the writer flush what it got
        let split = splitter_handle
            .await
            .context("💀 The splitter task panicked. The bytes were too much for it.");
        let writer = writer_handle
            .await
            .context("💀 The writer task panicked mid-delivery.")??;
        let split = split?.context("💀 Reading the input failed partway through.")?;

        let report = PipelineReport {
            split,
            writer,
            elapsed: started.elapsed(),
        };
        info!(
            lines = report.split.lines,
            inserted = report.writer.inserted,
            failed = report.writer.failed,
            "🏁 pipeline finished"
        );
        Ok(report)
    }

    async fn build_writer(&mut self) -> Result<WriterBackend> {
        let fallback = match self.fallback.take() {
            Some(fallback) => fallback,
            None => FallbackBackend::from_config(&self.app_config.fallback_config).await?,
        };
        let runtime = &self.app_config.runtime;

        let client = match self.backend.take() {
            Some(client) => client,
            None => match &self.app_config.sink_config {
                SinkConfig::Elasticsearch(es_config) => {
                    let backend = ElasticsearchBackend::new(es_config.clone())?;
                    backend.ping().await;
                    BackendClient::Elasticsearch(backend)
                }
                SinkConfig::InMemory => BackendClient::InMemory(InMemoryBackend::new()),
                SinkConfig::Local => {
                    debug!("🪶 no index configured, writing plain lines locally");
                    return Ok(WriterBackend::Local(LocalWriter::new(
                        fallback,
                        runtime.bulk_size,
                    )));
                }
            },
        };

        Ok(WriterBackend::Indexed(BatchWriter::new(
            client,
            fallback,
            self.events.clone(),
            BatchWriterConfig {
                index_prefix: self.app_config.index_prefix().to_string(),
                bulk_size: runtime.bulk_size,
                mirror_to_local_output: runtime.mirror_to_local_output,
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::RuntimeConfig;
    use crate::backends::ScriptedReply;
    use crate::events::PipelineEvent;
    use crate::fallback::{FallbackConfig, InMemoryFallback};
    use std::io::Cursor;

    fn config(sink_config: SinkConfig, bulk_size: usize) -> AppConfig {
        AppConfig {
            sink_config,
            fallback_config: FallbackConfig::Stdout,
            runtime: RuntimeConfig {
                bulk_size,
                index_prefix: "e2e".to_string(),
                ..RuntimeConfig::default()
            },
        }
    }

    #[tokio::test]
    async fn the_one_where_stdin_goes_all_the_way_to_the_index() -> Result<()> {
        let backend = InMemoryBackend::new();
        backend.script(ScriptedReply::RejectPositions(vec![0])).await;
        let fallback = InMemoryFallback::new();

        let supervisor = Supervisor::new(config(SinkConfig::InMemory, 2))
            .with_backend(BackendClient::InMemory(backend.clone()))
            .with_fallback(FallbackBackend::InMemory(fallback.clone()));
        let events = supervisor.events().subscribe();

        let input = concat!(
            "{\"msg\":\"hello\",\"time\":1700000000000}\n",
            "true\n",
            "{\"msg\":\"second\",\"time\":1700000000000,\"req\":{\"id\":\"r2\"}}\r\n",
            "not json at all\n",
            "\n",
            "{\"msg\":\"third\",\"time\":\"2023-11-14T22:13:20Z\"}"
        );
        let report = supervisor.run(Cursor::new(input.as_bytes().to_vec())).await?;

        assert_eq!(report.split.lines, 5);
        assert_eq!(report.split.records, 3);
        assert_eq!(report.split.unknown, 2);
        assert_eq!(report.writer.inserted + report.writer.failed, 3);
        assert_eq!(report.writer.failed, 1);

        let sent: Vec<String> = backend
            .received()
            .await
            .into_iter()
            .flatten()
            .map(|item| item.index)
            .collect();
        assert!(sent.iter().all(|index| index == "e2e-2023-11-14"));

        assert_eq!(fallback.lines().await.len(), 1, "exactly the rejected document");

        let events: Vec<PipelineEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        let unknown = events
            .iter()
            .filter(|event| matches!(event, PipelineEvent::UnknownLine(_)))
            .count();
        let inserted = events
            .iter()
            .filter(|event| matches!(event, PipelineEvent::Inserted { .. }))
            .count();
        assert_eq!(unknown, 2);
        assert_eq!(inserted, 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_there_is_no_index_and_that_is_fine() -> Result<()> {
        let fallback = InMemoryFallback::new();
        let supervisor = Supervisor::new(config(SinkConfig::Local, 10))
            .with_fallback(FallbackBackend::InMemory(fallback.clone()));

        let input = "{\"msg\":\"one\"}\n{\"msg\":\"two\",\"req\":{\"id\":7}}\n";
        let report = supervisor.run(Cursor::new(input.as_bytes().to_vec())).await?;

        assert_eq!(report.split.records, 2);
        assert_eq!(report.writer.inserted, 0);
        assert_eq!(report.writer.local_lines, 2);
        assert_eq!(fallback.lines().await, vec!["one", "7 two"]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_bad_config_never_starts() {
        let result = Supervisor::new(config(SinkConfig::Local, 0))
            .run(Cursor::new(Vec::new()))
            .await;
        assert!(result.is_err());

        // -- would have asked the channel for 2^60 slots
        let result = Supervisor::new(config(SinkConfig::Local, 1 << 60))
            .run(Cursor::new(Vec::new()))
            .await;
        let err = result.expect_err("💀 a huge bulk_size must be refused before the channel exists");
        assert!(err.to_string().contains("ceiling"));
    }
}
