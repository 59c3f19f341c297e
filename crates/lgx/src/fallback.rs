//! 🪂 Fallback — the parachute that opens when the index doesn't.
//!
//! 🎬 *[the cluster returns a 503. the documents look down. there is a lot of down.]*
//!
//! A fallback sink is about as simple as a sink gets: it takes one already-rendered
//! line and writes it somewhere local. Batch writers use it twice:
//! 1. mirroring, when `mirror_to_local_output` is on (every document, at push time)
//! 2. failure, for documents the backend didn't explicitly accept
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (Stdout, File, InMemory) → [`FallbackBackend`] enum
//! - Append-only. Mirror writes and failure writes are independent appends; nobody
//!   promises they interleave in any particular order.
//! - Default is stdout, which is why tracing goes to stderr in the CLI.
//!
//! 🦆 (the duck packed its own parachute. it does not trust ours.)

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

pub(crate) mod file;
pub(crate) mod in_mem;
pub(crate) mod stdout;

pub use file::{FileFallback, FileFallbackConfig};
pub use in_mem::InMemoryFallback;
pub use stdout::StdoutFallback;

/// 🪂 Somewhere local to put a line.
///
/// # Contract 📜
/// - `write_line` appends `line` plus a trailing `\n`. The caller never adds the newline.
/// - `close` flushes whatever is buffered. Call it once, at the end.
#[async_trait]
pub trait FallbackSink: std::fmt::Debug + Send {
    async fn write_line(&mut self, line: &str) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// 🔧 Where the fallback lines go. Externally tagged, same as the sink config.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub enum FallbackConfig {
    #[default]
    Stdout,
    File(FileFallbackConfig),
    /// 🧪 keep the lines in memory; for tests and dry runs
    InMemory,
}

/// 🎭 The many faces of a fallback sink.
#[derive(Debug)]
pub enum FallbackBackend {
    Stdout(StdoutFallback),
    File(FileFallback),
    InMemory(InMemoryFallback),
}

impl Default for FallbackBackend {
    fn default() -> Self {
        FallbackBackend::Stdout(StdoutFallback::new())
    }
}

impl FallbackBackend {
    /// 🏗️ Open whatever the config asks for. Only the file variant can fail.
    pub async fn from_config(config: &FallbackConfig) -> Result<Self> {
        Ok(match config {
            FallbackConfig::Stdout => FallbackBackend::Stdout(StdoutFallback::new()),
            FallbackConfig::File(file_config) => {
                FallbackBackend::File(FileFallback::new(file_config.clone()).await?)
            }
            FallbackConfig::InMemory => FallbackBackend::InMemory(InMemoryFallback::new()),
        })
    }
}

#[async_trait]
impl FallbackSink for FallbackBackend {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        match self {
            FallbackBackend::Stdout(sink) => sink.write_line(line).await,
            FallbackBackend::File(sink) => sink.write_line(line).await,
            FallbackBackend::InMemory(sink) => sink.write_line(line).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            FallbackBackend::Stdout(sink) => sink.close().await,
            FallbackBackend::File(sink) => sink.close().await,
            FallbackBackend::InMemory(sink) => sink.close().await,
        }
    }
}
