//! 🪵 lgx — ships newline-delimited JSON logs into a search index, and never drops
//! them on the floor when the index says no.
//!
//! 🧠 Knowledge graph:
//! - [`splitter`]: bytes → lines → [`RawRecord`](common::RawRecord)s, bad lines reported
//! - [`transforms`]: raw records → ECS-shaped documents, or minimal one-liners
//! - [`composers`]: documents → daily index targets and `/_bulk` bodies
//! - [`backends`]: the index itself (Elasticsearch over HTTP, or a scripted pretend one)
//! - [`fallback`]: where lines go when the index can't take them
//! - [`workers`]: the batch writer and the tasks that feed it
//! - [`events`]: observers of inserts, unknown lines and failed flushes
//! - [`app_config`], [`stats`]: knobs in, numbers out

pub mod app_config;
pub mod backends;
pub mod common;
pub mod composers;
pub mod events;
pub mod fallback;
pub mod splitter;
pub mod stats;
mod supervisors;
pub mod transforms;
pub mod workers;

use anyhow::Result;
use tokio::io::AsyncRead;

use crate::app_config::AppConfig;

pub use crate::stats::PipelineReport;
pub use crate::supervisors::Supervisor;

/// 🚀 Run one pipeline over `input` with nobody listening to events.
///
/// Need events? Build a [`Supervisor`], subscribe, then `run` it yourself.
pub async fn run<R>(app_config: AppConfig, input: R) -> Result<PipelineReport>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    Supervisor::new(app_config).run(input).await
}
