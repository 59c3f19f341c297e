//! 📁 File fallback — append-only, buffered, flushed on purpose.
//!
//! Unlike a migration output file, this one is never truncated. Yesterday's failures
//! are still somebody's evidence.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
};
use tracing::trace;

use super::FallbackSink;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FileFallbackConfig {
    pub file_name: String,
}

/// 📁 Appends fallback lines to a file through a `BufWriter`.
#[derive(Debug)]
pub struct FileFallback {
    file_buf: BufWriter<File>,
    config: FileFallbackConfig,
}

impl FileFallback {
    /// 🚀 Open (or create) the fallback file in append mode.
    pub async fn new(config: FileFallbackConfig) -> Result<Self> {
        let file_handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.file_name)
            .await
            .context(format!(
                "💀 The fallback file '{}' could not be opened for appending. \
                 The safety net has a hole in it before we even jumped. \
                 Check that the parent directory exists and that we're allowed to write there.",
                config.file_name
            ))?;
        Ok(Self {
            file_buf: BufWriter::new(file_handle),
            config,
        })
    }
}

#[async_trait]
impl FallbackSink for FileFallback {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        trace!("📁 appending {} bytes to '{}'", line.len() + 1, self.config.file_name);
        self.file_buf.write_all(line.as_bytes()).await?;
        self.file_buf.write_all(b"\n").await.context(format!(
            "💀 couldn't append to fallback file '{}'. Disk full? Disk gone? Both are bad.",
            self.config.file_name
        ))
    }

    async fn close(&mut self) -> Result<()> {
        self.file_buf.flush().await.context(format!(
            "💀 Error flushing fallback file '{}'. The lines were in the buffer. \
             They could see the disk from there. They never arrived.",
            self.config.file_name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_yesterdays_failures_are_not_overwritten() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("fallback.log");
        std::fs::write(&path, "from before\n")?;

        let mut sink = FileFallback::new(FileFallbackConfig {
            file_name: path.display().to_string(),
        })
        .await?;
        sink.write_line("req-1 it broke").await?;
        sink.write_line("").await?;
        sink.close().await?;

        assert_eq!(std::fs::read_to_string(&path)?, "from before\nreq-1 it broke\n\n");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_directory_does_not_exist() {
        let result = FileFallback::new(FileFallbackConfig {
            file_name: "/definitely/not/a/real/dir/fallback.log".to_string(),
        })
        .await;
        assert!(result.is_err());
    }
}
