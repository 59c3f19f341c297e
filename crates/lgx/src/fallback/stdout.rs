use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{self, AsyncWriteExt, Stdout};

use super::FallbackSink;

/// 📺 Lines straight to stdout, flushed one at a time so they show up while it's still relevant.
#[derive(Debug)]
pub struct StdoutFallback {
    out: Stdout,
}

impl StdoutFallback {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for StdoutFallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FallbackSink for StdoutFallback {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut buffer = String::with_capacity(line.len() + 1);
        buffer.push_str(line);
        buffer.push('\n');
        self.out
            .write_all(buffer.as_bytes())
            .await
            .context("💀 stdout refused a fallback line. The last resort has a last resort problem.")?;
        self.out
            .flush()
            .await
            .context("💀 stdout took the line and then wouldn't let it out.")
    }

    async fn close(&mut self) -> Result<()> {
        self.out
            .flush()
            .await
            .context("💀 final stdout flush failed. Somebody closed the pipe on the way out.")
    }
}
