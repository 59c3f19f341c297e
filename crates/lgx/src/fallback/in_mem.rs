use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::FallbackSink;

/// 📦 Fallback lines kept in a shared Vec. Clone before handing it off, then peek.
#[derive(Debug, Default, Clone)]
pub struct InMemoryFallback {
    lines: Arc<Mutex<Vec<String>>>,
}

impl InMemoryFallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }
}

#[async_trait]
impl FallbackSink for InMemoryFallback {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.lines.lock().await.push(line.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
