//! JSON-lines result writer

use anyhow::Result;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;
use tracing::debug;

/// Writes one JSON document per line. Safe to share between tasks.
pub struct ResultProducer<W> {
    writer: Mutex<W>,
}

impl ResultProducer<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin> ResultProducer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Serialize `value` and write it as a single line
    pub async fn publish<T: Serialize>(&self, value: &T) -> Result<()> {
        let mut payload = serde_json::to_vec(value)?;
        payload.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&payload).await?;
        writer.flush().await?;

        debug!(bytes = payload.len(), "Published result");
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}
