use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::SinkError;

/// Destination for flushed aggregate batches.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Write one JSON payload under `relative_path`, creating intermediate
    /// directories as needed.
    async fn write(&self, relative_path: &str, payload: &serde_json::Value)
        -> Result<(), SinkError>;
}

pub struct PrintSink {}

#[async_trait]
impl OutputSink for PrintSink {
    async fn write(
        &self,
        relative_path: &str,
        payload: &serde_json::Value,
    ) -> Result<(), SinkError> {
        info!("aggregate batch {relative_path}: {payload}");
        Ok(())
    }
}

/// Writes each batch as a pretty-printed JSON file under a base directory.
pub struct LocalFileSink {
    base_dir: PathBuf,
}

impl LocalFileSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl OutputSink for LocalFileSink {
    async fn write(
        &self,
        relative_path: &str,
        payload: &serde_json::Value,
    ) -> Result<(), SinkError> {
        let path = self.base_dir.join(relative_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(payload)?;
        tokio::fs::write(&path, body).await?;
        debug!(path = %path.display(), "wrote aggregate batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_sink_creates_directories_and_writes_json() {
        let base = std::env::temp_dir().join(format!("unique-logins-{}", uuid::Uuid::new_v4()));
        let sink = LocalFileSink::new(&base);

        let payload = serde_json::json!({ "count": 3 });
        sink.write("metric_name=Test/date=2024-01-01/hour=01/batch.json", &payload)
            .await
            .expect("write failed");

        let written = std::fs::read_to_string(
            base.join("metric_name=Test/date=2024-01-01/hour=01/batch.json"),
        )
        .expect("output file missing");
        let round_tripped: serde_json::Value =
            serde_json::from_str(&written).expect("invalid json written");
        assert_eq!(round_tripped, payload);

        std::fs::remove_dir_all(&base).ok();
    }
}
