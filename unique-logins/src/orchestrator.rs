use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::consumer::{ConsumerSettings, ShardConsumer, ShardOutcome};
use crate::error::SourceError;
use crate::processor::RecordProcessor;
use crate::source::PartitionSource;

/// Discovers the stream's shards once at startup and runs one consumer task
/// per shard. There is no leader election and no reassignment: a shard task
/// that fails stays failed, and resharding after startup is picked up by
/// restarting the process.
pub struct ConsumptionOrchestrator<S> {
    source: Arc<S>,
    processor: Arc<RecordProcessor>,
    settings: ConsumerSettings,
    shutdown: CancellationToken,
}

impl<S: PartitionSource + 'static> ConsumptionOrchestrator<S> {
    pub fn new(
        source: Arc<S>,
        processor: Arc<RecordProcessor>,
        settings: ConsumerSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            processor,
            settings,
            shutdown,
        }
    }

    /// List shards and spawn one independent consumer task each. Failing to
    /// list shards is a startup failure; after that, shard tasks only affect
    /// themselves.
    pub async fn start(&self) -> Result<JoinSet<ShardOutcome>, SourceError> {
        let shards = self.source.list_shards().await?;
        info!(shards = shards.len(), "discovered stream shards");

        let mut tasks = JoinSet::new();
        for shard in shards {
            let consumer = ShardConsumer::new(
                self.source.clone(),
                self.processor.clone(),
                self.settings.clone(),
                self.shutdown.clone(),
            );
            tasks.spawn(async move { consumer.run(shard).await });
        }
        Ok(tasks)
    }
}
