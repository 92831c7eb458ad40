use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::{counter, histogram};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::SourceError;
use crate::metrics_consts::{
    BUFFER_FLUSH_SIZE, SHARDS_SKIPPED, SHARD_ATTEMPT_FAILURES, SHARD_FETCHES, SHARD_RETRIES,
};
use crate::processor::RecordProcessor;
use crate::source::{PartitionSource, ShardDescriptor};

/// Timing and retry knobs for shard consumers. Buffer thresholds come from
/// [`Config`]; the rest are fixed in production and only shrunk by tests.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Flush the record buffer once it holds this many records.
    pub buffer_size: usize,
    /// Flush the record buffer once this much time has passed since the last
    /// flush, regardless of how full it is.
    pub buffer_time: Duration,
    /// Retry budget for the whole per-shard attempt, on top of the first try.
    pub max_retries: u32,
    /// Fixed delay between per-shard attempts.
    pub retry_delay: Duration,
    /// Pause after a fetch that returned no records, to avoid busy-polling
    /// an idle shard.
    pub idle_pause: Duration,
    /// Maximum records requested per fetch call.
    pub fetch_limit: usize,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            buffer_size: 500,
            buffer_time: Duration::from_secs(5),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            idle_pause: Duration::from_secs(1),
            fetch_limit: 1000,
        }
    }
}

impl ConsumerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            buffer_size: config.buffer_size,
            buffer_time: Duration::from_millis(config.buffer_time_ms),
            ..Self::default()
        }
    }
}

/// Terminal state of one shard task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardOutcome {
    /// The shard reported no further cursor; all buffered records were
    /// flushed before terminating.
    Completed,
    /// No initial cursor could be obtained; nothing to process. Not counted
    /// as a failure.
    CursorUnavailable,
    /// Every attempt failed. The shard is skipped until the process is
    /// restarted; no other shard picks it up.
    RetriesExhausted,
    /// Shutdown was requested during a wait.
    Cancelled,
}

enum AttemptEnd {
    Completed,
    CursorUnavailable,
    Cancelled,
}

/// Owns one shard: fetch → buffer → flush-to-processor, with a bounded
/// retry budget around the whole attempt. The record buffer, cursor and
/// retry counter are exclusively owned here and never shared.
pub struct ShardConsumer<S> {
    source: Arc<S>,
    processor: Arc<RecordProcessor>,
    settings: ConsumerSettings,
    shutdown: CancellationToken,
}

impl<S: PartitionSource> ShardConsumer<S> {
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

    /// Consume `shard` until its cursor is exhausted. Any error during an
    /// attempt restarts the whole attempt (fresh cursor, empty buffer) up to
    /// the retry budget; cancellation stops immediately without retrying.
    pub async fn run(&self, shard: ShardDescriptor) -> ShardOutcome {
        let max_attempts = self.settings.max_retries + 1;

        for attempt in 1..=max_attempts {
            info!(shard = %shard.shard_id, attempt, max_attempts, "processing shard");

            match self.consume(&shard).await {
                Ok(AttemptEnd::Completed) => {
                    info!(shard = %shard.shard_id, "completed processing shard");
                    return ShardOutcome::Completed;
                }
                Ok(AttemptEnd::CursorUnavailable) => {
                    warn!(shard = %shard.shard_id, "no cursor available, skipping shard");
                    return ShardOutcome::CursorUnavailable;
                }
                Ok(AttemptEnd::Cancelled) => {
                    info!(shard = %shard.shard_id, "shard consumer cancelled");
                    return ShardOutcome::Cancelled;
                }
                Err(err) => {
                    counter!(SHARD_ATTEMPT_FAILURES).increment(1);
                    if attempt == max_attempts {
                        error!(shard = %shard.shard_id, "max retries reached, skipping shard: {err}");
                        break;
                    }
                    warn!(
                        shard = %shard.shard_id,
                        attempt,
                        "error processing shard, retrying after delay: {err}"
                    );
                    counter!(SHARD_RETRIES).increment(1);
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return ShardOutcome::Cancelled,
                        _ = tokio::time::sleep(self.settings.retry_delay) => {}
                    }
                }
            }
        }

        counter!(SHARDS_SKIPPED).increment(1);
        ShardOutcome::RetriesExhausted
    }

    async fn consume(&self, shard: &ShardDescriptor) -> Result<AttemptEnd, SourceError> {
        let mut cursor = match self.source.initial_cursor(shard).await {
            Ok(Some(cursor)) => Some(cursor),
            Ok(None) => return Ok(AttemptEnd::CursorUnavailable),
            Err(err) => {
                // The original position is gone or unreadable; treat the
                // shard as having nothing to process rather than failing.
                warn!(shard = %shard.shard_id, "failed to obtain initial cursor: {err}");
                return Ok(AttemptEnd::CursorUnavailable);
            }
        };

        let mut buffer: Vec<Bytes> = Vec::new();
        let mut last_flush = Instant::now();

        while let Some(current) = cursor {
            let batch = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(AttemptEnd::Cancelled),
                fetched = self.source.fetch(&current, self.settings.fetch_limit) => fetched?,
            };
            counter!(SHARD_FETCHES).increment(1);
            debug!(shard = %shard.shard_id, fetched = batch.records.len(), "fetched records");

            let fetched_nothing = batch.records.is_empty();
            buffer.extend(batch.records);
            cursor = batch.next_cursor;

            // An empty buffer has nothing to flush; skipping keeps idle
            // cycles out of the flush-size histogram.
            if !buffer.is_empty()
                && (buffer.len() >= self.settings.buffer_size
                    || last_flush.elapsed() >= self.settings.buffer_time)
            {
                self.flush(shard, &mut buffer);
                last_flush = Instant::now();
            }

            if fetched_nothing && cursor.is_some() {
                tokio::select! {
                    _ = self.shutdown.cancelled() => return Ok(AttemptEnd::Cancelled),
                    _ = tokio::time::sleep(self.settings.idle_pause) => {}
                }
            }
        }

        // Clean end of stream: flush whatever is left.
        if !buffer.is_empty() {
            info!(shard = %shard.shard_id, remaining = buffer.len(), "flushing remaining records");
            self.flush(shard, &mut buffer);
        }
        Ok(AttemptEnd::Completed)
    }

    /// Hand the whole buffer to the processor in arrival order.
    fn flush(&self, shard: &ShardDescriptor, buffer: &mut Vec<Bytes>) {
        histogram!(BUFFER_FLUSH_SIZE).record(buffer.len() as f64);
        debug!(shard = %shard.shard_id, records = buffer.len(), "flushing buffer to processor");
        for record in buffer.drain(..) {
            self.processor.handle(&record);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::dedup::SlidingWindowDedup;
    use crate::store::AggregationStore;
    use crate::test_utils::{v1_record, v2_record, FailingSource, InMemorySource};

    fn test_settings() -> ConsumerSettings {
        ConsumerSettings {
            buffer_size: 100,
            buffer_time: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
            idle_pause: Duration::from_millis(10),
            fetch_limit: 1000,
        }
    }

    fn pipeline() -> (Arc<RecordProcessor>, Arc<AggregationStore>) {
        let dedup = Arc::new(SlidingWindowDedup::new(Duration::from_secs(60), 10_000));
        let store = Arc::new(AggregationStore::new());
        (
            Arc::new(RecordProcessor::new(dedup, store.clone())),
            store,
        )
    }

    #[tokio::test]
    async fn exhausted_shard_flushes_remaining_buffer() {
        let mut source = InMemorySource::new();
        source.add_shard(
            "shard-0",
            vec![vec![v1_record("p1"), v2_record("p2", "US")]],
        );

        let (processor, store) = pipeline();
        let consumer = ShardConsumer::new(
            Arc::new(source),
            processor,
            test_settings(),
            CancellationToken::new(),
        );

        let outcome = consumer
            .run(ShardDescriptor {
                shard_id: "shard-0".to_string(),
            })
            .await;

        assert_eq!(outcome, ShardOutcome::Completed);
        assert_eq!(store.drain().unique_global.len(), 2);
    }

    #[tokio::test]
    async fn size_threshold_flushes_while_the_shard_is_still_live() {
        let mut source = InMemorySource::new();
        // Two records then endless empty fetches: only a size-triggered
        // flush can make them visible before the consumer terminates.
        source.add_idle_shard(
            "shard-0",
            vec![vec![v1_record("p1"), v1_record("p2")]],
        );

        let (processor, store) = pipeline();
        let shutdown = CancellationToken::new();
        let settings = ConsumerSettings {
            buffer_size: 2,
            ..test_settings()
        };
        let consumer = ShardConsumer::new(Arc::new(source), processor, settings, shutdown.clone());

        let task = tokio::spawn(async move {
            consumer
                .run(ShardDescriptor {
                    shard_id: "shard-0".to_string(),
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.drain().unique_global.len(), 2);

        shutdown.cancel();
        assert_eq!(task.await.unwrap(), ShardOutcome::Cancelled);
    }

    #[tokio::test]
    async fn time_threshold_flushes_a_partial_buffer() {
        let mut source = InMemorySource::new();
        source.add_idle_shard("shard-0", vec![vec![v1_record("p1")]]);

        let (processor, store) = pipeline();
        let shutdown = CancellationToken::new();
        let settings = ConsumerSettings {
            buffer_size: 100,
            buffer_time: Duration::from_millis(50),
            ..test_settings()
        };
        let consumer = ShardConsumer::new(Arc::new(source), processor, settings, shutdown.clone());

        let task = tokio::spawn(async move {
            consumer
                .run(ShardDescriptor {
                    shard_id: "shard-0".to_string(),
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.drain().unique_global.len(), 1);

        shutdown.cancel();
        assert_eq!(task.await.unwrap(), ShardOutcome::Cancelled);
    }

    /// Uses metrics-util's DebuggingRecorder to verify actual metrics are
    /// reported.
    #[tokio::test]
    async fn idle_cycles_record_no_empty_flush_samples() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
        use std::sync::OnceLock;

        // Install a global debugging recorder once per test process
        static SNAPSHOTTER: OnceLock<Snapshotter> = OnceLock::new();
        let snapshotter = SNAPSHOTTER.get_or_init(|| {
            let recorder = DebuggingRecorder::new();
            let snapshotter = recorder.snapshotter();
            drop(recorder.install());
            snapshotter
        });

        let mut source = InMemorySource::new();
        // No records at all: the time threshold keeps tripping with an
        // empty buffer.
        source.add_idle_shard("shard-0", vec![]);

        let (processor, store) = pipeline();
        let shutdown = CancellationToken::new();
        let settings = ConsumerSettings {
            buffer_time: Duration::from_millis(10),
            idle_pause: Duration::from_millis(5),
            ..test_settings()
        };
        let consumer = ShardConsumer::new(Arc::new(source), processor, settings, shutdown.clone());

        let task = tokio::spawn(async move {
            consumer
                .run(ShardDescriptor {
                    shard_id: "shard-0".to_string(),
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        assert_eq!(task.await.unwrap(), ShardOutcome::Cancelled);
        assert!(store.drain().unique_global.is_empty());

        let zero_samples = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, _)| key.key().name() == BUFFER_FLUSH_SIZE)
            .filter_map(|(_, _, _, value)| match value {
                DebugValue::Histogram(samples) => Some(samples),
                _ => None,
            })
            .flatten()
            .filter(|sample| sample.into_inner() == 0.0)
            .count();
        assert_eq!(zero_samples, 0, "idle cycles must not flush empty buffers");
    }

    #[tokio::test]
    async fn retry_budget_is_exactly_one_plus_max_retries() {
        let source = Arc::new(FailingSource::default());
        let (processor, store) = pipeline();
        let consumer = ShardConsumer::new(
            source.clone(),
            processor,
            test_settings(),
            CancellationToken::new(),
        );

        let outcome = consumer
            .run(ShardDescriptor {
                shard_id: "shard-0".to_string(),
            })
            .await;

        assert_eq!(outcome, ShardOutcome::RetriesExhausted);
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 4);
        assert!(store.drain().unique_global.is_empty());
    }

    #[tokio::test]
    async fn missing_initial_cursor_terminates_cleanly_without_retries() {
        let mut source = InMemorySource::new();
        source.add_unreadable_shard("shard-0");
        let source = Arc::new(source);

        let (processor, _store) = pipeline();
        let consumer = ShardConsumer::new(
            source.clone(),
            processor,
            test_settings(),
            CancellationToken::new(),
        );

        let outcome = consumer
            .run(ShardDescriptor {
                shard_id: "shard-0".to_string(),
            })
            .await;

        assert_eq!(outcome, ShardOutcome::CursorUnavailable);
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 0);
    }
}
