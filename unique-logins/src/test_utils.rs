//! In-memory fakes shared by unit and integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{SinkError, SourceError};
use crate::sink::OutputSink;
use crate::source::{FetchBatch, PartitionSource, ShardCursor, ShardDescriptor};

pub fn v1_record(player_id: &str) -> Bytes {
    Bytes::from(serde_json::json!({ "playerId": player_id }).to_string())
}

pub fn v2_record(player_id: &str, country: &str) -> Bytes {
    Bytes::from(
        serde_json::json!({ "playerId": player_id, "country": country }).to_string(),
    )
}

enum ShardKind {
    /// The cursor runs out after the last batch.
    Exhausting,
    /// After the scripted batches, endless empty fetches with a live cursor.
    Idle,
    /// No initial cursor can be obtained.
    Unreadable,
    /// A cursor is handed out but every fetch fails.
    Failing,
}

struct ShardData {
    shard_id: String,
    kind: ShardKind,
    batches: Vec<Vec<Bytes>>,
}

/// Scripted [`PartitionSource`]: each shard serves its batches in order.
/// Cursors encode a `shard:batch` position so fetches need no shared state.
#[derive(Default)]
pub struct InMemorySource {
    shards: Vec<ShardData>,
    pub fetch_calls: AtomicUsize,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_shard(&mut self, shard_id: &str, batches: Vec<Vec<Bytes>>) {
        self.shards.push(ShardData {
            shard_id: shard_id.to_string(),
            kind: ShardKind::Exhausting,
            batches,
        });
    }

    pub fn add_idle_shard(&mut self, shard_id: &str, batches: Vec<Vec<Bytes>>) {
        self.shards.push(ShardData {
            shard_id: shard_id.to_string(),
            kind: ShardKind::Idle,
            batches,
        });
    }

    pub fn add_unreadable_shard(&mut self, shard_id: &str) {
        self.shards.push(ShardData {
            shard_id: shard_id.to_string(),
            kind: ShardKind::Unreadable,
            batches: Vec::new(),
        });
    }

    pub fn add_failing_shard(&mut self, shard_id: &str) {
        self.shards.push(ShardData {
            shard_id: shard_id.to_string(),
            kind: ShardKind::Failing,
            batches: Vec::new(),
        });
    }

    fn shard_index(&self, shard_id: &str) -> usize {
        self.shards
            .iter()
            .position(|shard| shard.shard_id == shard_id)
            .expect("unknown shard id in test source")
    }
}

#[async_trait]
impl PartitionSource for InMemorySource {
    async fn list_shards(&self) -> Result<Vec<ShardDescriptor>, SourceError> {
        Ok(self
            .shards
            .iter()
            .map(|shard| ShardDescriptor {
                shard_id: shard.shard_id.clone(),
            })
            .collect())
    }

    async fn initial_cursor(
        &self,
        shard: &ShardDescriptor,
    ) -> Result<Option<ShardCursor>, SourceError> {
        let index = self.shard_index(&shard.shard_id);
        match self.shards[index].kind {
            ShardKind::Unreadable => Ok(None),
            _ => Ok(Some(ShardCursor(format!("{index}:0")))),
        }
    }

    async fn fetch(
        &self,
        cursor: &ShardCursor,
        _max_records: usize,
    ) -> Result<FetchBatch, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let (shard_index, batch_index) = cursor
            .0
            .split_once(':')
            .and_then(|(s, b)| Some((s.parse::<usize>().ok()?, b.parse::<usize>().ok()?)))
            .expect("malformed test cursor");
        let shard = &self.shards[shard_index];

        if matches!(shard.kind, ShardKind::Failing) {
            return Err(SourceError::Fetch("injected fetch failure".to_string()));
        }

        let records = shard.batches.get(batch_index).cloned().unwrap_or_default();
        let next_cursor = if batch_index + 1 < shard.batches.len() {
            Some(ShardCursor(format!("{shard_index}:{}", batch_index + 1)))
        } else {
            match shard.kind {
                ShardKind::Idle => Some(ShardCursor(format!(
                    "{shard_index}:{}",
                    shard.batches.len()
                ))),
                _ => None,
            }
        };

        Ok(FetchBatch {
            records,
            next_cursor,
        })
    }
}

/// A single-shard source whose every fetch fails, for exercising the retry
/// budget.
#[derive(Default)]
pub struct FailingSource {
    pub fetch_calls: AtomicUsize,
}

#[async_trait]
impl PartitionSource for FailingSource {
    async fn list_shards(&self) -> Result<Vec<ShardDescriptor>, SourceError> {
        Ok(vec![ShardDescriptor {
            shard_id: "shard-0".to_string(),
        }])
    }

    async fn initial_cursor(
        &self,
        _shard: &ShardDescriptor,
    ) -> Result<Option<ShardCursor>, SourceError> {
        Ok(Some(ShardCursor("0:0".to_string())))
    }

    async fn fetch(
        &self,
        _cursor: &ShardCursor,
        _max_records: usize,
    ) -> Result<FetchBatch, SourceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Err(SourceError::Fetch("injected fetch failure".to_string()))
    }
}

/// Captures every write so tests can assert on paths and payloads.
#[derive(Default)]
pub struct RecordingSink {
    pub writes: Mutex<Vec<(String, serde_json::Value)>>,
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn write(
        &self,
        relative_path: &str,
        payload: &serde_json::Value,
    ) -> Result<(), SinkError> {
        self.writes
            .lock()
            .expect("recording sink lock poisoned")
            .push((relative_path.to_string(), payload.clone()));
        Ok(())
    }
}

pub struct FailingSink {}

#[async_trait]
impl OutputSink for FailingSink {
    async fn write(
        &self,
        _relative_path: &str,
        _payload: &serde_json::Value,
    ) -> Result<(), SinkError> {
        Err(std::io::Error::other("injected sink failure").into())
    }
}
