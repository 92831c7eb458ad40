use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SourceError;

/// Identity of one independently-ordered slice of the event stream. The core
/// treats it as an opaque key; only the source knows what is behind it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardDescriptor {
    pub shard_id: String,
}

/// Opaque resume token for fetching records from a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardCursor(pub String);

/// One fetch worth of raw records plus the cursor to continue from.
#[derive(Debug)]
pub struct FetchBatch {
    pub records: Vec<Bytes>,
    /// `None` means the shard is exhausted and the consumer should wind down.
    pub next_cursor: Option<ShardCursor>,
}

/// The partition-read side of the stream, e.g. Kinesis. Implementations are
/// thin I/O wrappers; retry and buffering policy live in the consumer.
#[async_trait]
pub trait PartitionSource: Send + Sync {
    /// All shards of the configured stream.
    async fn list_shards(&self) -> Result<Vec<ShardDescriptor>, SourceError>;

    /// A cursor at the oldest available position of `shard`, or `None` if
    /// the shard cannot be read.
    async fn initial_cursor(
        &self,
        shard: &ShardDescriptor,
    ) -> Result<Option<ShardCursor>, SourceError>;

    /// Up to `max_records` raw records at `cursor`.
    async fn fetch(
        &self,
        cursor: &ShardCursor,
        max_records: usize,
    ) -> Result<FetchBatch, SourceError>;
}
