use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("record matches neither login schema: {0}")]
    UnknownSchema(String),
    #[error("record submitted without a player id")]
    MissingPlayerId,
}

/// Errors surfaced by the partition source. All of these are considered
/// transient and retryable at the shard level, except when obtaining the
/// initial cursor, where any failure skips the shard cleanly.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to list shards: {0}")]
    ListShards(String),
    #[error("failed to obtain shard cursor: {0}")]
    Cursor(String),
    #[error("failed to fetch records: {0}")]
    Fetch(String),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to serialize output payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}
