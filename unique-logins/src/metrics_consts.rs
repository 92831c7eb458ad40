pub const RECORDS_RECEIVED: &str = "unique_logins_records_received";
pub const RECORDS_MALFORMED: &str = "unique_logins_records_malformed";
pub const RECORDS_DUPLICATE: &str = "unique_logins_records_duplicate";
pub const RECORDS_AGGREGATED: &str = "unique_logins_records_aggregated";
pub const SHARD_FETCHES: &str = "unique_logins_shard_fetches";
pub const SHARD_ATTEMPT_FAILURES: &str = "unique_logins_shard_attempt_failures";
pub const SHARD_RETRIES: &str = "unique_logins_shard_retries";
pub const SHARDS_SKIPPED: &str = "unique_logins_shards_skipped";
pub const BUFFER_FLUSH_SIZE: &str = "unique_logins_buffer_flush_size";
pub const FLUSH_TICKS: &str = "unique_logins_flush_ticks";
pub const FLUSH_FAILURES: &str = "unique_logins_flush_failures";
pub const FLUSH_UNIQUE_TOTAL: &str = "unique_logins_flush_unique_total";
pub const FLUSH_COUNTRIES: &str = "unique_logins_flush_countries";
