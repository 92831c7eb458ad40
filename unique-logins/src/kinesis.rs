use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_kinesis::{
    config::{Credentials, Region},
    types::ShardIteratorType,
    Client,
};
use bytes::Bytes;
use tracing::info;

use crate::error::SourceError;
use crate::source::{FetchBatch, PartitionSource, ShardCursor, ShardDescriptor};

/// Configuration for creating the Kinesis-backed partition source.
pub struct KinesisConfig {
    pub stream_name: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Kinesis implementation of [`PartitionSource`]. Consumption starts at the
/// oldest available position (TRIM_HORIZON).
#[derive(Clone)]
pub struct KinesisSource {
    client: Client,
    stream_name: String,
}

impl KinesisSource {
    /// Uses the default AWS credential chain (IRSA, env vars, instance
    /// profile, etc.) unless explicit credentials are provided.
    pub async fn new(config: KinesisConfig) -> Self {
        let region = Region::new(config.region.clone());

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region.clone())
            .load()
            .await;

        let mut builder = aws_sdk_kinesis::config::Builder::from(&aws_config).region(region);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        // Override with explicit credentials if provided (e.g. localstack).
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = Credentials::new(access_key, secret_key, None, None, "env");
            builder = builder.credentials_provider(credentials);
        }

        let client = Client::from_conf(builder.build());
        info!(stream = %config.stream_name, "created Kinesis client");

        Self {
            client,
            stream_name: config.stream_name,
        }
    }
}

#[async_trait]
impl PartitionSource for KinesisSource {
    async fn list_shards(&self) -> Result<Vec<ShardDescriptor>, SourceError> {
        let output = self
            .client
            .list_shards()
            .stream_name(&self.stream_name)
            .send()
            .await
            .map_err(|e| SourceError::ListShards(e.to_string()))?;

        Ok(output
            .shards()
            .iter()
            .map(|shard| ShardDescriptor {
                shard_id: shard.shard_id().to_string(),
            })
            .collect())
    }

    async fn initial_cursor(
        &self,
        shard: &ShardDescriptor,
    ) -> Result<Option<ShardCursor>, SourceError> {
        let output = self
            .client
            .get_shard_iterator()
            .stream_name(&self.stream_name)
            .shard_id(&shard.shard_id)
            .shard_iterator_type(ShardIteratorType::TrimHorizon)
            .send()
            .await
            .map_err(|e| SourceError::Cursor(e.to_string()))?;

        Ok(output
            .shard_iterator()
            .map(|iterator| ShardCursor(iterator.to_string())))
    }

    async fn fetch(
        &self,
        cursor: &ShardCursor,
        max_records: usize,
    ) -> Result<FetchBatch, SourceError> {
        let output = self
            .client
            .get_records()
            .shard_iterator(&cursor.0)
            .limit(max_records as i32)
            .send()
            .await
            .map_err(|e| SourceError::Fetch(e.to_string()))?;

        let records = output
            .records()
            .iter()
            .map(|record| Bytes::copy_from_slice(record.data().as_ref()))
            .collect();

        Ok(FetchBatch {
            records,
            next_cursor: output
                .next_shard_iterator()
                .map(|iterator| ShardCursor(iterator.to_string())),
        })
    }
}
