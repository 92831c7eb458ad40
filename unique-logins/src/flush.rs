use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use serde::Serialize;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::SinkError;
use crate::metrics_consts::{FLUSH_COUNTRIES, FLUSH_FAILURES, FLUSH_TICKS, FLUSH_UNIQUE_TOTAL};
use crate::sink::OutputSink;
use crate::store::AggregationStore;

pub const TOTAL_METRIC_NAME: &str = "TotalUniqueLogins";
pub const BY_COUNTRY_METRIC_NAME: &str = "UniqueLoginsByCountry";

/// Sentinel label for a by-country entry whose country key is empty.
pub const UNKNOWN_COUNTRY: &str = "N/A";

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TotalUniqueLogins {
    pub date: String,
    pub hour: String,
    pub minute: String,
    pub metric_name: String,
    pub count: usize,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UniqueLoginsByCountry {
    pub date: String,
    pub hour: String,
    pub minute: String,
    pub metric_name: String,
    pub country: String,
    pub count: usize,
}

/// Date/hour/minute labels plus a collision-resistant batch identifier
/// (timestamp + random component), shared by both outputs of one flush so
/// overlapping cycles never overwrite each other's files.
struct FlushStamp {
    date: String,
    hour: String,
    minute: String,
    batch_id: String,
}

impl FlushStamp {
    fn now() -> Self {
        let now = OffsetDateTime::now_utc();
        let timestamp = now
            .format(format_description!(
                "[year][month][day]_[hour][minute][second]_[subsecond digits:3]"
            ))
            .expect("failed to format batch timestamp");

        Self {
            date: now.date().to_string(),
            hour: format!("{:02}", now.hour()),
            minute: format!("{:02}", now.minute()),
            batch_id: format!("{}_{}", timestamp, Uuid::new_v4()),
        }
    }
}

/// Periodically drains the aggregation store and writes one total batch and
/// one by-country batch to the sink.
pub struct OutputScheduler {
    store: Arc<AggregationStore>,
    sink: Arc<dyn OutputSink>,
    period: Duration,
}

impl OutputScheduler {
    pub fn new(store: Arc<AggregationStore>, sink: Arc<dyn OutputSink>, period: Duration) -> Self {
        Self {
            store,
            sink,
            period,
        }
    }

    /// Runs until shutdown. Flushes never overlap with themselves: the next
    /// tick is awaited only after the current flush finished, and ticks that
    /// came due in the meantime are skipped, not queued.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticks = tokio::time::interval(self.period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of an interval completes immediately; consume it so
        // the first flush lands one full period after startup.
        ticks.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("output scheduler shutting down");
                    break;
                }
                _ = ticks.tick() => {
                    if let Err(err) = self.flush_once().await {
                        // The drained snapshot is discarded; this interval's
                        // aggregates are lost.
                        counter!(FLUSH_FAILURES).increment(1);
                        error!("failed to write aggregate output: {err}");
                    }
                }
            }
        }
    }

    /// One flush cycle: atomic drain, then sink I/O strictly after the
    /// snapshot is captured, outside any lock shared with writers.
    pub async fn flush_once(&self) -> Result<(), SinkError> {
        let snapshot = self.store.drain();
        counter!(FLUSH_TICKS).increment(1);
        gauge!(FLUSH_UNIQUE_TOTAL).set(snapshot.unique_global.len() as f64);
        gauge!(FLUSH_COUNTRIES).set(snapshot.unique_by_country.len() as f64);

        let stamp = FlushStamp::now();

        let total = TotalUniqueLogins {
            date: stamp.date.clone(),
            hour: stamp.hour.clone(),
            minute: stamp.minute.clone(),
            metric_name: TOTAL_METRIC_NAME.to_string(),
            count: snapshot.unique_global.len(),
        };
        let total_path = format!(
            "metric_name={}/date={}/hour={}/total_unique_logins_{}.json",
            TOTAL_METRIC_NAME, stamp.date, stamp.hour, stamp.batch_id
        );

        let mut by_country: Vec<UniqueLoginsByCountry> = snapshot
            .unique_by_country
            .iter()
            .map(|(country, players)| UniqueLoginsByCountry {
                date: stamp.date.clone(),
                hour: stamp.hour.clone(),
                minute: stamp.minute.clone(),
                metric_name: BY_COUNTRY_METRIC_NAME.to_string(),
                country: if country.is_empty() {
                    UNKNOWN_COUNTRY.to_string()
                } else {
                    country.clone()
                },
                count: players.len(),
            })
            .collect();
        by_country.sort_by(|a, b| a.country.cmp(&b.country));
        let by_country_path = format!(
            "metric_name={}/date={}/hour={}/unique_logins_by_country_{}.json",
            BY_COUNTRY_METRIC_NAME, stamp.date, stamp.hour, stamp.batch_id
        );

        self.sink
            .write(&total_path, &serde_json::to_value(&total)?)
            .await?;
        self.sink
            .write(&by_country_path, &serde_json::to_value(&by_country)?)
            .await?;

        info!(
            total = total.count,
            countries = by_country.len(),
            "aggregate batch written"
        );
        Ok(())
    }
}
