use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use unique_logins::consumer::{ConsumerSettings, ShardOutcome};
use unique_logins::dedup::SlidingWindowDedup;
use unique_logins::flush::OutputScheduler;
use unique_logins::orchestrator::ConsumptionOrchestrator;
use unique_logins::processor::RecordProcessor;
use unique_logins::store::AggregationStore;
use unique_logins::test_utils::{v1_record, v2_record, InMemorySource, RecordingSink};

/// End to end over in-memory shards: concurrent shard consumption, cross
/// shard dedup, and one flush cycle producing both output batches.
#[tokio::test]
async fn shards_to_flushed_batches() {
    let mut source = InMemorySource::new();
    source.add_shard(
        "shard-0",
        vec![vec![v1_record("p1"), v2_record("p2", "US")]],
    );
    source.add_shard(
        "shard-1",
        vec![
            vec![v2_record("p3", "SE")],
            // p1 logged in again on another shard, within the window.
            vec![v2_record("p1", "US"), v2_record("p4", "")],
        ],
    );
    source.add_unreadable_shard("shard-2");

    let dedup = Arc::new(SlidingWindowDedup::new(Duration::from_secs(600), 100_000));
    let store = Arc::new(AggregationStore::new());
    let processor = Arc::new(RecordProcessor::new(dedup, store.clone()));

    let orchestrator = ConsumptionOrchestrator::new(
        Arc::new(source),
        processor,
        ConsumerSettings::default(),
        CancellationToken::new(),
    );

    let mut tasks = orchestrator.start().await.expect("failed to start");
    let mut outcomes = Vec::new();
    while let Some(result) = tasks.join_next().await {
        outcomes.push(result.expect("shard task panicked"));
    }

    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == ShardOutcome::Completed)
            .count(),
        2
    );
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == ShardOutcome::CursorUnavailable)
            .count(),
        1
    );

    let sink = Arc::new(RecordingSink::default());
    let scheduler = OutputScheduler::new(store.clone(), sink.clone(), Duration::from_secs(60));
    scheduler.flush_once().await.expect("flush failed");

    let writes = sink.writes.lock().unwrap();
    assert_eq!(writes.len(), 2);

    // p1's second login was deduplicated, so four unique players in total.
    let total = &writes[0].1;
    assert_eq!(total["metricName"], "TotalUniqueLogins");
    assert_eq!(total["count"], 4);

    let rows = writes[1].1.as_array().expect("expected an array payload");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["country"], "N/A");
    assert_eq!(rows[0]["count"], 1);
    assert_eq!(rows[1]["country"], "SE");
    assert_eq!(rows[2]["country"], "US");
    // p1 was already seen globally when its US login arrived.
    assert_eq!(rows[2]["count"], 1);
    drop(writes);

    // The flush consumed the window; a second flush reports zero.
    scheduler.flush_once().await.expect("flush failed");
    let writes = sink.writes.lock().unwrap();
    assert_eq!(writes[2].1["count"], 0);
}
