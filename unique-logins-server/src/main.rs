use std::sync::Arc;
use std::time::Duration;

use envconfig::Envconfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use unique_logins::config::Config;
use unique_logins::consumer::{ConsumerSettings, ShardOutcome};
use unique_logins::dedup::SlidingWindowDedup;
use unique_logins::flush::OutputScheduler;
use unique_logins::kinesis::{KinesisConfig, KinesisSource};
use unique_logins::orchestrator::ConsumptionOrchestrator;
use unique_logins::processor::RecordProcessor;
use unique_logins::sink::{LocalFileSink, OutputSink, PrintSink};
use unique_logins::store::AggregationStore;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    info!("shutdown signal received");
}

async fn drain_shard_tasks(tasks: &mut JoinSet<ShardOutcome>) {
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(outcome) => info!(?outcome, "shard consumer finished"),
            Err(err) => error!("shard consumer panicked: {err}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();
    info!("starting unique logins aggregator");

    let config = Config::init_from_env()?;

    if config.export_prometheus {
        PrometheusBuilder::new()
            .with_http_listener(config.metrics_address)
            .install()?;
        info!(address = %config.metrics_address, "prometheus exporter listening");
    }

    let source = Arc::new(
        KinesisSource::new(KinesisConfig {
            stream_name: config.stream_name.clone(),
            region: config.aws_region.clone(),
            endpoint: config.aws_endpoint.clone(),
            access_key_id: config.aws_access_key_id.clone(),
            secret_access_key: config.aws_secret_access_key.clone(),
        })
        .await,
    );

    let dedup = Arc::new(SlidingWindowDedup::new(
        Duration::from_secs(config.dedup_window_minutes * 60),
        config.dedup_max_entries,
    ));
    let store = Arc::new(AggregationStore::new());
    let processor = Arc::new(RecordProcessor::new(dedup, store.clone()));

    let sink: Arc<dyn OutputSink> = if config.print_sink {
        Arc::new(PrintSink {})
    } else {
        Arc::new(LocalFileSink::new(&config.output_base_dir))
    };

    let shutdown_token = CancellationToken::new();

    let orchestrator = ConsumptionOrchestrator::new(
        source,
        processor,
        ConsumerSettings::from_config(&config),
        shutdown_token.clone(),
    );
    let mut shard_tasks = orchestrator.start().await?;

    let scheduler = Arc::new(OutputScheduler::new(
        store,
        sink,
        Duration::from_millis(config.flush_period_ms),
    ));
    let scheduler_task = {
        let scheduler = scheduler.clone();
        let token = shutdown_token.clone();
        tokio::spawn(async move { scheduler.run(token).await })
    };

    tokio::select! {
        _ = shutdown() => {}
        _ = drain_shard_tasks(&mut shard_tasks) => {
            info!("all shard consumers finished");
        }
    }

    // Stop the remaining tasks, then write whatever aggregates are pending
    // so a clean shutdown loses nothing already recorded.
    shutdown_token.cancel();
    drain_shard_tasks(&mut shard_tasks).await;
    scheduler_task.await?;
    if let Err(err) = scheduler.flush_once().await {
        error!("final flush failed: {err}");
    }

    info!("unique logins aggregator stopped");
    Ok(())
}
