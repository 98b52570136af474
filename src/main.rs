//! Sentinel Screening - Main Entry Point
//!
//! Reads JSON-lines transactions from stdin, scores and indexes each one, and
//! writes threat score results as JSON lines to stdout. Logs go to stderr.

use anyhow::Result;
use chrono::Utc;
use sentinel_screening::{
    config::{AppConfig, LoggingConfig, DEFAULT_CONFIG_PATH},
    demo::DemoGenerator,
    metrics::{MetricsReporter, ScreeningMetrics},
    ResultProducer, ScreeningEngine, TransactionConsumer,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn")
            .add_directive(format!("sentinel_screening={}", logging.level).parse()?),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before logging so the log settings apply.
    // Only a missing file falls back to defaults.
    let loaded = AppConfig::load_if_present(DEFAULT_CONFIG_PATH)?;
    let found = loaded.is_some();
    let config = loaded.unwrap_or_default();
    init_logging(&config.logging)?;

    info!("Starting Sentinel Screening");
    if found {
        info!("Configuration loaded successfully");
    } else {
        warn!(path = DEFAULT_CONFIG_PATH, "Configuration file not found, using defaults");
    }
    info!(
        "Threat levels: medium>={:.2}, high>={:.2}, critical>={:.2}",
        config.scoring.levels.medium, config.scoring.levels.high, config.scoring.levels.critical
    );

    let engine = Arc::new(ScreeningEngine::new(&config));
    info!(
        dimension = engine.embedder().dimension(),
        metric = ?config.index.metric,
        "Screening engine initialized"
    );

    if config.pipeline.seed_demo_data {
        let demo = DemoGenerator::seeded(config.federated.seed, Utc::now())
            .dataset(config.pipeline.demo_transactions);
        engine.seed(demo)?;
    }

    let metrics = Arc::new(ScreeningMetrics::new());
    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.report_interval_secs);
    tokio::spawn(reporter.start());

    let mut consumer = TransactionConsumer::stdin();
    let producer = Arc::new(ResultProducer::stdout());

    let num_workers = config.pipeline.workers.max(1);
    let federated_every = config.pipeline.federated_every;
    info!(workers = num_workers, federated_every = federated_every, "Reading transactions from stdin");

    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let processed_count = Arc::new(AtomicU64::new(0));

    while let Some(line) = consumer.next_transaction().await? {
        let transaction = match line.parsed {
            Ok(tx) => tx,
            Err(e) => {
                warn!(line = line.line_number, error = %e, "Failed to deserialize transaction");
                metrics.record_rejected();
                continue;
            }
        };

        let permit = semaphore.clone().acquire_owned().await?;

        let engine = engine.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();
        let processed_count = processed_count.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();

            match engine.screen(transaction) {
                Ok(result) => {
                    let processing_time = start_time.elapsed();
                    metrics.record_result(processing_time, &result);

                    debug!(
                        transaction_id = %result.transaction_id,
                        score = result.score,
                        level = result.level.as_str(),
                        processing_time_us = processing_time.as_micros(),
                        "Transaction screened"
                    );

                    if let Err(e) = producer.publish(&result).await {
                        error!(
                            transaction_id = %result.transaction_id,
                            error = %e,
                            "Failed to publish result"
                        );
                    }

                    let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
                    if federated_every > 0 && count % federated_every == 0 {
                        match engine.default_federated_round() {
                            Ok(outcome) => {
                                metrics.record_round();
                                info!(
                                    round_id = %outcome.summary.round_id,
                                    version = outcome.summary.version,
                                    processed = count,
                                    "Scoring weights updated"
                                );
                            }
                            Err(e) => warn!(error = %e, "Federated round rejected"),
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Transaction rejected");
                    metrics.record_rejected();
                }
            }

            drop(permit);
        });
    }

    // Wait for in-flight transactions
    let _drained = semaphore.acquire_many(num_workers as u32).await?;

    info!("Input exhausted, shutting down...");
    let stats = engine.stats();
    info!(
        entries = stats.entry_count,
        threats = stats.threats,
        parameters_version = stats.scoring_parameters.version,
        "Final index state"
    );
    metrics.print_summary();

    Ok(())
}
