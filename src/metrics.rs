//! Throughput and score statistics for the screening service.

use crate::types::threat::ThreatScoreResult;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the screening loop
pub struct ScreeningMetrics {
    /// Transactions scored
    pub transactions_processed: AtomicU64,
    /// Transactions rejected (unparseable or invalid)
    pub transactions_rejected: AtomicU64,
    /// Federated rounds completed
    pub federated_rounds: AtomicU64,
    /// Results by threat level
    by_level: RwLock<HashMap<String, u64>>,
    /// How often each rule fired
    rule_hits: RwLock<HashMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ScreeningMetrics {
    pub fn new() -> Self {
        Self {
            transactions_processed: AtomicU64::new(0),
            transactions_rejected: AtomicU64::new(0),
            federated_rounds: AtomicU64::new(0),
            by_level: RwLock::new(HashMap::new()),
            rule_hits: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a scored transaction
    pub fn record_result(&self, processing_time: Duration, result: &ThreatScoreResult) {
        self.transactions_processed.fetch_add(1, Ordering::Relaxed);

        {
            let mut times = self.processing_times.write().unwrap_or_else(PoisonError::into_inner);
            times.push(processing_time.as_micros() as u64);
            // Keep only the most recent samples
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let bucket = ((result.score * 10.0) as usize).min(9);
        self.score_buckets.write().unwrap_or_else(PoisonError::into_inner)[bucket] += 1;

        *self
            .by_level
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(result.level.as_str().to_string())
            .or_insert(0) += 1;

        let mut hits = self.rule_hits.write().unwrap_or_else(PoisonError::into_inner);
        for factor in &result.factors {
            *hits.entry(factor.rule.clone()).or_insert(0) += 1;
        }
    }

    pub fn record_rejected(&self) {
        self.transactions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round(&self) {
        self.federated_rounds.fetch_add(1, Ordering::Relaxed);
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let times = self.processing_times.read().unwrap_or_else(PoisonError::into_inner);
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Transactions per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_processed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        *self.score_buckets.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_results_by_level(&self) -> HashMap<String, u64> {
        self.by_level.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_rule_hits(&self) -> HashMap<String, u64> {
        self.rule_hits.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let processed = self.transactions_processed.load(Ordering::Relaxed);
        let rejected = self.transactions_rejected.load(Ordering::Relaxed);
        let rounds = self.federated_rounds.load(Ordering::Relaxed);
        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              SENTINEL SCREENING - METRICS SUMMARY            ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Transactions Scored: {:>8}  │  Throughput: {:>6.1} tx/s    ║",
            processed, throughput
        );
        info!(
            "║ Rejected:            {:>8}  │  Federated rounds: {:>6}  ║",
            rejected, rounds
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Results by Threat Level:                                     ║");
        let mut levels: Vec<(String, u64)> = self.get_results_by_level().into_iter().collect();
        levels.sort();
        for (level, count) in &levels {
            let pct = if processed > 0 {
                (*count as f64 / processed as f64) * 100.0
            } else {
                0.0
            };
            info!("║   {:10}: {:>6} ({:>5.1}%)                                ║", level, count, pct);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Score Distribution:                                          ║");
        let score_dist = self.get_score_distribution();
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        let mut hits: Vec<(String, u64)> = self.get_rule_hits().into_iter().collect();
        if !hits.is_empty() {
            hits.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            info!("Rule hits:");
            for (rule, count) in &hits {
                info!("  {}: {}", rule, count);
            }
        }
    }
}

impl Default for ScreeningMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints a metrics summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<ScreeningMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ScreeningMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Run the periodic reporting loop
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
