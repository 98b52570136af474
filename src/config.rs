//! Configuration management for the screening service

use crate::index::metric::DistanceMetric;
use crate::scoring::rules::{default_rules, Rule};
use crate::types::threat::ThreatThresholds;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Where the service looks for its configuration
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// What the index does when an id is inserted twice
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail with `DuplicateId` and leave the existing entry untouched
    #[default]
    Reject,
    /// Replace the existing entry
    Overwrite,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub federated: FederatedConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Embedding generator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Number of hashed text buckets
    pub text_dimensions: usize,
    /// Scale applied to the numeric block relative to the unit-length text block
    pub numeric_weight: f32,
    /// Amount that maps to 1.0 after log scaling
    pub amount_ceiling: f64,
    /// Amounts below this are flagged as micro transactions
    pub micro_amount: f64,
    /// Amounts at or above this are flagged as large
    pub large_amount: f64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            text_dimensions: 64,
            numeric_weight: 0.5,
            amount_ceiling: 100_000.0,
            micro_amount: 5.0,
            large_amount: 5000.0,
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct IndexConfig {
    pub metric: DistanceMetric,
    pub duplicate_policy: DuplicatePolicy,
}

/// Threat scoring configuration: the initial scoring parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Number of nearest neighbours consulted per score
    pub neighbors: usize,
    /// Rules evaluated in order
    pub rules: Vec<Rule>,
    /// Classification cutoffs
    pub levels: ThreatThresholds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            neighbors: 5,
            rules: default_rules(),
            levels: ThreatThresholds::default(),
        }
    }
}

/// Federated round simulation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FederatedConfig {
    /// Default number of simulated clients per round
    pub clients: usize,
    /// Default nominal samples per client
    pub samples_per_client: u64,
    /// Largest weight perturbation a client may propose
    pub max_delta: f64,
    /// Sample count at which perturbations are no longer damped
    pub reference_samples: u64,
    /// Base seed for per-round randomness
    pub seed: u64,
    /// Names given to the first clients; later ones are numbered
    pub client_names: Vec<String>,
}

impl Default for FederatedConfig {
    fn default() -> Self {
        Self {
            clients: 3,
            samples_per_client: 100,
            max_delta: 0.1,
            reference_samples: 100,
            seed: 42,
            client_names: vec![
                "Bank A".to_string(),
                "Bank B".to_string(),
                "Bank C".to_string(),
            ],
        }
    }
}

/// Service binary configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum transactions scored concurrently
    pub workers: usize,
    /// Seed the index with the demo dataset at startup
    pub seed_demo_data: bool,
    /// Size of the demo dataset
    pub demo_transactions: usize,
    /// Run a federated round after this many transactions (0 disables)
    pub federated_every: u64,
    /// Seconds between metrics summaries
    pub report_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            seed_demo_data: true,
            demo_transactions: 200,
            federated_every: 100,
            report_interval_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Like [`AppConfig::load_from_path`], but `Ok(None)` when the file does
    /// not exist. A file that exists and fails to parse is still an error.
    pub fn load_if_present<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        if !path.as_ref().exists() {
            return Ok(None);
        }
        Self::load_from_path(path).map(Some)
    }

    /// Load configuration from a specific path, with `SENTINEL__SECTION__KEY`
    /// environment overrides on top
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("SENTINEL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Total embedding dimension implied by this configuration
    pub fn embedding_dimension(&self) -> usize {
        self.embedding.text_dimensions + crate::embedding::NUMERIC_FEATURES
    }
}
