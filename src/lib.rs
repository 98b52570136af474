//! Sentinel Screening Library
//!
//! In-memory transaction fraud screening: deterministic embeddings, a
//! brute-force vector index, rule-based threat scoring and simulated
//! federated aggregation of the scoring weights.

pub mod config;
pub mod consumer;
pub mod demo;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod metrics;
pub mod producer;
pub mod scoring;
pub mod types;

pub use config::AppConfig;
pub use consumer::TransactionConsumer;
pub use embedding::EmbeddingGenerator;
pub use engine::{BroadcastReport, EngineStats, ScreeningEngine, SearchQuery};
pub use error::{Result, ScreeningError};
pub use index::{FlatIndex, SearchHit, VectorIndex};
pub use producer::ResultProducer;
pub use scoring::{FederatedAggregator, ParameterHandle, ScoringParameters, ThreatScorer};
pub use types::{threat::ThreatScoreResult, transaction::Transaction};
