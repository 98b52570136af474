//! Threat scoring and federated parameter aggregation

pub mod federated;
pub mod params;
pub mod rules;
pub mod scorer;

pub use federated::{merge_updates, FederatedAggregator, FederatedUpdate, RoundOutcome, RoundSummary};
pub use params::{ParameterHandle, ScoringParameters};
pub use rules::Rule;
pub use scorer::ThreatScorer;
