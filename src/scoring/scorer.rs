//! Threat scorer: neighbour similarity plus heuristic rules

use super::params::ScoringParameters;
use super::rules::{evaluate, RuleContext};
use crate::index::{DistanceMetric, SearchHit};
use crate::types::threat::{ThreatLevel, ThreatScoreResult};
use crate::types::transaction::{RecordMetadata, Transaction};
use tracing::debug;

/// Combines rule contributions into a bounded score and a level.
///
/// `score = clamp(sum of fired rule contributions, 0, 1)`. Pure: the same
/// inputs and parameter snapshot always give the same result.
#[derive(Debug, Clone, Copy)]
pub struct ThreatScorer {
    metric: DistanceMetric,
}

impl ThreatScorer {
    /// `metric` must be the metric the neighbour distances were measured with
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric }
    }

    /// Score a candidate.
    ///
    /// `neighbors` are its nearest indexed transactions (closest first) and
    /// `account_history` the other indexed transactions of its account.
    pub fn score(
        &self,
        params: &ScoringParameters,
        record: &Transaction,
        neighbors: &[SearchHit],
        account_history: &[RecordMetadata],
    ) -> ThreatScoreResult {
        let ctx = RuleContext {
            record,
            neighbors,
            metric: self.metric,
            account_history,
        };

        let factors: Vec<_> = params
            .rules
            .iter()
            .filter_map(|rule| evaluate(rule, &ctx))
            .collect();

        let raw: f64 = factors.iter().map(|f| f.contribution).sum();
        let score = raw.clamp(0.0, 1.0);
        let level = ThreatLevel::from_score(score, &params.levels);

        debug!(
            transaction_id = %record.transaction_id,
            score = score,
            level = level.as_str(),
            fired = factors.len(),
            parameters_version = params.version,
            "Transaction scored"
        );

        ThreatScoreResult {
            transaction_id: record.transaction_id.clone(),
            score,
            level,
            factors,
            parameters_version: params.version,
        }
    }
}
