//! Versioned scoring parameters and the shared handle that swaps them.

use super::rules::Rule;
use crate::config::ScoringConfig;
use crate::error::Result;
use crate::types::threat::ThreatThresholds;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Rule weights, thresholds and classification cutoffs.
///
/// Immutable once published: updates build a new value and swap it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringParameters {
    /// Bumped on every swap
    pub version: u64,
    /// Neighbours consulted per score
    pub neighbors: usize,
    pub rules: Vec<Rule>,
    pub levels: ThreatThresholds,
}

impl ScoringParameters {
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            version: 0,
            neighbors: config.neighbors,
            rules: config.rules.clone(),
            levels: config.levels.clone(),
        }
    }

    /// Rule name -> weight
    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.rules
            .iter()
            .map(|r| (r.name().to_string(), r.weight()))
            .collect()
    }

    /// Copy with the named weights replaced. Names not present are ignored.
    pub fn with_weights(&self, weights: &BTreeMap<String, f64>) -> Self {
        let mut next = self.clone();
        for rule in &mut next.rules {
            if let Some(w) = weights.get(rule.name()) {
                rule.set_weight(*w);
            }
        }
        next
    }

    /// Threshold of the similar-to-flagged rule, if configured
    pub fn similarity_threshold(&self) -> Option<f64> {
        self.rules.iter().find_map(|r| match r {
            Rule::SimilarToFlagged { min_similarity, .. } => Some(*min_similarity),
            _ => None,
        })
    }
}

impl Default for ScoringParameters {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

/// Shared, explicitly passed handle to the live parameter set.
///
/// Readers take an `Arc` snapshot and never see a half-applied update;
/// writers are serialised by the write lock (copy, modify, swap).
#[derive(Debug)]
pub struct ParameterHandle {
    current: RwLock<Arc<ScoringParameters>>,
}

impl ParameterHandle {
    pub fn new(params: ScoringParameters) -> Self {
        Self {
            current: RwLock::new(Arc::new(params)),
        }
    }

    /// Consistent snapshot of the live parameters
    pub fn snapshot(&self) -> Arc<ScoringParameters> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Build the next parameter set from the current one and publish it.
    ///
    /// `update` runs under the write lock. If it fails the live set is left
    /// untouched. The published version is always `previous + 1`.
    pub fn replace_with<F>(&self, update: F) -> Result<Arc<ScoringParameters>>
    where
        F: FnOnce(&ScoringParameters) -> Result<ScoringParameters>,
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let current: &ScoringParameters = &guard;

        let mut next = update(current)?;
        next.version = current.version + 1;

        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScreeningError;

    #[test]
    fn test_weights_round_trip() {
        let params = ScoringParameters::default();
        let mut weights = params.weights();
        assert_eq!(weights.len(), 5);
        assert_eq!(weights["large_amount"], 0.30);

        weights.insert("large_amount".to_string(), 0.5);
        weights.insert("unknown_rule".to_string(), 0.9);
        let next = params.with_weights(&weights);

        assert_eq!(next.weights()["large_amount"], 0.5);
        assert_eq!(next.weights().len(), 5);
        assert_eq!(params.weights()["large_amount"], 0.30);
        assert_eq!(next.similarity_threshold(), Some(0.6));
    }

    #[test]
    fn test_replace_bumps_version() {
        let handle = ParameterHandle::new(ScoringParameters::default());
        let before = handle.snapshot();

        let after = handle
            .replace_with(|p| Ok(p.with_weights(&BTreeMap::from([("velocity".to_string(), 0.9)]))))
            .unwrap();

        assert_eq!(after.version, 1);
        assert_eq!(handle.version(), 1);
        assert_eq!(handle.snapshot().weights()["velocity"], 0.9);
        // old snapshots stay valid and unchanged
        assert_eq!(before.version, 0);
        assert_eq!(before.weights()["velocity"], 0.20);
    }

    #[test]
    fn test_failed_replace_leaves_parameters() {
        let handle = ParameterHandle::new(ScoringParameters::default());
        let err = handle
            .replace_with(|_| Err(ScreeningError::EmptyRound { clients: 0 }))
            .unwrap_err();

        assert_eq!(err, ScreeningError::EmptyRound { clients: 0 });
        assert_eq!(handle.version(), 0);
        assert_eq!(*handle.snapshot(), ScoringParameters::default());
    }
}
