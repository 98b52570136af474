//! Simulated federated aggregation of rule weights.
//!
//! This is a structural simulation of the aggregation protocol, not a
//! learning algorithm: each simulated client proposes absolute rule weights by
//! perturbing the current ones with bounded pseudo-random noise, and the
//! server merges proposals with a sample-count weighted average. No gradients
//! are computed and no data leaves the process.

use super::params::{ParameterHandle, ScoringParameters};
use crate::config::FederatedConfig;
use crate::error::{Result, ScreeningError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// One client's proposal for a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederatedUpdate {
    pub client_id: String,
    /// Proposed absolute weight per rule name
    pub weights: BTreeMap<String, f64>,
    /// Local data volume, used as the merge weight
    pub sample_count: u64,
}

/// Merge client proposals: per rule, `sum(count_i * w_i) / sum(count_i)`
/// over the clients that proposed that rule.
///
/// Fails with `EmptyRound` when there are no updates or no samples at all.
pub fn merge_updates(updates: &[FederatedUpdate]) -> Result<BTreeMap<String, f64>> {
    let total: u64 = updates.iter().map(|u| u.sample_count).sum();
    if total == 0 {
        return Err(ScreeningError::EmptyRound {
            clients: updates.len(),
        });
    }

    let mut sums: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for update in updates {
        let count = update.sample_count as f64;
        for (rule, weight) in &update.weights {
            let entry = sums.entry(rule.as_str()).or_insert((0.0, 0.0));
            entry.0 += count * weight;
            entry.1 += count;
        }
    }

    Ok(sums
        .into_iter()
        .filter(|(_, (_, count))| *count > 0.0)
        .map(|(rule, (weighted, count))| (rule.to_string(), weighted / count))
        .collect())
}

/// A client's participation in a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientContribution {
    pub client_id: String,
    pub sample_count: u64,
}

/// What a round did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round_id: String,
    pub round_number: u64,
    pub participants: Vec<ClientContribution>,
    pub total_samples: u64,
    pub previous_version: u64,
    pub version: u64,
    pub weights_before: BTreeMap<String, f64>,
    pub weights_after: BTreeMap<String, f64>,
}

/// Result of a completed round: the published parameters and a summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub parameters: ScoringParameters,
    pub summary: RoundSummary,
}

/// Runs simulated rounds against a [`ParameterHandle`]
#[derive(Debug)]
pub struct FederatedAggregator {
    config: FederatedConfig,
    rounds: AtomicU64,
}

impl FederatedAggregator {
    pub fn new(config: FederatedConfig) -> Self {
        Self {
            config,
            rounds: AtomicU64::new(0),
        }
    }

    /// Rounds started so far, including failed ones
    pub fn rounds_started(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    /// Simulate one round and publish the merged weights.
    ///
    /// Either the whole merged set is swapped in or, on `EmptyRound`, the
    /// live parameters are left as they were.
    pub fn run_round(
        &self,
        params: &ParameterHandle,
        client_count: usize,
        samples_per_client: u64,
    ) -> Result<RoundOutcome> {
        let round_number = self.rounds.fetch_add(1, Ordering::Relaxed) + 1;
        let mut rng = StdRng::seed_from_u64(self.config.seed ^ round_number);
        let mut record = None;

        let published = params.replace_with(|current| {
            let updates = self.simulate_clients(current, client_count, samples_per_client, &mut rng);
            let merged = merge_updates(&updates)?;
            let next = current.with_weights(&merged);
            record = Some((updates, current.version, current.weights()));
            Ok(next)
        })?;

        let (updates, previous_version, weights_before) = record.ok_or(ScreeningError::EmptyRound {
            clients: client_count,
        })?;

        let participants: Vec<ClientContribution> = updates
            .into_iter()
            .map(|u| ClientContribution {
                client_id: u.client_id,
                sample_count: u.sample_count,
            })
            .collect();
        let total_samples = participants.iter().map(|p| p.sample_count).sum();

        let summary = RoundSummary {
            round_id: format!("FL-{round_number:04}"),
            round_number,
            participants,
            total_samples,
            previous_version,
            version: published.version,
            weights_before,
            weights_after: published.weights(),
        };

        info!(
            round_id = %summary.round_id,
            clients = client_count,
            total_samples = total_samples,
            version = published.version,
            "Federated round merged"
        );

        Ok(RoundOutcome {
            parameters: (*published).clone(),
            summary,
        })
    }

    /// Each client perturbs the current weights. Noise is bounded by
    /// `max_delta` and damped for clients with more local samples.
    fn simulate_clients(
        &self,
        current: &ScoringParameters,
        client_count: usize,
        samples_per_client: u64,
        rng: &mut StdRng,
    ) -> Vec<FederatedUpdate> {
        let bound = self.config.max_delta.abs();
        let reference = self.config.reference_samples as f64;
        let weights = current.weights();

        (0..client_count)
            .map(|i| {
                let sample_count = if samples_per_client == 0 {
                    0
                } else {
                    let low = (samples_per_client / 2).max(1);
                    rng.gen_range(low..=samples_per_client + samples_per_client / 2)
                };
                let damping = if sample_count == 0 {
                    1.0
                } else {
                    (reference / sample_count as f64).sqrt().min(1.0)
                };

                let proposed = weights
                    .iter()
                    .map(|(rule, w)| {
                        let delta = if bound.is_finite() && bound > 0.0 {
                            rng.gen_range(-bound..=bound)
                        } else {
                            0.0
                        };
                        (rule.clone(), (w + delta * damping).clamp(0.0, 1.0))
                    })
                    .collect();

                FederatedUpdate {
                    client_id: self.client_name(i),
                    weights: proposed,
                    sample_count,
                }
            })
            .collect()
    }

    fn client_name(&self, index: usize) -> String {
        self.config
            .client_names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("client-{}", index + 1))
    }
}
