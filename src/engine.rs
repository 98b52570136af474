//! Screening engine: the operations the service layer calls into.
//!
//! Owns the embedding generator, the vector index and the live scoring
//! parameters. The index and the parameters each sit behind their own
//! shared-read / exclusive-write lock; encoding happens outside any lock.

use crate::config::AppConfig;
use crate::embedding::EmbeddingGenerator;
use crate::error::{Result, ScreeningError};
use crate::index::{DistanceMetric, FlatIndex, SearchHit, VectorIndex};
use crate::scoring::federated::{FederatedAggregator, RoundOutcome};
use crate::scoring::params::{ParameterHandle, ScoringParameters};
use crate::scoring::scorer::ThreatScorer;
use crate::types::threat::ThreatScoreResult;
use crate::types::transaction::{SearchFilter, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Similarity cut-off for broadcasts when no similar-to-flagged rule is configured
const DEFAULT_BROADCAST_SIMILARITY: f64 = 0.6;

/// Free-text search request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default)]
    pub amount: Option<f64>,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            amount: None,
        }
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Index and parameter overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub entry_count: usize,
    pub index_dimension: usize,
    pub metric: DistanceMetric,
    pub threats: usize,
    pub legitimate: usize,
    pub by_bank: BTreeMap<String, usize>,
    pub scoring_parameters: ScoringParameters,
}

/// How far a threat pattern reaches into other banks' history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub source_bank: String,
    pub threat_pattern: String,
    /// Matching entries per receiving bank
    pub impact: BTreeMap<String, usize>,
    pub total_protected: usize,
}

pub struct ScreeningEngine {
    embedder: EmbeddingGenerator,
    index: RwLock<Box<dyn VectorIndex>>,
    params: ParameterHandle,
    scorer: ThreatScorer,
    aggregator: FederatedAggregator,
    default_clients: usize,
    default_samples: u64,
}

impl ScreeningEngine {
    /// Engine over an empty in-memory flat index
    pub fn new(config: &AppConfig) -> Self {
        let index = FlatIndex::new(
            config.embedding_dimension(),
            config.index.metric,
            config.index.duplicate_policy,
        );
        Self::assemble(config, Box::new(index))
    }

    /// Engine over a caller-provided index, which must match the configured
    /// embedding dimension
    pub fn with_index(config: &AppConfig, index: Box<dyn VectorIndex>) -> Result<Self> {
        let expected = config.embedding_dimension();
        if index.dimension() != expected {
            return Err(ScreeningError::DimensionMismatch {
                expected,
                actual: index.dimension(),
            });
        }
        Ok(Self::assemble(config, index))
    }

    fn assemble(config: &AppConfig, index: Box<dyn VectorIndex>) -> Self {
        let metric = index.metric();
        Self {
            embedder: EmbeddingGenerator::new(&config.embedding),
            index: RwLock::new(index),
            params: ParameterHandle::new(ScoringParameters::from_config(&config.scoring)),
            scorer: ThreatScorer::new(metric),
            aggregator: FederatedAggregator::new(config.federated.clone()),
            default_clients: config.federated.clients,
            default_samples: config.federated.samples_per_client,
        }
    }

    fn read_index(&self) -> RwLockReadGuard<'_, Box<dyn VectorIndex>> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, Box<dyn VectorIndex>> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh system-assigned transaction id
    pub fn new_id(&self) -> String {
        format!("txn_{}", uuid::Uuid::new_v4().simple())
    }

    /// Encode and index a transaction. Returns the id it was stored under,
    /// assigning one when the record has none.
    pub fn ingest(&self, mut record: Transaction) -> Result<String> {
        if record.transaction_id.trim().is_empty() {
            record.transaction_id = self.new_id();
        }
        let vector = self.embedder.encode(&record)?;
        let id = record.transaction_id.clone();

        self.write_index().insert(&id, vector, record)?;
        debug!(transaction_id = %id, "Transaction ingested");
        Ok(id)
    }

    /// Ingest many records, stopping at the first failure. Records before the
    /// failing one stay indexed.
    pub fn seed<I>(&self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = Transaction>,
    {
        let mut count = 0;
        for record in records {
            self.ingest(record)?;
            count += 1;
        }
        info!(count = count, "Index seeded");
        Ok(count)
    }

    /// k nearest indexed transactions to a free-text query
    pub fn search(
        &self,
        query: &SearchQuery,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>> {
        let vector = self.embedder.encode_query(&query.text, query.amount)?;
        self.read_index().search(&vector, k, filter)
    }

    /// Score a transaction against the live parameters without indexing it
    pub fn score(&self, record: &Transaction) -> Result<ThreatScoreResult> {
        let params = self.params.snapshot();
        self.score_with(&params, record)
    }

    /// Score against an explicit parameter set
    pub fn score_with(
        &self,
        params: &ScoringParameters,
        record: &Transaction,
    ) -> Result<ThreatScoreResult> {
        let vector = self.embedder.encode(record)?;

        let mut exclude = SearchFilter::new();
        if !record.transaction_id.is_empty() {
            exclude = exclude.excluding(record.transaction_id.clone());
        }

        let (neighbors, history) = {
            let index = self.read_index();
            let neighbors = index.search(&vector, params.neighbors, Some(&exclude))?;
            let history = if record.account_id.is_empty() {
                Vec::new()
            } else {
                index.entries(&exclude.clone().account(record.account_id.clone()))
            };
            (neighbors, history)
        };

        Ok(self.scorer.score(params, record, &neighbors, &history))
    }

    /// Score a transaction, then index it. Assigns an id when missing.
    pub fn screen(&self, mut record: Transaction) -> Result<ThreatScoreResult> {
        if record.transaction_id.trim().is_empty() {
            record.transaction_id = self.new_id();
        }
        let result = self.score(&record)?;
        self.ingest(record)?;
        Ok(result)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.write_index().delete(id)?;
        debug!(transaction_id = %id, "Transaction deleted");
        Ok(())
    }

    /// Run one simulated federated round and publish the merged weights
    pub fn federated_round(&self, client_count: usize, samples_per_client: u64) -> Result<RoundOutcome> {
        self.aggregator
            .run_round(&self.params, client_count, samples_per_client)
    }

    /// Federated round with the configured client and sample counts
    pub fn default_federated_round(&self) -> Result<RoundOutcome> {
        self.federated_round(self.default_clients, self.default_samples)
    }

    /// Count, per other bank, the indexed transactions similar to a threat
    /// pattern reported by `source_bank`
    pub fn broadcast(&self, source_bank: &str, description: &str) -> Result<BroadcastReport> {
        if description.trim().is_empty() {
            return Err(ScreeningError::invalid("threat description must not be empty"));
        }
        let threshold = self
            .params
            .snapshot()
            .similarity_threshold()
            .unwrap_or(DEFAULT_BROADCAST_SIMILARITY);
        let vector = self.embedder.encode_query(description, None)?;

        let index = self.read_index();
        let metric = index.metric();
        let mut impact: BTreeMap<String, usize> = index
            .entries(&SearchFilter::new())
            .into_iter()
            .filter(|m| m.bank != source_bank)
            .map(|m| (m.bank, 0))
            .collect();

        for hit in index.search(&vector, index.len(), None)? {
            if hit.metadata.bank == source_bank || metric.similarity(hit.distance) < threshold {
                continue;
            }
            *impact.entry(hit.metadata.bank).or_insert(0) += 1;
        }
        drop(index);

        let total_protected = impact.values().sum();
        info!(
            source_bank = %source_bank,
            total_protected = total_protected,
            "Threat pattern broadcast"
        );

        Ok(BroadcastReport {
            source_bank: source_bank.to_string(),
            threat_pattern: description.to_string(),
            impact,
            total_protected,
        })
    }

    pub fn stats(&self) -> EngineStats {
        let scoring_parameters = (*self.params.snapshot()).clone();
        let index = self.read_index();
        let entries = index.entries(&SearchFilter::new());

        let threats = entries.iter().filter(|m| m.flagged).count();
        let mut by_bank = BTreeMap::new();
        for meta in &entries {
            *by_bank.entry(meta.bank.clone()).or_insert(0) += 1;
        }

        EngineStats {
            entry_count: index.len(),
            index_dimension: index.dimension(),
            metric: index.metric(),
            threats,
            legitimate: entries.len() - threats,
            by_bank,
            scoring_parameters,
        }
    }

    /// Current parameter snapshot
    pub fn parameters(&self) -> Arc<ScoringParameters> {
        self.params.snapshot()
    }

    pub fn embedder(&self) -> &EmbeddingGenerator {
        &self.embedder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicatePolicy;
    use crate::demo::DemoGenerator;
    use crate::types::threat::ThreatLevel;
    use crate::types::transaction::IndexSource;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashMap;

    fn engine() -> ScreeningEngine {
        ScreeningEngine::new(&AppConfig::default())
    }

    fn seeded_engine() -> ScreeningEngine {
        let engine = engine();
        let anchor = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        engine
            .seed(DemoGenerator::seeded(42, anchor).dataset(200))
            .unwrap();
        engine
    }

    #[test]
    fn test_ingest_assigns_id_and_rejects_duplicates() {
        let engine = engine();

        let id = engine
            .ingest(Transaction::new("", 87.32, "Grocery shopping at Walmart"))
            .unwrap();
        assert!(id.starts_with("txn_"));

        engine.ingest(Transaction::new("t1", 45.0, "Gas station fill-up")).unwrap();
        let err = engine
            .ingest(Transaction::new("t1", 46.0, "Gas station fill-up"))
            .unwrap_err();
        assert_eq!(err, ScreeningError::DuplicateId("t1".to_string()));
        assert_eq!(engine.stats().entry_count, 2);
    }

    #[test]
    fn test_invalid_record_leaves_index_unchanged() {
        let engine = engine();
        let err = engine.ingest(Transaction::new("bad", f64::NAN, "Rent payment")).unwrap_err();
        assert!(matches!(err, ScreeningError::InvalidRecord(_)));
        assert_eq!(engine.stats().entry_count, 0);
    }

    #[test]
    fn test_search_finds_similar_descriptions() {
        let engine = engine();
        engine.ingest(Transaction::new("coffee", 4.5, "Coffee at Starbucks")).unwrap();
        engine.ingest(Transaction::new("rent", 1500.0, "Rent payment")).unwrap();
        engine
            .ingest(Transaction::new("wire", 9500.0, "Suspicious offshore transfer").with_bank("Bank B"))
            .unwrap();

        let hits = engine.search(&SearchQuery::text("offshore transfer"), 3, None).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "wire");

        let filter = SearchFilter::new().bank("Bank A");
        let hits = engine
            .search(&SearchQuery::text("offshore transfer"), 3, Some(&filter))
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.metadata.bank == "Bank A"));
    }

    #[test]
    fn test_search_empty_index() {
        let hits = engine().search(&SearchQuery::text("anything"), 10, None).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_delete() {
        let engine = engine();
        engine.ingest(Transaction::new("t1", 9.99, "Spotify premium")).unwrap();
        engine.delete("t1").unwrap();
        assert_eq!(
            engine.delete("t1").unwrap_err(),
            ScreeningError::NotFound("t1".to_string())
        );
        assert_eq!(engine.stats().entry_count, 0);
    }

    #[test]
    fn test_high_value_wire_near_known_threats() {
        let engine = seeded_engine();
        for (id, amount, description) in [
            ("flag_1", 45000.0, "wire transfer international"),
            ("flag_2", 48000.0, "international wire transfer urgent"),
            ("flag_3", 60000.0, "wire transfer international offshore"),
        ] {
            engine
                .ingest(Transaction::new(id, amount, description).with_channel("wire").flagged())
                .unwrap();
        }

        let candidate = Transaction::new("", 50000.0, "wire transfer international");
        let result = engine.score(&candidate).unwrap();

        assert!(matches!(result.level, ThreatLevel::High | ThreatLevel::Critical));
        assert!(result.fired_rules().contains(&"large_amount"));
        assert!(result.fired_rules().contains(&"similar_to_flagged"));
        assert!((result.score - result.raw_score().clamp(0.0, 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_score_excludes_the_candidate_itself() {
        let engine = engine();
        let tx = Transaction::new("self", 9500.0, "Suspicious offshore transfer").flagged();
        engine.ingest(tx.clone()).unwrap();

        let result = engine.score(&tx).unwrap();
        assert!(!result.fired_rules().contains(&"similar_to_flagged"));
    }

    #[test]
    fn test_velocity_through_engine() {
        let engine = engine();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        for i in 0..5 {
            engine
                .ingest(
                    Transaction::new(format!("b{i}"), 20.0, "Coffee at Starbucks")
                        .with_account("Bob")
                        .with_timestamp(now - Duration::minutes(i * 10)),
                )
                .unwrap();
        }

        let next = Transaction::new("b5", 20.0, "Coffee at Starbucks")
            .with_account("Bob")
            .with_timestamp(now + Duration::minutes(1));
        assert!(engine.score(&next).unwrap().fired_rules().contains(&"velocity"));

        let other = next.clone().with_account("Alice");
        assert!(!engine.score(&other).unwrap().fired_rules().contains(&"velocity"));
    }

    #[test]
    fn test_screen_scores_then_indexes() {
        let engine = engine();
        let result = engine.screen(Transaction::new("", 2.99, "Multiple small charges")).unwrap();
        assert!(result.transaction_id.starts_with("txn_"));
        assert!(result.fired_rules().contains(&"micro_amount"));
        assert_eq!(engine.stats().entry_count, 1);
    }

    #[test]
    fn test_stats() {
        let engine = seeded_engine();
        let stats = engine.stats();

        assert_eq!(stats.entry_count, 200);
        assert_eq!(stats.index_dimension, 70);
        assert_eq!(stats.threats, 30);
        assert_eq!(stats.legitimate, 170);
        assert_eq!(stats.by_bank.values().sum::<usize>(), 200);
        assert_eq!(stats.scoring_parameters.version, 0);

        let known = engine
            .search(
                &SearchQuery::text(""),
                500,
                Some(&SearchFilter::new().source(IndexSource::KnownThreats)),
            )
            .unwrap();
        assert_eq!(known.len(), 30);
    }

    #[test]
    fn test_broadcast_excludes_source_bank() {
        let engine = engine();
        engine
            .ingest(Transaction::new("a1", 9500.0, "Suspicious offshore transfer").with_bank("Bank A"))
            .unwrap();
        engine
            .ingest(Transaction::new("b1", 9400.0, "suspicious offshore transfer").with_bank("Bank B"))
            .unwrap();
        engine
            .ingest(Transaction::new("b2", 4.5, "Coffee at Starbucks").with_bank("Bank B"))
            .unwrap();
        engine
            .ingest(Transaction::new("c1", 9000.0, "Offshore transfer, suspicious").with_bank("Bank C"))
            .unwrap();

        let report = engine
            .broadcast("Bank A", "Suspicious offshore transfer")
            .unwrap();

        assert!(!report.impact.contains_key("Bank A"));
        assert_eq!(report.impact["Bank B"], 1);
        assert_eq!(report.impact["Bank C"], 1);
        assert_eq!(report.total_protected, 2);
        assert!(engine.broadcast("Bank A", " ").is_err());
    }

    #[test]
    fn test_federated_round_updates_scoring() {
        let engine = seeded_engine();
        let outcome = engine.federated_round(3, 100).unwrap();
        assert_eq!(engine.parameters().version, 1);
        assert_eq!(engine.stats().scoring_parameters, outcome.parameters);

        assert!(matches!(
            engine.federated_round(3, 0),
            Err(ScreeningError::EmptyRound { .. })
        ));
        assert_eq!(engine.parameters().version, 1);
    }

    #[test]
    fn test_scoring_sees_whole_parameter_sets_during_rounds() {
        let engine = seeded_engine();
        let candidate = Transaction::new("", 7800.0, "Unusual foreign transaction");

        let mut versions: HashMap<u64, ScoringParameters> = HashMap::new();
        versions.insert(0, (*engine.parameters()).clone());

        let (shared, candidate_ref) = (&engine, &candidate);
        let results: Vec<ThreatScoreResult> = std::thread::scope(|s| {
            let scorers: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(move || {
                        (0..50)
                            .map(|_| shared.score(candidate_ref).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            for _ in 0..10 {
                let outcome = engine.federated_round(3, 100).unwrap();
                versions.insert(outcome.parameters.version, outcome.parameters);
            }

            scorers
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(results.len(), 200);
        for result in &results {
            let params = &versions[&result.parameters_version];
            let expected = engine.score_with(params, &candidate).unwrap();
            assert_eq!(result, &expected);
        }
    }

    #[test]
    fn test_scoring_on_euclidean_index() {
        let mut config = AppConfig::default();
        config.index.metric = DistanceMetric::Euclidean;
        let engine = ScreeningEngine::new(&config);
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();

        engine
            .ingest(
                Transaction::new("known", 9500.0, "Suspicious offshore transfer")
                    .with_timestamp(at)
                    .flagged(),
            )
            .unwrap();

        // identical vector: distance 0, similarity 1 / (1 + 0)
        let twin = Transaction::new("twin", 9500.0, "Suspicious offshore transfer").with_timestamp(at);
        let result = engine.score(&twin).unwrap();
        let similar = result
            .factors
            .iter()
            .find(|f| f.rule == "similar_to_flagged")
            .unwrap();
        assert!((similar.contribution - 0.45).abs() < 1e-9);
        // 0.45 + 0.30 (large amount) + 0.20 (keyword)
        assert!((result.score - 0.95).abs() < 1e-9);
        assert_eq!(result.level, ThreatLevel::Critical);

        let unrelated = Transaction::new("coffee", 4.5, "Coffee at Starbucks").with_timestamp(at);
        let result = engine.score(&unrelated).unwrap();
        assert!(!result.fired_rules().contains(&"similar_to_flagged"));
    }

    #[test]
    fn test_custom_index_must_match_dimension() {
        let config = AppConfig::default();
        let index = FlatIndex::new(8, DistanceMetric::Cosine, DuplicatePolicy::Reject);
        assert!(matches!(
            ScreeningEngine::with_index(&config, Box::new(index)),
            Err(ScreeningError::DimensionMismatch { expected: 70, actual: 8 })
        ));

        let index = FlatIndex::new(70, DistanceMetric::Euclidean, DuplicatePolicy::Overwrite);
        let engine = ScreeningEngine::with_index(&config, Box::new(index)).unwrap();
        engine.ingest(Transaction::new("t1", 10.0, "Movie tickets")).unwrap();
        engine.ingest(Transaction::new("t1", 12.0, "Movie tickets")).unwrap();
        assert_eq!(engine.stats().entry_count, 1);
        assert_eq!(engine.stats().metric, DistanceMetric::Euclidean);
    }
}
