//! Brute-force nearest-neighbour index.

use super::metric::DistanceMetric;
use super::store::{InMemorySessionStore, IndexEntry, SessionStore};
use crate::config::DuplicatePolicy;
use crate::error::{Result, ScreeningError};
use crate::types::transaction::{RecordMetadata, SearchFilter, Transaction};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// A search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub distance: f64,
    pub metadata: RecordMetadata,
}

/// k-NN contract shared by every index implementation.
///
/// `search` returns at most `k` hits in non-decreasing distance order, ties
/// broken by insertion order. Filters are applied before ranking. A failed
/// `insert` or `delete` leaves the index unchanged.
pub trait VectorIndex: Send + Sync {
    fn insert(&mut self, id: &str, vector: Vec<f32>, record: Transaction) -> Result<()>;

    fn delete(&mut self, id: &str) -> Result<IndexEntry>;

    fn get(&self, id: &str) -> Option<&IndexEntry>;

    fn search(&self, query: &[f32], k: usize, filter: Option<&SearchFilter>)
        -> Result<Vec<SearchHit>>;

    /// Metadata of every entry passing `filter`, in insertion order
    fn entries(&self, filter: &SearchFilter) -> Vec<RecordMetadata>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> usize;

    fn metric(&self) -> DistanceMetric;
}

/// Linear-scan index over a [`SessionStore`]. O(n·d) per query.
pub struct FlatIndex<S = InMemorySessionStore> {
    store: S,
    dimension: usize,
    metric: DistanceMetric,
    duplicate_policy: DuplicatePolicy,
    next_sequence: u64,
}

impl FlatIndex<InMemorySessionStore> {
    pub fn new(dimension: usize, metric: DistanceMetric, duplicate_policy: DuplicatePolicy) -> Self {
        Self::with_store(InMemorySessionStore::new(), dimension, metric, duplicate_policy)
    }
}

impl<S: SessionStore> FlatIndex<S> {
    pub fn with_store(
        store: S,
        dimension: usize,
        metric: DistanceMetric,
        duplicate_policy: DuplicatePolicy,
    ) -> Self {
        let next_sequence = store.scan().map(|e| e.sequence + 1).max().unwrap_or(0);
        Self {
            store,
            dimension,
            metric,
            duplicate_policy,
            next_sequence,
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(ScreeningError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl<S: SessionStore> VectorIndex for FlatIndex<S> {
    fn insert(&mut self, id: &str, vector: Vec<f32>, mut record: Transaction) -> Result<()> {
        if id.trim().is_empty() {
            return Err(ScreeningError::invalid("transaction id must not be blank"));
        }
        self.check_dimension(&vector)?;
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(ScreeningError::invalid("vector contains non-finite values"));
        }
        if self.duplicate_policy == DuplicatePolicy::Reject && self.store.contains(id) {
            return Err(ScreeningError::DuplicateId(id.to_string()));
        }

        record.transaction_id = id.to_string();
        let entry = IndexEntry {
            id: id.to_string(),
            vector,
            metadata: RecordMetadata::from(&record),
            record,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        if self.store.insert(entry).is_some() {
            debug!(transaction_id = %id, "Overwrote existing index entry");
        }
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<IndexEntry> {
        self.store
            .remove(id)
            .ok_or_else(|| ScreeningError::NotFound(id.to_string()))
    }

    fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.store.get(id)
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>> {
        self.check_dimension(query)?;
        if k == 0 || self.store.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<(f64, &IndexEntry)> = self
            .store
            .scan()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.metadata)))
            .map(|e| (self.metric.distance(query, &e.vector), e))
            .collect();

        candidates.sort_by(|(da, a), (db, b)| {
            da.total_cmp(db)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        candidates.truncate(k);

        Ok(candidates
            .into_iter()
            .map(|(distance, e)| SearchHit {
                id: e.id.clone(),
                distance,
                metadata: e.metadata.clone(),
            })
            .collect())
    }

    fn entries(&self, filter: &SearchFilter) -> Vec<RecordMetadata> {
        let mut matching: Vec<&IndexEntry> = self
            .store
            .scan()
            .filter(|e| filter.matches(&e.metadata))
            .collect();
        matching.sort_by(|a, b| match a.sequence.cmp(&b.sequence) {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        });
        matching.into_iter().map(|e| e.metadata.clone()).collect()
    }

    fn len(&self) -> usize {
        self.store.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}
