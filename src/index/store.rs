//! Session store: the id -> (record, vector, metadata) map the index runs over.
//!
//! Contents live for the process lifetime only. Anything durable would plug in
//! behind [`SessionStore`] without touching the index or scorer.

use crate::types::transaction::{RecordMetadata, Transaction};
use std::collections::HashMap;

/// One indexed transaction
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
    pub record: Transaction,
    /// Insertion order, used to break distance ties
    pub sequence: u64,
}

/// Storage interface behind the vector index
pub trait SessionStore: Send + Sync {
    /// Store an entry, returning the one it replaced
    fn insert(&mut self, entry: IndexEntry) -> Option<IndexEntry>;

    fn get(&self, id: &str) -> Option<&IndexEntry>;

    /// Remove an entry, returning it if it existed
    fn remove(&mut self, id: &str) -> Option<IndexEntry>;

    /// Iterate every entry, in no particular order
    fn scan(&self) -> Box<dyn Iterator<Item = &IndexEntry> + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }
}

/// Hash-map backed store, recreated empty on every start
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: HashMap<String, IndexEntry>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn insert(&mut self, entry: IndexEntry) -> Option<IndexEntry> {
        self.entries.insert(entry.id.clone(), entry)
    }

    fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    fn remove(&mut self, id: &str) -> Option<IndexEntry> {
        self.entries.remove(id)
    }

    fn scan(&self) -> Box<dyn Iterator<Item = &IndexEntry> + '_> {
        Box::new(self.entries.values())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
