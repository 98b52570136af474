//! In-memory vector index over transaction embeddings

pub mod flat;
pub mod metric;
pub mod store;

pub use flat::{FlatIndex, SearchHit, VectorIndex};
pub use metric::DistanceMetric;
pub use store::{InMemorySessionStore, IndexEntry, SessionStore};
