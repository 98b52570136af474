//! Type definitions for the screening core

pub mod threat;
pub mod transaction;

pub use threat::{ContributingFactor, ThreatLevel, ThreatScoreResult, ThreatThresholds};
pub use transaction::{IndexSource, RecordMetadata, SearchFilter, Transaction};
