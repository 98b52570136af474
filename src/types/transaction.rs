//! Transaction records, their indexed metadata and search filters

use crate::error::{Result, ScreeningError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_bank() -> String {
    "Bank A".to_string()
}

/// A financial transaction submitted for screening.
///
/// Records are immutable once ingested; the only lifecycle change is an
/// explicit delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier. Left empty, the engine assigns one on ingest.
    #[serde(default, alias = "id")]
    pub transaction_id: String,

    /// Transaction amount in the account currency
    pub amount: f64,

    /// Free-text description (merchant line, transfer memo, ...)
    pub description: String,

    /// Originating institution
    #[serde(default = "default_bank")]
    pub bank: String,

    /// Account the transaction was made from
    #[serde(default, alias = "user_id")]
    pub account_id: String,

    /// Receiving party
    #[serde(default)]
    pub counterparty: String,

    /// Origin channel (card, wire, atm, online, ...)
    #[serde(default)]
    pub channel: String,

    /// Known fraud label. Labelled records are indexed as known threats.
    #[serde(default)]
    pub is_fraud: bool,

    /// Event time
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Create a transaction with the required fields
    pub fn new(transaction_id: impl Into<String>, amount: f64, description: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            amount,
            description: description.into(),
            bank: default_bank(),
            account_id: String::new(),
            counterparty: String::new(),
            channel: String::new(),
            is_fraud: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_bank(mut self, bank: impl Into<String>) -> Self {
        self.bank = bank.into();
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = counterparty.into();
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Mark the record as a confirmed fraud case
    pub fn flagged(mut self) -> Self {
        self.is_fraud = true;
        self
    }

    /// Check the minimum-field constraints required for encoding.
    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_finite() {
            return Err(ScreeningError::invalid(format!(
                "amount must be a finite number, got {}",
                self.amount
            )));
        }
        if self.amount < 0.0 {
            return Err(ScreeningError::invalid(format!(
                "amount must not be negative, got {}",
                self.amount
            )));
        }
        if self.description.trim().is_empty() {
            return Err(ScreeningError::invalid("description must not be empty"));
        }
        Ok(())
    }

    /// Index partition this record belongs to
    pub fn index_source(&self) -> IndexSource {
        if self.is_fraud {
            IndexSource::KnownThreats
        } else {
            IndexSource::SecureHistory
        }
    }
}

/// Partition of the index an entry was filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSource {
    SecureHistory,
    KnownThreats,
}

/// Metadata stored alongside each vector and returned by search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub transaction_id: String,
    pub description: String,
    pub amount: f64,
    pub bank: String,
    pub account_id: String,
    pub counterparty: String,
    pub channel: String,
    pub timestamp: DateTime<Utc>,
    pub index_source: IndexSource,
    pub flagged: bool,
}

impl From<&Transaction> for RecordMetadata {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.transaction_id.clone(),
            description: tx.description.clone(),
            amount: tx.amount,
            bank: tx.bank.clone(),
            account_id: tx.account_id.clone(),
            counterparty: tx.counterparty.clone(),
            channel: tx.channel.clone(),
            timestamp: tx.timestamp,
            index_source: tx.index_source(),
            flagged: tx.is_fraud,
        }
    }
}

/// Metadata predicate applied before distance ranking.
///
/// Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(default)]
    pub bank: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub min_amount: Option<f64>,
    #[serde(default)]
    pub index_source: Option<IndexSource>,
    #[serde(default)]
    pub flagged: Option<bool>,
    #[serde(default)]
    pub exclude_id: Option<String>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bank(mut self, bank: impl Into<String>) -> Self {
        self.bank = Some(bank.into());
        self
    }

    pub fn account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn min_amount(mut self, amount: f64) -> Self {
        self.min_amount = Some(amount);
        self
    }

    pub fn source(mut self, source: IndexSource) -> Self {
        self.index_source = Some(source);
        self
    }

    pub fn flagged(mut self, flagged: bool) -> Self {
        self.flagged = Some(flagged);
        self
    }

    pub fn excluding(mut self, id: impl Into<String>) -> Self {
        self.exclude_id = Some(id.into());
        self
    }

    /// Whether an entry's metadata passes every set constraint
    pub fn matches(&self, meta: &RecordMetadata) -> bool {
        if let Some(bank) = &self.bank {
            if &meta.bank != bank {
                return false;
            }
        }
        if let Some(account) = &self.account_id {
            if &meta.account_id != account {
                return false;
            }
        }
        if let Some(min) = self.min_amount {
            if meta.amount < min {
                return false;
            }
        }
        if let Some(source) = self.index_source {
            if meta.index_source != source {
                return false;
            }
        }
        if let Some(flagged) = self.flagged {
            if meta.flagged != flagged {
                return false;
            }
        }
        if let Some(excluded) = &self.exclude_id {
            if &meta.transaction_id == excluded {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_deserialization_defaults() {
        let json = r#"{"amount": 87.32, "description": "Grocery shopping at Walmart", "user_id": "Alice"}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();

        assert!(tx.transaction_id.is_empty());
        assert_eq!(tx.bank, "Bank A");
        assert_eq!(tx.account_id, "Alice");
        assert!(!tx.is_fraud);
        assert_eq!(tx.index_source(), IndexSource::SecureHistory);
    }

    #[test]
    fn test_validate_rejects_malformed_records() {
        assert!(Transaction::new("t1", 10.0, "Coffee").validate().is_ok());

        let err = Transaction::new("t1", f64::NAN, "Coffee").validate().unwrap_err();
        assert!(matches!(err, ScreeningError::InvalidRecord(_)));

        let err = Transaction::new("t1", -3.0, "Coffee").validate().unwrap_err();
        assert!(matches!(err, ScreeningError::InvalidRecord(_)));

        let err = Transaction::new("t1", 10.0, "   ").validate().unwrap_err();
        assert!(matches!(err, ScreeningError::InvalidRecord(_)));
    }

    #[test]
    fn test_filter_matching() {
        let tx = Transaction::new("t1", 9500.0, "Suspicious offshore transfer")
            .with_bank("Bank B")
            .with_account("system")
            .flagged();
        let meta = RecordMetadata::from(&tx);

        assert!(SearchFilter::new().matches(&meta));
        assert!(SearchFilter::new().bank("Bank B").min_amount(5000.0).matches(&meta));
        assert!(SearchFilter::new().source(IndexSource::KnownThreats).matches(&meta));
        assert!(!SearchFilter::new().bank("Bank A").matches(&meta));
        assert!(!SearchFilter::new().flagged(false).matches(&meta));
        assert!(!SearchFilter::new().excluding("t1").matches(&meta));
        assert!(!SearchFilter::new().min_amount(10000.0).matches(&meta));
    }
}
