//! Deterministic embedding of transactions into fixed-dimension vectors.
//!
//! Layout: `[numeric block (NUMERIC_FEATURES) | hashed text block (text_dimensions)]`.
//! The text block is the signed feature-hashing trick over CRC-32 token hashes,
//! L2-normalised. The numeric block is scaled by `numeric_weight` so the text
//! dominates cosine geometry. No state, no randomness: the same record always
//! maps to the same vector, across processes.

use crate::config::EmbeddingConfig;
use crate::error::{Result, ScreeningError};
use crate::types::transaction::Transaction;
use chrono::{DateTime, Timelike, Utc};
use std::f32::consts::TAU;

/// Size of the numeric block
pub const NUMERIC_FEATURES: usize = 6;

const COUNTERPARTY_WEIGHT: f32 = 0.5;

/// Maps transactions and free-text queries into vectors.
#[derive(Debug, Clone)]
pub struct EmbeddingGenerator {
    text_dimensions: usize,
    numeric_weight: f32,
    log_ceiling: f64,
    micro_amount: f64,
    large_amount: f64,
}

impl EmbeddingGenerator {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            text_dimensions: config.text_dimensions.max(1),
            numeric_weight: config.numeric_weight,
            log_ceiling: config.amount_ceiling.max(1.0).ln_1p(),
            micro_amount: config.micro_amount,
            large_amount: config.large_amount,
        }
    }

    /// Total vector length
    pub fn dimension(&self) -> usize {
        NUMERIC_FEATURES + self.text_dimensions
    }

    /// Encode a transaction record.
    ///
    /// Fails with `InvalidRecord` when the amount is not a finite non-negative
    /// number or the description is blank.
    pub fn encode(&self, tx: &Transaction) -> Result<Vec<f32>> {
        tx.validate()?;

        let mut vector = Vec::with_capacity(self.dimension());
        self.push_numeric(&mut vector, Some(tx.amount), Some(tx.timestamp));
        self.push_text(
            &mut vector,
            &[(&tx.description, 1.0), (&tx.counterparty, COUNTERPARTY_WEIGHT)],
        );
        Ok(vector)
    }

    /// Encode a search query: free text and an optional amount.
    ///
    /// Blank text is allowed and yields an empty text block; with no amount
    /// the result is the zero vector, which sits at maximal distance from
    /// every entry.
    pub fn encode_query(&self, text: &str, amount: Option<f64>) -> Result<Vec<f32>> {
        if let Some(amount) = amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(ScreeningError::invalid(format!(
                    "query amount must be a finite non-negative number, got {amount}"
                )));
            }
        }

        let mut vector = Vec::with_capacity(self.dimension());
        self.push_numeric(&mut vector, amount, None);
        self.push_text(&mut vector, &[(text, 1.0)]);
        Ok(vector)
    }

    /// Names of the numeric block features, in order
    pub fn numeric_feature_names(&self) -> [&'static str; NUMERIC_FEATURES] {
        [
            "amount_log_scaled",
            "micro_amount",
            "large_amount",
            "round_amount",
            "hour_sin",
            "hour_cos",
        ]
    }

    fn push_numeric(&self, out: &mut Vec<f32>, amount: Option<f64>, at: Option<DateTime<Utc>>) {
        let w = self.numeric_weight;

        match amount {
            Some(amount) => {
                let scaled = (amount.ln_1p() / self.log_ceiling).min(1.0) as f32;
                let micro = if amount < self.micro_amount { 1.0 } else { 0.0 };
                let large = if amount >= self.large_amount { 1.0 } else { 0.0 };
                let round = if amount >= 1.0 && amount.fract() == 0.0 { 1.0 } else { 0.0 };
                out.extend_from_slice(&[scaled * w, micro * w, large * w, round * w]);
            }
            None => out.extend_from_slice(&[0.0; 4]),
        }

        match at {
            Some(ts) => {
                let hour = ts.hour() as f32 + ts.minute() as f32 / 60.0;
                let angle = TAU * hour / 24.0;
                out.push(angle.sin() * w);
                out.push(angle.cos() * w);
            }
            None => out.extend_from_slice(&[0.0; 2]),
        }
    }

    fn push_text(&self, out: &mut Vec<f32>, fields: &[(&str, f32)]) {
        let mut block = vec![0.0_f32; self.text_dimensions];

        for (text, weight) in fields {
            for token in tokenize(text) {
                let hash = crc32fast::hash(token.as_bytes());
                let bucket = hash as usize % self.text_dimensions;
                let sign = if hash >> 31 == 0 { 1.0 } else { -1.0 };
                block[bucket] += sign * weight;
            }
        }

        let norm = block.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            block.iter_mut().for_each(|v| *v /= norm);
        }
        out.extend(block);
    }
}

/// Lower-cased alphanumeric tokens
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn generator() -> EmbeddingGenerator {
        EmbeddingGenerator::new(&EmbeddingConfig::default())
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (na * nb)
    }

    fn tx(description: &str, amount: f64) -> Transaction {
        Transaction::new("t", amount, description)
            .with_timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap())
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let gen = generator();
        let record = tx("Wire transfer international", 50000.0).with_counterparty("Offshore Ltd");

        let a = gen.encode(&record).unwrap();
        let b = gen.encode(&record).unwrap();
        let c = generator().encode(&record.clone()).unwrap();

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), gen.dimension());
        assert_eq!(gen.dimension(), 70);
    }

    #[test]
    fn test_numeric_block() {
        let gen = generator();
        let v = gen.encode(&tx("Card verification attempt", 0.5)).unwrap();
        assert_eq!(v[1], 0.5); // micro flag scaled by numeric_weight
        assert_eq!(v[2], 0.0);
        assert_eq!(v[3], 0.0);

        let v = gen.encode(&tx("Suspicious ATM withdrawal", 3000.0)).unwrap();
        assert_eq!(v[1], 0.0);
        assert_eq!(v[3], 0.5); // round amount

        let v = gen.encode(&tx("Offshore transfer", 1_000_000.0)).unwrap();
        assert_eq!(v[0], 0.5); // capped at the ceiling
        assert_eq!(v[2], 0.5);
    }

    #[test]
    fn test_text_similarity_geometry() {
        let gen = generator();
        let a = gen.encode(&tx("Coffee at Starbucks", 4.5)).unwrap();
        let b = gen.encode(&tx("coffee at starbucks!", 4.5)).unwrap();
        let c = gen.encode(&tx("Suspicious offshore transfer", 9500.0)).unwrap();

        assert!((cosine(&a, &b) - 1.0).abs() < 1e-5);
        assert!(cosine(&a, &c) < cosine(&a, &b));
    }

    #[test]
    fn test_invalid_records_rejected() {
        let gen = generator();
        assert!(matches!(
            gen.encode(&tx("", 10.0)),
            Err(ScreeningError::InvalidRecord(_))
        ));
        assert!(matches!(
            gen.encode(&tx("Rent payment", f64::INFINITY)),
            Err(ScreeningError::InvalidRecord(_))
        ));
        assert!(matches!(
            gen.encode_query("rent", Some(f64::NAN)),
            Err(ScreeningError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_empty_query_is_zero_vector() {
        let gen = generator();
        let v = gen.encode_query("  ", None).unwrap();
        assert_eq!(v.len(), gen.dimension());
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_tokenize() {
        let tokens: Vec<String> = tokenize("Online shopping, Amazon!").collect();
        assert_eq!(tokens, vec!["online", "shopping", "amazon"]);
    }
}
