//! Heuristic rules and their dispatcher.
//!
//! Rules are a closed set: adding a heuristic means adding a variant here and
//! an arm in [`evaluate`].

use crate::index::{DistanceMetric, SearchHit};
use crate::types::threat::ContributingFactor;
use crate::types::transaction::{RecordMetadata, Transaction};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// A weighted scoring rule with its thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    /// Nearest flagged neighbour is at least `min_similarity` similar.
    /// Contributes `weight * similarity`.
    SimilarToFlagged { weight: f64, min_similarity: f64 },
    /// Amount at or above `threshold`
    LargeAmount { weight: f64, threshold: f64 },
    /// Amount below `threshold` (card testing)
    MicroAmount { weight: f64, threshold: f64 },
    /// At least `max_count` same-account transactions in the `window_secs`
    /// before the candidate
    Velocity {
        weight: f64,
        window_secs: i64,
        max_count: usize,
    },
    /// Description contains any of `keywords` (case-insensitive substring)
    SuspiciousKeyword { weight: f64, keywords: Vec<String> },
}

impl Rule {
    /// Stable name used in factors and federated weight maps
    pub fn name(&self) -> &'static str {
        match self {
            Rule::SimilarToFlagged { .. } => "similar_to_flagged",
            Rule::LargeAmount { .. } => "large_amount",
            Rule::MicroAmount { .. } => "micro_amount",
            Rule::Velocity { .. } => "velocity",
            Rule::SuspiciousKeyword { .. } => "suspicious_keyword",
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            Rule::SimilarToFlagged { weight, .. }
            | Rule::LargeAmount { weight, .. }
            | Rule::MicroAmount { weight, .. }
            | Rule::Velocity { weight, .. }
            | Rule::SuspiciousKeyword { weight, .. } => *weight,
        }
    }

    pub fn set_weight(&mut self, value: f64) {
        match self {
            Rule::SimilarToFlagged { weight, .. }
            | Rule::LargeAmount { weight, .. }
            | Rule::MicroAmount { weight, .. }
            | Rule::Velocity { weight, .. }
            | Rule::SuspiciousKeyword { weight, .. } => *weight = value,
        }
    }
}

/// Rule set used when nothing is configured
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::SimilarToFlagged {
            weight: 0.45,
            min_similarity: 0.6,
        },
        Rule::LargeAmount {
            weight: 0.30,
            threshold: 5000.0,
        },
        Rule::MicroAmount {
            weight: 0.25,
            threshold: 5.0,
        },
        Rule::Velocity {
            weight: 0.20,
            window_secs: 3600,
            max_count: 5,
        },
        Rule::SuspiciousKeyword {
            weight: 0.20,
            keywords: ["unauthorized", "stolen", "fraud", "test", "verify", "offshore"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        },
    ]
}

/// Everything a rule may look at for one candidate
pub struct RuleContext<'a> {
    pub record: &'a Transaction,
    /// Nearest indexed neighbours, closest first
    pub neighbors: &'a [SearchHit],
    pub metric: DistanceMetric,
    /// Other indexed transactions from the candidate's account
    pub account_history: &'a [RecordMetadata],
}

/// Evaluate one rule. Returns the factor when it fires.
pub fn evaluate(rule: &Rule, ctx: &RuleContext<'_>) -> Option<ContributingFactor> {
    let (strength, detail) = match rule {
        Rule::SimilarToFlagged { min_similarity, .. } => {
            let (hit, similarity) = ctx
                .neighbors
                .iter()
                .filter(|h| h.metadata.flagged)
                .map(|h| (h, ctx.metric.similarity(h.distance)))
                .fold(None::<(&SearchHit, f64)>, |best, (h, s)| match best {
                    Some((_, bs)) if bs >= s => best,
                    _ => Some((h, s)),
                })?;
            if similarity < *min_similarity {
                return None;
            }
            (
                similarity,
                format!("similarity {:.2} to known threat {}", similarity, hit.id),
            )
        }
        Rule::LargeAmount { threshold, .. } => {
            if ctx.record.amount < *threshold {
                return None;
            }
            (
                1.0,
                format!("amount {:.2} >= {:.2}", ctx.record.amount, threshold),
            )
        }
        Rule::MicroAmount { threshold, .. } => {
            if ctx.record.amount >= *threshold {
                return None;
            }
            (
                1.0,
                format!("amount {:.2} < {:.2}", ctx.record.amount, threshold),
            )
        }
        Rule::Velocity {
            window_secs,
            max_count,
            ..
        } => {
            if ctx.record.account_id.is_empty() {
                return None;
            }
            let end = ctx.record.timestamp;
            let start = end - Duration::seconds(*window_secs);
            let recent = ctx
                .account_history
                .iter()
                .filter(|m| m.timestamp >= start && m.timestamp <= end)
                .count();
            if recent < *max_count {
                return None;
            }
            (
                1.0,
                format!(
                    "{} transactions from {} in the last {}s",
                    recent, ctx.record.account_id, window_secs
                ),
            )
        }
        Rule::SuspiciousKeyword { keywords, .. } => {
            let description = ctx.record.description.to_lowercase();
            let matched: Vec<&str> = keywords
                .iter()
                .map(String::as_str)
                .filter(|k| !k.is_empty() && description.contains(&k.to_lowercase()))
                .collect();
            if matched.is_empty() {
                return None;
            }
            (1.0, format!("matched: {}", matched.join(", ")))
        }
    };

    Some(ContributingFactor {
        rule: rule.name().to_string(),
        contribution: rule.weight() * strength,
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ctx<'a>(
        record: &'a Transaction,
        neighbors: &'a [SearchHit],
        history: &'a [RecordMetadata],
    ) -> RuleContext<'a> {
        RuleContext {
            record,
            neighbors,
            metric: DistanceMetric::Cosine,
            account_history: history,
        }
    }

    fn hit(id: &str, distance: f64, flagged: bool) -> SearchHit {
        let mut tx = Transaction::new(id, 100.0, "Stolen card purchase");
        tx.is_fraud = flagged;
        SearchHit {
            id: id.to_string(),
            distance,
            metadata: RecordMetadata::from(&tx),
        }
    }

    #[test]
    fn test_amount_rules() {
        let large = Rule::LargeAmount {
            weight: 0.3,
            threshold: 5000.0,
        };
        let micro = Rule::MicroAmount {
            weight: 0.25,
            threshold: 5.0,
        };

        let big = Transaction::new("t", 9500.0, "Offshore transfer");
        let factor = evaluate(&large, &ctx(&big, &[], &[])).unwrap();
        assert_eq!(factor.rule, "large_amount");
        assert_eq!(factor.contribution, 0.3);
        assert!(evaluate(&micro, &ctx(&big, &[], &[])).is_none());

        let tiny = Transaction::new("t", 0.5, "Card verification attempt");
        assert!(evaluate(&large, &ctx(&tiny, &[], &[])).is_none());
        assert_eq!(evaluate(&micro, &ctx(&tiny, &[], &[])).unwrap().contribution, 0.25);
    }

    #[test]
    fn test_similarity_uses_best_flagged_neighbor() {
        let rule = Rule::SimilarToFlagged {
            weight: 0.5,
            min_similarity: 0.6,
        };
        let record = Transaction::new("t", 100.0, "Stolen card purchase");
        let neighbors = vec![hit("clean", 0.0, false), hit("f1", 0.3, true), hit("f2", 0.1, true)];

        let factor = evaluate(&rule, &ctx(&record, &neighbors, &[])).unwrap();
        assert!((factor.contribution - 0.45).abs() < 1e-12);
        assert!(factor.detail.contains("f2"));

        let far = vec![hit("clean", 0.0, false), hit("f1", 0.7, true)];
        assert!(evaluate(&rule, &ctx(&record, &far, &[])).is_none());
        assert!(evaluate(&rule, &ctx(&record, &[], &[])).is_none());
    }

    #[test]
    fn test_velocity_window() {
        let rule = Rule::Velocity {
            weight: 0.2,
            window_secs: 3600,
            max_count: 3,
        };
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = Transaction::new("t", 20.0, "Coffee")
            .with_account("Bob")
            .with_timestamp(now);

        let at = |mins: i64| {
            RecordMetadata::from(
                &Transaction::new("h", 20.0, "Coffee")
                    .with_account("Bob")
                    .with_timestamp(now - Duration::minutes(mins)),
            )
        };

        let busy = vec![at(5), at(20), at(59)];
        assert!(evaluate(&rule, &ctx(&record, &[], &busy)).is_some());

        let spread = vec![at(5), at(20), at(61)];
        assert!(evaluate(&rule, &ctx(&record, &[], &spread)).is_none());

        let anonymous = Transaction::new("t", 20.0, "Coffee").with_timestamp(now);
        assert!(evaluate(&rule, &ctx(&anonymous, &[], &busy)).is_none());
    }

    #[test]
    fn test_keyword_rule() {
        let rule = default_rules().pop().unwrap();
        let record = Transaction::new("t", 1.0, "Unauthorized card testing");
        let factor = evaluate(&rule, &ctx(&record, &[], &[])).unwrap();
        assert_eq!(factor.detail, "matched: unauthorized, test");

        let clean = Transaction::new("t", 15.99, "Netflix subscription");
        assert!(evaluate(&rule, &ctx(&clean, &[], &[])).is_none());
    }

    #[test]
    fn test_rule_serde_and_weights() {
        let json = r#"{"kind": "velocity", "weight": 0.2, "window_secs": 600, "max_count": 4}"#;
        let mut rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.name(), "velocity");
        rule.set_weight(0.35);
        assert_eq!(rule.weight(), 0.35);
    }
}
