//! Threat score results and classification

use serde::{Deserialize, Serialize};

/// Discrete threat classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    /// Determine threat level from score and cutoffs
    pub fn from_score(score: f64, thresholds: &ThreatThresholds) -> Self {
        if score >= thresholds.critical {
            ThreatLevel::Critical
        } else if score >= thresholds.high {
            ThreatLevel::High
        } else if score >= thresholds.medium {
            ThreatLevel::Medium
        } else {
            ThreatLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }
}

/// Configurable classification cutoffs (lower bounds, inclusive)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for ThreatThresholds {
    fn default() -> Self {
        Self {
            medium: 0.3,
            high: 0.6,
            critical: 0.85,
        }
    }
}

/// One fired rule and what it added to the score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributingFactor {
    /// Rule name, e.g. `large_amount`
    pub rule: String,
    /// Weighted contribution to the raw score
    pub contribution: f64,
    /// Human readable reason
    pub detail: String,
}

/// Outcome of scoring a single transaction.
///
/// `score == clamp(sum(factors.contribution), 0, 1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatScoreResult {
    pub transaction_id: String,
    pub score: f64,
    pub level: ThreatLevel,
    /// Fired rules in evaluation order
    pub factors: Vec<ContributingFactor>,
    /// Version of the scoring parameters the result was computed against
    pub parameters_version: u64,
}

impl ThreatScoreResult {
    /// Sum of contributions before clamping
    pub fn raw_score(&self) -> f64 {
        self.factors.iter().map(|f| f.contribution).sum()
    }

    /// Names of the fired rules, in order
    pub fn fired_rules(&self) -> Vec<&str> {
        self.factors.iter().map(|f| f.rule.as_str()).collect()
    }
}
