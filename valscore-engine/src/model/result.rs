//! Score result value objects.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::percentile::PercentileRank;
use crate::quality::QualityIssue;
use crate::regime::RegimeLookup;
use crate::risk::RiskReason;
use crate::valuation::ValuationOutcome;

// ============================================================================
// Recommendation Tiers
// ============================================================================

/// Discrete recommendation, ordered best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
}

impl Recommendation {
    /// All tiers, best first.
    pub const ALL: [Recommendation; 4] = [Self::StrongBuy, Self::Buy, Self::Hold, Self::Sell];

    /// Worst tier.
    pub const WORST: Recommendation = Self::Sell;

    /// Whether `self` ranks strictly below `other`.
    pub fn is_worse_than(self, other: Recommendation) -> bool {
        self > other
    }

    /// Letter grade for this tier.
    pub fn grade(self) -> Grade {
        match self {
            Self::StrongBuy => Grade::A,
            Self::Buy => Grade::B,
            Self::Hold => Grade::C,
            Self::Sell => Grade::D,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongBuy => "STRONG_BUY",
            Self::Buy => "BUY",
            Self::Hold => "HOLD",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Letter grade (1:1 with [`Recommendation`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        };
        write!(f, "{}", letter)
    }
}

/// How much the sector peer group contributed to the ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Why the recommendation sits one tier below the base-score tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowngradeCause {
    /// Risk penalty pushed the total into a lower tier
    RiskPenalty,
    /// Negative ROE while trading above the PBR guard
    NegativeRoeHighPbr,
    /// High or critical accounting anomaly
    AccountingAnomaly,
}

// ============================================================================
// Score Result
// ============================================================================

/// Weighted sub-scores, each within its configured maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub valuation: f64,
    pub quality: f64,
    pub margin_of_safety: f64,
    pub sector_fit: f64,
}

impl SubScores {
    pub fn sum(&self) -> f64 {
        self.valuation + self.quality + self.margin_of_safety + self.sector_fit
    }
}

/// Per-metric percentile ranks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRanks {
    pub per: PercentileRank,
    pub pbr: PercentileRank,
    pub roe: PercentileRank,
}

impl MetricRanks {
    pub fn iter(&self) -> impl Iterator<Item = &PercentileRank> {
        [&self.per, &self.pbr, &self.roe].into_iter()
    }

    /// Smallest sector sample that actually contributed to a rank (0 if none).
    pub fn effective_sector_sample(&self) -> usize {
        self.iter()
            .map(PercentileRank::effective_sector_sample)
            .min()
            .unwrap_or(0)
    }
}

/// Scoring output for one record.
///
/// Created once per scoring call and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub roe: Option<f64>,
    pub price_asof: NaiveDate,
    pub financial_asof: NaiveDate,

    pub sub_scores: SubScores,
    /// Sum of sub-scores before the risk deduction
    pub base_score: f64,
    /// Signed risk deduction (≤ 0)
    pub risk_penalty: f64,
    pub risk_reasons: Vec<RiskReason>,
    /// Final score in `[0, max_score]`
    pub total_score: f64,

    pub base_recommendation: Recommendation,
    pub recommendation: Recommendation,
    pub grade: Grade,
    pub downgrade: Option<DowngradeCause>,
    pub confidence: Confidence,
    pub sector_sample_size: usize,

    pub ranks: MetricRanks,
    pub valuation: ValuationOutcome,
    pub regime: RegimeLookup,
    pub quality_warnings: Vec<QualityIssue>,
}

impl ScoreResult {
    /// Reason codes of every triggered risk rule.
    pub fn risk_codes(&self) -> Vec<&'static str> {
        self.risk_reasons.iter().map(|r| r.code.as_str()).collect()
    }

    /// One-line summary for logs and terminal output.
    pub fn summary(&self) -> String {
        format!(
            "{} [{}] {:.2} {} ({}, {} confidence)",
            self.symbol,
            self.sector,
            self.total_score,
            self.recommendation,
            self.grade,
            self.confidence
        )
    }
}
