//! Per-record scoring flow.
//!
//! quality gate → percentile ranks (PER, PBR, ROE) → justified valuation →
//! risk deductions → composite score and recommendation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use valscore_common::Config;

use super::composite::{CompositeInputs, CompositeScorer};
use crate::model::{MetricRanks, ScoreResult, StockRecord};
use crate::percentile::{DistributionSnapshot, Metric, PercentileContextualizer, PercentileRank};
use crate::quality::{DataQualityGuard, QualityCode, QualityIssue, QualityVerdict};
use crate::regime::{RegimeLookup, RegimeParameterProvider};
use crate::risk::RiskFlagEvaluator;
use crate::source::ProviderError;
use crate::valuation::{JustifiedValuationCalculator, ValuationField, ValuationOutcome};

// ============================================================================
// Exclusions
// ============================================================================

/// Why a record was left out of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Rejected by the quality gate
    Quality(QualityCode),
    /// Upstream failed after retries
    UpstreamUnavailable,
    /// Upstream did not answer in time
    UpstreamTimeout,
}

impl ExclusionReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::Quality(code) => code.as_str(),
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::UpstreamTimeout => "upstream_timeout",
        }
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A record that produced no score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub symbol: String,
    pub reasons: Vec<ExclusionReason>,
    pub details: Vec<String>,
}

impl Exclusion {
    /// Exclusion from the rejections of a quality verdict.
    pub fn from_verdict(symbol: &str, verdict: &QualityVerdict) -> Self {
        let mut reasons: Vec<ExclusionReason> = verdict
            .rejections()
            .map(|i| ExclusionReason::Quality(i.code))
            .collect();
        reasons.sort();
        reasons.dedup();

        Self {
            symbol: symbol.to_string(),
            reasons,
            details: verdict.rejections().map(|i| i.detail.clone()).collect(),
        }
    }

    /// Exclusion for an upstream failure.
    pub fn from_provider(symbol: &str, error: &ProviderError) -> Self {
        let reason = if error.is_timeout() {
            ExclusionReason::UpstreamTimeout
        } else {
            ExclusionReason::UpstreamUnavailable
        };

        Self {
            symbol: symbol.to_string(),
            reasons: vec![reason],
            details: vec![error.to_string()],
        }
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.reasons.iter().map(|r| r.code()).collect()
    }
}

// ============================================================================
// Record Scorer
// ============================================================================

/// Runs the full per-record flow. Pure over its inputs and snapshots.
#[derive(Debug, Clone)]
pub struct RecordScorer {
    guard: DataQualityGuard,
    contextualizer: PercentileContextualizer,
    valuation: JustifiedValuationCalculator,
    risk: RiskFlagEvaluator,
    composite: CompositeScorer,
}

impl RecordScorer {
    pub fn new(config: &Config) -> Self {
        Self {
            guard: DataQualityGuard::new(config.quality.clone()),
            contextualizer: PercentileContextualizer::new(config.percentile.clone()),
            valuation: JustifiedValuationCalculator::new(
                config.valuation.clone(),
                config.scoring.weights.margin_of_safety,
            ),
            risk: RiskFlagEvaluator::new(config.risk.clone()),
            composite: CompositeScorer::new(config.scoring.clone()),
        }
    }

    pub fn composite(&self) -> &CompositeScorer {
        &self.composite
    }

    /// Quality gate only.
    pub fn check(&self, record: &StockRecord, today: NaiveDate) -> QualityVerdict {
        self.guard.check(record, today)
    }

    /// Score a record that already passed the quality gate.
    pub fn score(
        &self,
        record: &StockRecord,
        snapshot: &DistributionSnapshot,
        regime: RegimeLookup,
        quality_warnings: Vec<QualityIssue>,
    ) -> ScoreResult {
        let sector_key = record.sector_key();
        let sector = snapshot.sector(sector_key);

        let rank = |metric: Metric| -> PercentileRank {
            self.contextualizer.rank(
                metric,
                metric.value_of(record).unwrap_or(f64::NAN),
                sector_key,
                sector.and_then(|s| s.get(metric)),
                snapshot.global.get(metric),
            )
        };
        let ranks = MetricRanks {
            per: rank(Metric::Per),
            pbr: rank(Metric::Pbr),
            roe: rank(Metric::Roe),
        };

        let valuation = match (record.per, record.pbr, record.roe) {
            (None, _, _) => ValuationOutcome::missing(ValuationField::Per),
            (_, None, _) => ValuationOutcome::missing(ValuationField::Pbr),
            (_, _, None) => ValuationOutcome::missing(ValuationField::Roe),
            (Some(per), Some(pbr), Some(roe)) => self.valuation.compute(
                per,
                pbr,
                roe,
                regime.params.required_return(),
                regime.params.retention_ratio(),
            ),
        };

        let risk = self.risk.evaluate(record);

        self.composite.score(
            CompositeInputs {
                record,
                ranks,
                valuation,
                regime,
                quality_warnings,
            },
            &risk,
        )
    }

    /// Gate and score one record against the current snapshot and regimes.
    pub fn evaluate(
        &self,
        record: &StockRecord,
        snapshot: &DistributionSnapshot,
        regimes: &RegimeParameterProvider,
        today: NaiveDate,
    ) -> Result<ScoreResult, Exclusion> {
        let verdict = self.check(record, today);
        if !verdict.usable {
            return Err(Exclusion::from_verdict(&record.symbol, &verdict));
        }

        let warnings = verdict.warnings().cloned().collect();
        let regime = regimes.lookup(record.sector_key());
        Ok(self.score(record, snapshot, regime, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Recommendation;
    use valscore_common::RegimeConfig;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn record(symbol: &str, sector: &str, per: f64, pbr: f64, roe: f64) -> StockRecord {
        StockRecord {
            symbol: symbol.into(),
            name: symbol.into(),
            sector: sector.into(),
            price: 10_000.0,
            per: Some(per),
            pbr: Some(pbr),
            roe: Some(roe),
            debt_ratio: Some(80.0),
            current_ratio: Some(1.8),
            operating_cash_flows: Some(vec![1.0, 1.2, 1.1]),
            net_incomes: Some(vec![1.0, 1.1, 1.2]),
            audit_opinion: Some(crate::model::AuditOpinion::Unqualified),
            trading_value: Some(5e9),
            price_asof: today(),
            financial_asof: NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
            ..StockRecord::default()
        }
    }

    fn universe() -> Vec<StockRecord> {
        (0..40u32)
            .map(|i| {
                let i = f64::from(i);
                record(&format!("S{}", i), "Steel", 8.0 + i * 0.5, 0.6 + i * 0.05, 4.0 + i * 0.2)
            })
            .collect()
    }

    #[test]
    fn test_rejected_record_becomes_exclusion() {
        let scorer = RecordScorer::new(&Config::default());
        let snapshot = DistributionSnapshot::build(today(), &universe());
        let regimes = RegimeParameterProvider::new(RegimeConfig::default()).unwrap();

        let mut bad = record("BAD", "Steel", 6.0, 0.5, 12.0);
        bad.financial_asof = today().succ_opt().unwrap();

        let exclusion = scorer.evaluate(&bad, &snapshot, &regimes, today()).unwrap_err();
        assert!(exclusion
            .reasons
            .contains(&ExclusionReason::Quality(QualityCode::LookAhead)));
    }

    #[test]
    fn test_cheap_profitable_record_scores_top_tier() {
        let scorer = RecordScorer::new(&Config::default());
        let snapshot = DistributionSnapshot::build(today(), &universe());
        let regimes = RegimeParameterProvider::new(RegimeConfig::default()).unwrap();

        let result = scorer
            .evaluate(&record("CHEAP", "Steel", 6.0, 0.5, 12.0), &snapshot, &regimes, today())
            .unwrap();

        assert_eq!(result.sub_scores.margin_of_safety, 25.0);
        assert_eq!(result.recommendation, Recommendation::StrongBuy);
        assert!(result.regime.stale);
        assert!(result.quality_warnings.is_empty());
    }

    #[test]
    fn test_upstream_exclusion_codes() {
        let timeout = Exclusion::from_provider("X", &ProviderError::Timeout { secs: 5 });
        assert_eq!(timeout.codes(), vec!["upstream_timeout"]);

        let down = Exclusion::from_provider("X", &ProviderError::Unavailable("503".into()));
        assert_eq!(down.codes(), vec!["upstream_unavailable"]);
    }
}
