//! Composite scorer.
//!
//! Combines the sub-scores into one bounded total, applies the risk deduction
//! and maps the result to a recommendation. Recommendations move down at most
//! one tier from the base-score tier, through [`downgrade`] only.

use valscore_common::util::round_to;
use valscore_common::ScoringConfig;

use crate::model::{
    Confidence, DowngradeCause, MetricRanks, Recommendation, ScoreResult, StockRecord, SubScores,
};
use crate::percentile::PercentileRank;
use crate::quality::QualityIssue;
use crate::regime::RegimeLookup;
use crate::risk::RiskAssessment;
use crate::valuation::ValuationOutcome;

/// Move a recommendation one tier down, saturating at the worst tier.
pub fn downgrade(recommendation: Recommendation) -> Recommendation {
    match recommendation {
        Recommendation::StrongBuy => Recommendation::Buy,
        Recommendation::Buy => Recommendation::Hold,
        Recommendation::Hold | Recommendation::Sell => Recommendation::Sell,
    }
}

/// Everything the composite scorer needs for one record.
#[derive(Debug, Clone)]
pub struct CompositeInputs<'a> {
    pub record: &'a StockRecord,
    pub ranks: MetricRanks,
    pub valuation: ValuationOutcome,
    pub regime: RegimeLookup,
    pub quality_warnings: Vec<QualityIssue>,
}

/// Weighted composition and tier mapping.
#[derive(Debug, Clone)]
pub struct CompositeScorer {
    config: ScoringConfig,
}

impl CompositeScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn max_score(&self) -> f64 {
        self.config.max_score
    }

    /// Tier for a score, by percentage of the maximum.
    pub fn tier_for(&self, score: f64) -> Recommendation {
        let pct = score / self.config.max_score * 100.0;
        let t = &self.config.thresholds;
        if pct >= t.strong_buy_pct {
            Recommendation::StrongBuy
        } else if pct >= t.buy_pct {
            Recommendation::Buy
        } else if pct >= t.hold_pct {
            Recommendation::Hold
        } else {
            Recommendation::Sell
        }
    }

    /// Confidence from the sector sample that actually fed the ranks.
    pub fn confidence(sector_sample: usize) -> Confidence {
        match sector_sample {
            n if n >= 30 => Confidence::High,
            n if n >= 10 => Confidence::Medium,
            _ => Confidence::Low,
        }
    }

    /// Compose the score result.
    pub fn score(&self, inputs: CompositeInputs<'_>, risk: &RiskAssessment) -> ScoreResult {
        let record = inputs.record;
        let max = self.config.max_score;
        let sector_sample = inputs.ranks.effective_sector_sample();
        let confidence = Self::confidence(sector_sample);

        let sub_scores = SubScores {
            valuation: round_to(self.valuation_score(record, &inputs.ranks), 2),
            quality: round_to(self.quality_score(record, &inputs.ranks.roe), 2),
            margin_of_safety: round_to(
                inputs
                    .valuation
                    .mos_score
                    .clamp(0.0, self.config.weights.margin_of_safety),
                2,
            ),
            sector_fit: round_to(self.sector_fit_score(&inputs.ranks, confidence), 2),
        };

        let base_score = round_to(sub_scores.sum(), 2).clamp(0.0, max);
        let penalty = risk.penalty.min(0.0);
        let total_score = round_to(base_score + penalty, 2).clamp(0.0, max);

        let base_recommendation = self.tier_for(base_score);
        let penalized = self.tier_for(total_score);

        let cause = if penalized.is_worse_than(base_recommendation) {
            Some(DowngradeCause::RiskPenalty)
        } else if record.roe.is_some_and(|roe| roe < 0.0)
            && record
                .pbr
                .is_some_and(|pbr| pbr > self.config.negative_roe_pbr_guard)
        {
            Some(DowngradeCause::NegativeRoeHighPbr)
        } else if risk.has_severe_accounting_anomaly() {
            Some(DowngradeCause::AccountingAnomaly)
        } else {
            None
        };

        let recommendation = match cause {
            Some(_) => downgrade(base_recommendation),
            None => base_recommendation,
        };

        if let Some(cause) = cause {
            tracing::debug!(
                symbol = %record.symbol,
                from = %base_recommendation,
                to = %recommendation,
                cause = ?cause,
                "Recommendation downgraded"
            );
        }

        ScoreResult {
            symbol: record.symbol.clone(),
            name: record.name.clone(),
            sector: record.sector_key().to_string(),
            per: record.per,
            pbr: record.pbr,
            roe: record.roe,
            price_asof: record.price_asof,
            financial_asof: record.financial_asof,
            sub_scores,
            base_score,
            risk_penalty: penalty,
            risk_reasons: risk.reasons.clone(),
            total_score,
            base_recommendation,
            recommendation,
            grade: recommendation.grade(),
            downgrade: cause,
            confidence,
            sector_sample_size: sector_sample,
            ranks: inputs.ranks,
            valuation: inputs.valuation,
            regime: inputs.regime,
            quality_warnings: inputs.quality_warnings,
        }
    }

    /// Oriented PER/PBR ranks. A non-positive multiple earns nothing.
    fn valuation_score(&self, record: &StockRecord, ranks: &MetricRanks) -> f64 {
        let component = |observed: Option<f64>, rank: &PercentileRank| match observed {
            Some(v) if v > 0.0 => rank.percentile / 100.0,
            _ => 0.0,
        };

        let share = self.config.per_share;
        let blended = share * component(record.per, &ranks.per)
            + (1.0 - share) * component(record.pbr, &ranks.pbr);

        (blended * self.config.weights.valuation).clamp(0.0, self.config.weights.valuation)
    }

    /// ROE rank blended with balance-sheet health.
    fn quality_score(&self, record: &StockRecord, roe: &PercentileRank) -> f64 {
        let cfg = &self.config;

        let debt = match record.debt_ratio {
            Some(d) if d <= cfg.debt_ratio_healthy => 1.0,
            Some(d) if d <= cfg.debt_ratio_acceptable => 0.5,
            Some(_) => 0.0,
            None => 0.5,
        };
        let current = match record.current_ratio {
            Some(c) if c >= cfg.current_ratio_healthy => 1.0,
            Some(c) if c >= cfg.current_ratio_acceptable => 0.5,
            Some(_) => 0.0,
            None => 0.5,
        };
        let balance = (debt + current) / 2.0;

        let blended = cfg.roe_share * (roe.percentile / 100.0) + (1.0 - cfg.roe_share) * balance;
        (blended * cfg.weights.quality).clamp(0.0, cfg.weights.quality)
    }

    /// Bonus for standing out within the sector, scaled by confidence.
    fn sector_fit_score(&self, ranks: &MetricRanks, confidence: Confidence) -> f64 {
        let cfg = &self.config;
        let factor = match confidence {
            Confidence::High => 1.0,
            Confidence::Medium => 0.5,
            Confidence::Low => 0.0,
        };

        let avg = ranks.iter().map(|r| r.percentile).sum::<f64>() / 3.0;
        let span = cfg.sector_fit_full_pct - cfg.sector_fit_floor_pct;
        let fit = ((avg - cfg.sector_fit_floor_pct) / span).clamp(0.0, 1.0);

        (fit * factor * cfg.weights.sector_fit).clamp(0.0, cfg.weights.sector_fit)
    }
}
