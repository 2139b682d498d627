//! Batch-level score distribution tracking and drift detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use valscore_common::util::round_to;
use valscore_common::{CalibrationConfig, TierTargets};

use crate::model::{Recommendation, ScoreResult};
use crate::percentile::{quantile, MetricDistribution};

// ============================================================================
// Snapshot Types
// ============================================================================

/// Summary statistics of the total scores in one batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreStats {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

impl ScoreStats {
    /// `None` for an empty batch.
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        let dist = MetricDistribution::from_values(scores)?;
        let finite = scores.iter().copied().filter(|s| s.is_finite());
        let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s), hi.max(s))
        });

        Some(Self {
            count: dist.sample_size,
            mean: dist.mean,
            std_dev: dist.std_dev,
            min,
            max,
            p10: dist.p10,
            p25: dist.p25,
            p50: dist.p50,
            p75: dist.p75,
            p90: dist.p90,
        })
    }
}

/// Realized share of each tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TierProportions {
    pub strong_buy: f64,
    pub buy: f64,
    pub hold: f64,
    pub sell: f64,
}

impl TierProportions {
    pub fn from_recommendations(recommendations: impl IntoIterator<Item = Recommendation>) -> Self {
        let mut counts = [0usize; 4];
        for r in recommendations {
            counts[tier_index(r)] += 1;
        }

        let total: usize = counts.iter().sum();
        if total == 0 {
            return Self::default();
        }
        let share = |i: usize| counts[i] as f64 / total as f64;

        Self {
            strong_buy: share(0),
            buy: share(1),
            hold: share(2),
            sell: share(3),
        }
    }

    pub fn get(&self, tier: Recommendation) -> f64 {
        match tier {
            Recommendation::StrongBuy => self.strong_buy,
            Recommendation::Buy => self.buy,
            Recommendation::Hold => self.hold,
            Recommendation::Sell => self.sell,
        }
    }
}

fn tier_index(tier: Recommendation) -> usize {
    match tier {
        Recommendation::StrongBuy => 0,
        Recommendation::Buy => 1,
        Recommendation::Hold => 2,
        Recommendation::Sell => 3,
    }
}

fn target_for(targets: &TierTargets, tier: Recommendation) -> f64 {
    match tier {
        Recommendation::StrongBuy => targets.strong_buy,
        Recommendation::Buy => targets.buy,
        Recommendation::Hold => targets.hold,
        Recommendation::Sell => targets.sell,
    }
}

/// A tier whose realized share left the tolerance band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftFlag {
    pub tier: Recommendation,
    pub target: f64,
    pub realized: f64,
    /// `realized - target`
    pub deviation: f64,
}

/// Aggregate over one batch run. Appended to history, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    /// Computation period, `YYYY-MM`
    pub period: String,
    pub run_id: String,
    pub computed_at: DateTime<Utc>,
    pub batch_size: usize,
    pub stats: Option<ScoreStats>,
    pub proportions: TierProportions,
    pub drift: Vec<DriftFlag>,
    /// False when the batch was too small to judge drift
    pub drift_evaluated: bool,
    /// Mean score change against the previous snapshot
    pub mean_shift: Option<f64>,
    pub config_fingerprint: String,
}

impl CalibrationSnapshot {
    pub fn has_drift(&self) -> bool {
        !self.drift.is_empty()
    }
}

/// Tier cutoffs (percent of max score) that would have hit the targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProposedCutoffs {
    pub strong_buy_pct: f64,
    pub buy_pct: f64,
    pub hold_pct: f64,
    pub sample_size: usize,
}

// ============================================================================
// Monitor
// ============================================================================

/// Observes batches of results and compares tier shares against targets.
#[derive(Debug, Clone)]
pub struct CalibrationMonitor {
    config: CalibrationConfig,
    max_score: f64,
}

impl CalibrationMonitor {
    pub fn new(config: CalibrationConfig, max_score: f64) -> Self {
        Self { config, max_score }
    }

    /// Summarize a batch as of now.
    pub fn observe(
        &self,
        run_id: &str,
        results: &[ScoreResult],
        config_fingerprint: &str,
        previous: Option<&CalibrationSnapshot>,
    ) -> CalibrationSnapshot {
        self.observe_at(run_id, results, config_fingerprint, previous, Utc::now())
    }

    pub fn observe_at(
        &self,
        run_id: &str,
        results: &[ScoreResult],
        config_fingerprint: &str,
        previous: Option<&CalibrationSnapshot>,
        computed_at: DateTime<Utc>,
    ) -> CalibrationSnapshot {
        let scores: Vec<f64> = results.iter().map(|r| r.total_score).collect();
        let stats = ScoreStats::from_scores(&scores);
        let proportions =
            TierProportions::from_recommendations(results.iter().map(|r| r.recommendation));

        let drift_evaluated = results.len() >= self.config.min_batch_size;
        let drift = if drift_evaluated {
            self.drift_flags(&proportions)
        } else {
            tracing::debug!(
                batch_size = results.len(),
                min_batch_size = self.config.min_batch_size,
                "Batch too small for drift evaluation"
            );
            Vec::new()
        };

        let mean_shift = match (stats, previous.and_then(|p| p.stats)) {
            (Some(now), Some(before)) => Some(round_to(now.mean - before.mean, 4)),
            _ => None,
        };

        for flag in &drift {
            tracing::warn!(
                tier = %flag.tier,
                target = flag.target,
                realized = flag.realized,
                deviation = flag.deviation,
                "Tier proportion drifted from target"
            );
        }

        CalibrationSnapshot {
            period: computed_at.format("%Y-%m").to_string(),
            run_id: run_id.to_string(),
            computed_at,
            batch_size: results.len(),
            stats,
            proportions,
            drift,
            drift_evaluated,
            mean_shift,
            config_fingerprint: config_fingerprint.to_string(),
        }
    }

    fn drift_flags(&self, proportions: &TierProportions) -> Vec<DriftFlag> {
        Recommendation::ALL
            .iter()
            .filter_map(|&tier| {
                let target = target_for(&self.config.targets, tier);
                let realized = proportions.get(tier);
                let deviation = realized - target;
                (deviation.abs() > self.config.drift_tolerance).then_some(DriftFlag {
                    tier,
                    target,
                    realized,
                    deviation,
                })
            })
            .collect()
    }

    /// Cutoffs that split `scores` into the target proportions.
    ///
    /// `None` below the minimum batch size.
    pub fn propose_cutoffs(&self, scores: &[f64]) -> Option<ProposedCutoffs> {
        let mut sorted: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
        if sorted.is_empty() || sorted.len() < self.config.min_batch_size {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let t = &self.config.targets;
        let pct = |q: f64| round_to(quantile(&sorted, q.clamp(0.0, 1.0)) / self.max_score * 100.0, 2);

        Some(ProposedCutoffs {
            strong_buy_pct: pct(1.0 - t.strong_buy),
            buy_pct: pct(1.0 - t.strong_buy - t.buy),
            hold_pct: pct(t.sell),
            sample_size: sorted.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn monitor(min_batch_size: usize) -> CalibrationMonitor {
        CalibrationMonitor::new(
            CalibrationConfig {
                min_batch_size,
                ..CalibrationConfig::default()
            },
            100.0,
        )
    }

    #[test]
    fn test_proportions_sum_to_one() {
        let recs = [
            Recommendation::StrongBuy,
            Recommendation::Buy,
            Recommendation::Buy,
            Recommendation::Sell,
        ];
        let p = TierProportions::from_recommendations(recs);
        assert_eq!(p.strong_buy, 0.25);
        assert_eq!(p.buy, 0.5);
        assert_eq!(p.hold, 0.0);
        assert_eq!(p.strong_buy + p.buy + p.hold + p.sell, 1.0);
    }

    #[test]
    fn test_empty_batch_is_recorded_without_drift() {
        let at = Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap();
        let snap = monitor(20).observe_at("run-1", &[], "abc", None, at);
        assert_eq!(snap.period, "2026-10");
        assert_eq!(snap.batch_size, 0);
        assert!(snap.stats.is_none());
        assert!(!snap.drift_evaluated);
        assert!(!snap.has_drift());
    }

    #[test]
    fn test_drift_flags_over_and_under() {
        let m = monitor(0);
        let all_sell = TierProportions {
            sell: 1.0,
            ..TierProportions::default()
        };
        let flags = m.drift_flags(&all_sell);
        let tiers: Vec<Recommendation> = flags.iter().map(|f| f.tier).collect();
        // strong_buy (-0.10) sits on the tolerance and is not flagged
        assert_eq!(
            tiers,
            vec![Recommendation::Buy, Recommendation::Hold, Recommendation::Sell]
        );
        assert!(flags.iter().any(|f| f.deviation > 0.0));
    }

    #[test]
    fn test_score_stats() {
        let stats = ScoreStats::from_scores(&[10.0, 20.0, 30.0, 40.0, 50.0]).unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.mean, 30.0);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 50.0);
        assert_eq!(stats.p50, 30.0);
        assert!(ScoreStats::from_scores(&[]).is_none());
    }

    #[test]
    fn test_propose_cutoffs_follows_targets() {
        let scores: Vec<f64> = (0..=100u32).map(f64::from).collect();
        let cutoffs = monitor(20).propose_cutoffs(&scores).unwrap();
        assert_eq!(cutoffs.strong_buy_pct, 90.0);
        assert_eq!(cutoffs.buy_pct, 65.0);
        assert_eq!(cutoffs.hold_pct, 25.0);
        assert_eq!(cutoffs.sample_size, 101);

        assert!(monitor(20).propose_cutoffs(&scores[..5]).is_none());
    }
}
