//! Percentile contextualizer.
//!
//! Ranks a raw metric against its sector peers, blending with the market-wide
//! distribution when the sector sample is thin:
//!
//! | sector sample `n` | source |
//! |---|---|
//! | absent or `n < min` | global only |
//! | `min <= n < full` | linear blend, sector weight `(n - min) / (full - min)` |
//! | `n >= full` | sector only |
//!
//! A flat sector distribution (`|p75 - p25| < epsilon`) falls back to global
//! regardless of `n`. When nothing is usable the neutral percentile is returned.

use serde::{Deserialize, Serialize};
use valscore_common::PercentileConfig;

use super::distribution::{Metric, MetricDistribution};

/// Which distribution produced a rank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RankSource {
    Sector,
    Blended { sector_weight: f64 },
    Global,
    Neutral,
}

/// Diagnostic recorded when ranking deviates from the plain sector path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "note", rename_all = "snake_case")]
pub enum RankNote {
    /// No distribution for this sector and metric
    NoSectorDistribution { sector: String },
    /// Sector sample below the minimum; global substituted
    SmallSectorSample { sector: String, sample_size: usize },
    /// Sector distribution is flat; global substituted
    DegenerateSector { sector: String, iqr: f64 },
    /// Global distribution missing or flat
    GlobalUnavailable,
    /// The observed value was NaN or infinite
    NonFiniteValue,
}

/// Percentile of one metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileRank {
    pub metric: Metric,
    pub value: f64,
    /// Position in the distribution, `[0, 100]`
    pub raw_percentile: f64,
    /// Attractiveness, `[0, 100]`; higher is better for every metric
    pub percentile: f64,
    pub source: RankSource,
    /// Sample size of the sector distribution (0 if absent)
    pub sector_sample_size: usize,
    /// Weight the sector distribution carried in the final rank
    pub sector_weight: f64,
    pub notes: Vec<RankNote>,
}

impl PercentileRank {
    /// Sector sample that actually contributed, 0 if the sector was not used.
    pub fn effective_sector_sample(&self) -> usize {
        if self.sector_weight > 0.0 {
            self.sector_sample_size
        } else {
            0
        }
    }
}

/// Ranks metric values against peer distributions.
#[derive(Debug, Clone)]
pub struct PercentileContextualizer {
    config: PercentileConfig,
}

impl PercentileContextualizer {
    pub fn new(config: PercentileConfig) -> Self {
        Self { config }
    }

    /// Rank `value` for `metric` against the sector and global distributions.
    pub fn rank(
        &self,
        metric: Metric,
        value: f64,
        sector_name: &str,
        sector: Option<&MetricDistribution>,
        global: Option<&MetricDistribution>,
    ) -> PercentileRank {
        let mut notes = Vec::new();
        let sector_sample_size = sector.map_or(0, |d| d.sample_size);

        if !value.is_finite() {
            tracing::debug!(metric = %metric, sector = sector_name, "Non-finite value, neutral rank");
            notes.push(RankNote::NonFiniteValue);
            return self.neutral(metric, value, sector_sample_size, notes);
        }

        let eps = self.config.degenerate_epsilon;

        let global = match global {
            Some(g) if !g.is_degenerate(eps) => Some(g),
            _ => {
                notes.push(RankNote::GlobalUnavailable);
                None
            }
        };

        let sector = match sector {
            None => {
                tracing::debug!(
                    metric = %metric,
                    sector = sector_name,
                    "No sector distribution, using global"
                );
                notes.push(RankNote::NoSectorDistribution {
                    sector: sector_name.to_string(),
                });
                None
            }
            Some(d) if d.sample_size < self.config.min_sector_sample => {
                tracing::debug!(
                    metric = %metric,
                    sector = sector_name,
                    sample_size = d.sample_size,
                    "Sector sample below minimum, using global"
                );
                notes.push(RankNote::SmallSectorSample {
                    sector: sector_name.to_string(),
                    sample_size: d.sample_size,
                });
                None
            }
            Some(d) if d.is_degenerate(eps) => {
                tracing::debug!(
                    metric = %metric,
                    sector = sector_name,
                    iqr = d.iqr(),
                    "Degenerate sector distribution, using global"
                );
                notes.push(RankNote::DegenerateSector {
                    sector: sector_name.to_string(),
                    iqr: d.iqr(),
                });
                None
            }
            Some(d) => Some(d),
        };

        let (raw, source, sector_weight) = match (sector, global) {
            (Some(s), Some(g)) => {
                let w = self.sector_weight(s.sample_size);
                if w >= 1.0 {
                    (s.percentile_of(value), RankSource::Sector, 1.0)
                } else {
                    let blended = w * s.percentile_of(value) + (1.0 - w) * g.percentile_of(value);
                    (blended, RankSource::Blended { sector_weight: w }, w)
                }
            }
            (Some(s), None) => (s.percentile_of(value), RankSource::Sector, 1.0),
            (None, Some(g)) => (g.percentile_of(value), RankSource::Global, 0.0),
            (None, None) => {
                tracing::debug!(metric = %metric, sector = sector_name, "No usable distribution, neutral rank");
                return self.neutral(metric, value, sector_sample_size, notes);
            }
        };

        let raw = raw.clamp(0.0, 100.0);
        PercentileRank {
            metric,
            value,
            raw_percentile: raw,
            percentile: metric.orientation().orient(raw),
            source,
            sector_sample_size,
            sector_weight,
            notes,
        }
    }

    /// Weight on the sector distribution for a usable sample of size `n`.
    fn sector_weight(&self, n: usize) -> f64 {
        let min = self.config.min_sector_sample;
        let full = self.config.full_sector_sample;
        if n >= full || full <= min {
            1.0
        } else {
            n.saturating_sub(min) as f64 / (full - min) as f64
        }
    }

    fn neutral(
        &self,
        metric: Metric,
        value: f64,
        sector_sample_size: usize,
        notes: Vec<RankNote>,
    ) -> PercentileRank {
        let neutral = self.config.neutral_percentile;
        PercentileRank {
            metric,
            value,
            raw_percentile: neutral,
            percentile: neutral,
            source: RankSource::Neutral,
            sector_sample_size,
            sector_weight: 0.0,
            notes,
        }
    }
}
