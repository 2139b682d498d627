//! Percentile breakpoint distributions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use valscore_common::util::{canonical_bytes, sha256_hex};

use crate::model::StockRecord;

/// Percentile levels of the published breakpoints.
const LEVELS: [f64; 5] = [10.0, 25.0, 50.0, 75.0, 90.0];

/// Normal-distribution IQR in standard deviations.
const IQR_TO_STD: f64 = 1.349;

// ============================================================================
// Metrics
// ============================================================================

/// Ranked valuation metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Per,
    Pbr,
    Roe,
}

/// Which direction of a metric is attractive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    LowerIsBetter,
    HigherIsBetter,
}

impl Orientation {
    /// Convert a raw distribution percentile into an attractiveness percentile.
    pub fn orient(self, raw_percentile: f64) -> f64 {
        match self {
            Self::LowerIsBetter => 100.0 - raw_percentile,
            Self::HigherIsBetter => raw_percentile,
        }
    }
}

impl Metric {
    pub const ALL: [Metric; 3] = [Self::Per, Self::Pbr, Self::Roe];

    pub fn orientation(self) -> Orientation {
        match self {
            Self::Per | Self::Pbr => Orientation::LowerIsBetter,
            Self::Roe => Orientation::HigherIsBetter,
        }
    }

    /// Observed value of this metric on a record.
    pub fn value_of(self, record: &StockRecord) -> Option<f64> {
        match self {
            Self::Per => record.per,
            Self::Pbr => record.pbr,
            Self::Roe => record.roe,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Per => "per",
            Self::Pbr => "pbr",
            Self::Roe => "roe",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Metric Distribution
// ============================================================================

/// Breakpoints and moments of one metric over a peer group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricDistribution {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub sample_size: usize,
}

impl MetricDistribution {
    /// Compute breakpoints (linear-interpolated quantiles), mean and sample
    /// standard deviation from the finite values. `None` if there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let std_dev = if n > 1 {
            let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };

        Some(Self {
            p10: quantile(&sorted, 0.10),
            p25: quantile(&sorted, 0.25),
            p50: quantile(&sorted, 0.50),
            p75: quantile(&sorted, 0.75),
            p90: quantile(&sorted, 0.90),
            mean,
            std_dev,
            sample_size: n,
        })
    }

    /// Build from known breakpoints; moments are estimated from them.
    pub fn from_breakpoints(breakpoints: [f64; 5], sample_size: usize) -> Self {
        let [p10, p25, p50, p75, p90] = breakpoints;
        Self {
            p10,
            p25,
            p50,
            p75,
            p90,
            mean: p50,
            std_dev: (p75 - p25).abs() / IQR_TO_STD,
            sample_size,
        }
    }

    pub fn breakpoints(&self) -> [f64; 5] {
        [self.p10, self.p25, self.p50, self.p75, self.p90]
    }

    /// Interquartile width.
    pub fn iqr(&self) -> f64 {
        self.p75 - self.p25
    }

    /// A flat peer group carries no ranking information.
    pub fn is_degenerate(&self, epsilon: f64) -> bool {
        let iqr = self.iqr().abs();
        !(iqr >= epsilon) || self.breakpoints().iter().any(|b| !b.is_finite())
    }

    /// Raw percentile of `value` in `[0, 100]`, monotonic non-decreasing.
    ///
    /// Linear between breakpoints; beyond p10/p90 extrapolates along the
    /// adjacent segment's slope and is capped at 0/100.
    pub fn percentile_of(&self, value: f64) -> f64 {
        let bp = self.breakpoints();
        let span = bp[4] - bp[0];

        let raw = if value < bp[0] {
            match edge_slope(bp[1] - bp[0], LEVELS[1] - LEVELS[0], span) {
                Some(slope) => LEVELS[0] - (bp[0] - value) * slope,
                None => 0.0,
            }
        } else if value > bp[4] {
            match edge_slope(bp[4] - bp[3], LEVELS[4] - LEVELS[3], span) {
                Some(slope) => LEVELS[4] + (value - bp[4]) * slope,
                None => 100.0,
            }
        } else {
            interior_percentile(&bp, value)
        };

        raw.clamp(0.0, 100.0)
    }
}

/// Slope (percentile points per unit) of an edge segment, falling back to the
/// p10–p90 average slope when the edge segment is flat.
fn edge_slope(width: f64, levels: f64, span: f64) -> Option<f64> {
    if width > 0.0 {
        Some(levels / width)
    } else if span > 0.0 {
        Some((LEVELS[4] - LEVELS[0]) / span)
    } else {
        None
    }
}

fn interior_percentile(bp: &[f64; 5], value: f64) -> f64 {
    for i in 0..4 {
        if value <= bp[i + 1] {
            let width = bp[i + 1] - bp[i];
            if width <= 0.0 {
                return LEVELS[i + 1];
            }
            let frac = (value - bp[i]) / width;
            return LEVELS[i] + frac * (LEVELS[i + 1] - LEVELS[i]);
        }
    }
    LEVELS[4]
}

/// Linear-interpolated quantile of a sorted, non-empty slice.
pub(crate) fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

// ============================================================================
// Sector Distribution
// ============================================================================

/// All metric distributions of one peer group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorDistribution {
    pub sector: String,
    /// Records that fed this distribution
    pub record_count: usize,
    pub per: Option<MetricDistribution>,
    pub pbr: Option<MetricDistribution>,
    pub roe: Option<MetricDistribution>,
}

impl SectorDistribution {
    /// Compute from the records of one sector.
    pub fn from_records<'a>(
        sector: impl Into<String>,
        records: impl IntoIterator<Item = &'a StockRecord>,
    ) -> Self {
        let mut per = Vec::new();
        let mut pbr = Vec::new();
        let mut roe = Vec::new();
        let mut record_count = 0;

        for record in records {
            record_count += 1;
            per.extend(record.per);
            pbr.extend(record.pbr);
            roe.extend(record.roe);
        }

        Self {
            sector: sector.into(),
            record_count,
            per: MetricDistribution::from_values(&per),
            pbr: MetricDistribution::from_values(&pbr),
            roe: MetricDistribution::from_values(&roe),
        }
    }

    pub fn get(&self, metric: Metric) -> Option<&MetricDistribution> {
        match metric {
            Metric::Per => self.per.as_ref(),
            Metric::Pbr => self.pbr.as_ref(),
            Metric::Roe => self.roe.as_ref(),
        }
    }
}

/// Pseudo-sector name of the market-wide distribution.
pub const GLOBAL_SECTOR: &str = "__global__";

fn placeholder_metric(metric: Metric) -> MetricDistribution {
    let breakpoints = match metric {
        Metric::Per => [4.0, 7.0, 11.0, 17.0, 30.0],
        Metric::Pbr => [0.3, 0.6, 1.0, 1.7, 3.0],
        Metric::Roe => [-2.0, 3.0, 8.0, 13.0, 20.0],
    };
    MetricDistribution::from_breakpoints(breakpoints, 0)
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable set of distributions computed for one as-of date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSnapshot {
    pub as_of: NaiveDate,
    pub computed_at: DateTime<Utc>,
    /// Assigned by the store on publish; 0 while unpublished
    pub generation: u64,
    pub sectors: BTreeMap<String, SectorDistribution>,
    pub global: SectorDistribution,
}

impl DistributionSnapshot {
    /// Group a universe by normalized sector and compute every distribution,
    /// including the market-wide one, from the same universe.
    pub fn build(as_of: NaiveDate, universe: &[StockRecord]) -> Self {
        let mut groups: BTreeMap<&str, Vec<&StockRecord>> = BTreeMap::new();
        for record in universe {
            groups.entry(record.sector_key()).or_default().push(record);
        }

        let sectors: BTreeMap<String, SectorDistribution> = groups
            .into_iter()
            .map(|(sector, records)| {
                (
                    sector.to_string(),
                    SectorDistribution::from_records(sector, records),
                )
            })
            .collect();

        let mut global = SectorDistribution::from_records(GLOBAL_SECTOR, universe);
        for metric in Metric::ALL {
            if global.get(metric).is_none() {
                tracing::warn!(
                    metric = %metric,
                    universe = universe.len(),
                    "No observations for global distribution, using placeholder baseline"
                );
                let slot = match metric {
                    Metric::Per => &mut global.per,
                    Metric::Pbr => &mut global.pbr,
                    Metric::Roe => &mut global.roe,
                };
                *slot = Some(placeholder_metric(metric));
            }
        }

        tracing::debug!(
            as_of = %as_of,
            sectors = sectors.len(),
            universe = universe.len(),
            "Distribution snapshot built"
        );

        Self {
            as_of,
            computed_at: Utc::now(),
            generation: 0,
            sectors,
            global,
        }
    }

    pub fn sector(&self, sector: &str) -> Option<&SectorDistribution> {
        self.sectors.get(sector)
    }

    pub fn universe_size(&self) -> usize {
        self.global.record_count
    }

    /// SHA-256 (hex) of the distributions and their as-of date.
    ///
    /// Generation and build time are left out: two stores that build the same
    /// universe agree, two different universes for one date do not.
    pub fn fingerprint(&self) -> String {
        #[derive(Debug, Serialize)]
        struct Content<'a> {
            as_of: NaiveDate,
            sectors: &'a BTreeMap<String, SectorDistribution>,
            global: &'a SectorDistribution,
        }

        sha256_hex(&canonical_bytes(&Content {
            as_of: self.as_of,
            sectors: &self.sectors,
            global: &self.global,
        }))
    }
}
