//! Peer-group percentile contextualization.
//!
//! - `distribution`: breakpoint distributions per sector and metric
//! - `contextualizer`: ranks a value with small-sample blending and fallbacks
//! - `store`: versioned snapshots swapped wholesale on refresh

mod contextualizer;
mod distribution;
mod store;

pub use contextualizer::{PercentileContextualizer, PercentileRank, RankNote, RankSource};
pub use distribution::{
    DistributionSnapshot, Metric, MetricDistribution, Orientation, SectorDistribution,
};
pub use store::DistributionStore;

pub(crate) use distribution::quantile;
