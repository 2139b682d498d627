//! Core data model: input records and score results.

mod record;
mod result;

pub use record::{normalize_sector, AuditOpinion, EventFlags, SectorLabel, StockRecord};
pub use result::{
    Confidence, DowngradeCause, Grade, MetricRanks, Recommendation, ScoreResult, SubScores,
};
