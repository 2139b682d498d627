//! Score calibration monitoring.
//!
//! - `monitor`: per-batch statistics, tier proportions and drift flags
//! - `history`: append-only JSONL log of snapshots

mod history;
mod monitor;

pub use history::CalibrationHistory;
pub use monitor::{
    CalibrationMonitor, CalibrationSnapshot, DriftFlag, ProposedCutoffs, ScoreStats,
    TierProportions,
};
