//! Pre-scoring data quality gate.

mod guard;

pub use guard::{trading_days_between, DataQualityGuard, IssueSeverity, QualityCode, QualityIssue, QualityVerdict};
