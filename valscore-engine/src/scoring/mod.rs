//! Scoring.
//!
//! - `composite`: weighted sub-scores, risk deduction, tier mapping
//! - `pipeline`: the per-record flow from quality gate to result
//! - `batch`: bounded-concurrency batch runs feeding calibration

mod batch;
mod composite;
mod pipeline;

pub use batch::{BatchReport, BatchScorer};
pub use composite::{downgrade, CompositeInputs, CompositeScorer};
pub use pipeline::{Exclusion, ExclusionReason, RecordScorer};
