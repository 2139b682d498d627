//! Rule-based risk deductions.

mod evaluator;

pub use evaluator::{
    RiskAssessment, RiskCategory, RiskCode, RiskFlagEvaluator, RiskReason, RiskSeverity,
};
