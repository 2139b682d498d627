//! Justified multiples and margin of safety.
//!
//! Steady-growth relations with implied growth `g = ROE * b`:
//!
//! ```text
//! P/B* = (ROE - g) / (r - g)
//! P/E* = (1 - b) / (r - g)
//! ```
//!
//! Margin per multiple is `max(0, justified / observed - 1)`; the smaller of
//! the two is scaled into the MoS sub-score exactly once.

use serde::{Deserialize, Serialize};
use std::fmt;
use valscore_common::{Bounds, ValuationConfig};

// ============================================================================
// Types
// ============================================================================

/// Valuation input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValuationField {
    Per,
    Pbr,
    Roe,
}

impl fmt::Display for ValuationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Per => write!(f, "per"),
            Self::Pbr => write!(f, "pbr"),
            Self::Roe => write!(f, "roe"),
        }
    }
}

/// Outcome classification of a valuation computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ValuationDiagnostic {
    /// Computed normally
    Ok,
    /// Input missing upstream
    MissingInput { field: ValuationField },
    /// Zero or negative input: uninvestable under this model
    NonPositiveInput { field: ValuationField, value: f64 },
    /// Input outside the configured plausible range
    Implausible { field: ValuationField, value: f64 },
    /// Implied growth at or above the required return
    Divergent { g: f64, r: f64 },
    /// NaN or infinite input or intermediate
    NonFinite,
}

impl ValuationDiagnostic {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::MissingInput { .. } => "missing_input",
            Self::NonPositiveInput { .. } => "non_positive_input",
            Self::Implausible { .. } => "implausible",
            Self::Divergent { .. } => "divergent",
            Self::NonFinite => "non_finite",
        }
    }
}

impl fmt::Display for ValuationDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::MissingInput { field } => write!(f, "{} missing", field),
            Self::NonPositiveInput { field, value } => {
                write!(f, "{} = {} is not positive", field, value)
            }
            Self::Implausible { field, value } => {
                write!(f, "{} = {} outside plausible range", field, value)
            }
            Self::Divergent { g, r } => {
                write!(f, "implied growth g = {:.4} >= required return r = {:.4}", g, r)
            }
            Self::NonFinite => write!(f, "non-finite value"),
        }
    }
}

/// A winsorization clip applied before computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WinsorEvent {
    pub field: ValuationField,
    pub original: f64,
    pub clipped: f64,
}

/// Result of a justified-valuation computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationOutcome {
    /// MoS sub-score in `[0, mos_max]`
    pub mos_score: f64,
    pub diagnostic: ValuationDiagnostic,
    pub implied_growth: Option<f64>,
    pub justified_pbr: Option<f64>,
    pub justified_per: Option<f64>,
    pub margin_pbr: Option<f64>,
    pub margin_per: Option<f64>,
    /// Conservative (minimum) margin before scaling
    pub margin: Option<f64>,
    pub winsorized: Vec<WinsorEvent>,
}

impl ValuationOutcome {
    fn zero(diagnostic: ValuationDiagnostic, winsorized: Vec<WinsorEvent>) -> Self {
        Self {
            mos_score: 0.0,
            diagnostic,
            implied_growth: None,
            justified_pbr: None,
            justified_per: None,
            margin_pbr: None,
            margin_per: None,
            margin: None,
            winsorized,
        }
    }

    /// Outcome for a record missing one of the inputs.
    pub fn missing(field: ValuationField) -> Self {
        Self::zero(ValuationDiagnostic::MissingInput { field }, Vec::new())
    }
}

// ============================================================================
// Calculator
// ============================================================================

/// Computes justified multiples and the MoS sub-score.
#[derive(Debug, Clone)]
pub struct JustifiedValuationCalculator {
    config: ValuationConfig,
    mos_max: f64,
}

impl JustifiedValuationCalculator {
    /// `mos_max` is the MoS sub-score weight.
    pub fn new(config: ValuationConfig, mos_max: f64) -> Self {
        Self { config, mos_max }
    }

    pub fn mos_max(&self) -> f64 {
        self.mos_max
    }

    /// Compute the MoS sub-score.
    ///
    /// `roe` is in percent, `r` and `b` are fractions. Never returns NaN or
    /// infinite values.
    pub fn compute(&self, per: f64, pbr: f64, roe: f64, r: f64, b: f64) -> ValuationOutcome {
        let inputs = [
            (ValuationField::Per, per),
            (ValuationField::Pbr, pbr),
            (ValuationField::Roe, roe),
        ];

        if inputs.iter().any(|(_, v)| !v.is_finite()) || !r.is_finite() || !b.is_finite() {
            return ValuationOutcome::zero(ValuationDiagnostic::NonFinite, Vec::new());
        }

        if let Some(&(field, value)) = inputs.iter().find(|(_, v)| *v <= 0.0) {
            tracing::debug!(field = %field, value, "Non-positive valuation input, MoS zeroed");
            return ValuationOutcome::zero(
                ValuationDiagnostic::NonPositiveInput { field, value },
                Vec::new(),
            );
        }

        if let Some(&(field, value)) = inputs
            .iter()
            .find(|(field, v)| !self.plausible(*field).contains(*v))
        {
            tracing::debug!(field = %field, value, "Implausible valuation input, MoS zeroed");
            return ValuationOutcome::zero(
                ValuationDiagnostic::Implausible { field, value },
                Vec::new(),
            );
        }

        let mut winsorized = Vec::new();
        let per = self.winsorize(ValuationField::Per, per, &mut winsorized);
        let pbr = self.winsorize(ValuationField::Pbr, pbr, &mut winsorized);
        let roe = self.winsorize(ValuationField::Roe, roe, &mut winsorized);

        let roe = roe / 100.0;
        let g = roe * b;
        if g >= r {
            tracing::debug!(g, r, "Implied growth at or above required return, MoS zeroed");
            return ValuationOutcome::zero(ValuationDiagnostic::Divergent { g, r }, winsorized);
        }

        let spread = r - g;
        let justified_pbr = (roe - g) / spread;
        let justified_per = (1.0 - b) / spread;
        let margin_pbr = (justified_pbr / pbr - 1.0).max(0.0);
        let margin_per = (justified_per / per - 1.0).max(0.0);
        let margin = margin_pbr.min(margin_per);

        let scaled = (margin / self.config.full_margin).min(1.0) * self.mos_max;
        let mos_score = scaled.clamp(0.0, self.mos_max);

        if [justified_pbr, justified_per, margin, mos_score]
            .iter()
            .any(|v| !v.is_finite())
        {
            return ValuationOutcome::zero(ValuationDiagnostic::NonFinite, winsorized);
        }

        ValuationOutcome {
            mos_score,
            diagnostic: ValuationDiagnostic::Ok,
            implied_growth: Some(g),
            justified_pbr: Some(justified_pbr),
            justified_per: Some(justified_per),
            margin_pbr: Some(margin_pbr),
            margin_per: Some(margin_per),
            margin: Some(margin),
            winsorized,
        }
    }

    fn plausible(&self, field: ValuationField) -> Bounds {
        match field {
            ValuationField::Per => self.config.per_plausible,
            ValuationField::Pbr => self.config.pbr_plausible,
            ValuationField::Roe => self.config.roe_plausible,
        }
    }

    fn winsorize(&self, field: ValuationField, value: f64, events: &mut Vec<WinsorEvent>) -> f64 {
        let bounds = match field {
            ValuationField::Per => self.config.per_winsor,
            ValuationField::Pbr => self.config.pbr_winsor,
            ValuationField::Roe => self.config.roe_winsor,
        };
        let clipped = bounds.clamp(value);
        if clipped != value {
            tracing::debug!(
                field = %field,
                original = value,
                clipped,
                "Winsorized valuation input"
            );
            events.push(WinsorEvent {
                field,
                original: value,
                clipped,
            });
        }
        clipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc() -> JustifiedValuationCalculator {
        JustifiedValuationCalculator::new(ValuationConfig::default(), 25.0)
    }

    #[test]
    fn test_reference_scenario() {
        let out = calc().compute(6.0, 0.5, 12.0, 0.10, 0.35);
        assert!(out.diagnostic.is_ok());
        assert!((out.implied_growth.unwrap() - 0.042).abs() < 1e-12);
        assert!((out.justified_pbr.unwrap() - 1.3448).abs() < 1e-3);
        assert!((out.margin_pbr.unwrap() - 1.69).abs() < 1e-2);
        assert!((out.justified_per.unwrap() - 11.2069).abs() < 1e-3);
        // Conservative margin is the PER one, still above full_margin: capped.
        assert!((out.margin.unwrap() - out.margin_per.unwrap()).abs() < 1e-12);
        assert_eq!(out.mos_score, 25.0);
        assert!(out.winsorized.is_empty());
    }

    #[test]
    fn test_partial_margin_scaled_once() {
        // P/E* = 0.65 / 0.058 ≈ 11.2069, P/B* ≈ 1.3448
        let out = calc().compute(10.0, 1.2, 12.0, 0.10, 0.35);
        let margin = out.margin.unwrap();
        assert!(margin > 0.0 && margin < 0.5);
        assert!((out.mos_score - margin / 0.5 * 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_overvalued_scores_zero() {
        let out = calc().compute(40.0, 5.0, 12.0, 0.10, 0.35);
        assert!(out.diagnostic.is_ok());
        assert_eq!(out.margin, Some(0.0));
        assert_eq!(out.mos_score, 0.0);
    }

    #[test]
    fn test_divergent_growth() {
        // g = 0.40 * 0.5 = 0.20 >= r
        let out = calc().compute(10.0, 2.0, 40.0, 0.10, 0.5);
        assert_eq!(out.mos_score, 0.0);
        match out.diagnostic {
            ValuationDiagnostic::Divergent { g, r } => {
                assert!((g - 0.20).abs() < 1e-12);
                assert_eq!(r, 0.10);
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[test]
    fn test_non_positive_is_distinct_from_divergent() {
        let out = calc().compute(-5.0, 0.8, 10.0, 0.10, 0.35);
        assert_eq!(
            out.diagnostic,
            ValuationDiagnostic::NonPositiveInput {
                field: ValuationField::Per,
                value: -5.0
            }
        );
        assert_eq!(out.diagnostic.code(), "non_positive_input");
    }

    #[test]
    fn test_implausible_input() {
        let out = calc().compute(800.0, 0.8, 10.0, 0.10, 0.35);
        assert!(matches!(
            out.diagnostic,
            ValuationDiagnostic::Implausible {
                field: ValuationField::Per,
                ..
            }
        ));
        assert_eq!(out.mos_score, 0.0);
    }

    #[test]
    fn test_winsorization_recorded() {
        let out = calc().compute(0.5, 0.8, 150.0, 0.30, 0.1);
        let fields: Vec<ValuationField> = out.winsorized.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec![ValuationField::Per, ValuationField::Roe]);
        assert_eq!(out.winsorized[1].clipped, 100.0);
    }

    #[test]
    fn test_non_finite_inputs() {
        let out = calc().compute(f64::NAN, 0.8, 10.0, 0.10, 0.35);
        assert_eq!(out.diagnostic, ValuationDiagnostic::NonFinite);
        assert_eq!(out.mos_score, 0.0);
    }
}
