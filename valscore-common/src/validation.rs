//! Configuration validation.
//!
//! Invalid operator configuration is surfaced as an error and never silently
//! clamped: weights that do not add up or a risk deduction with the wrong sign
//! would quietly distort every score in a batch.

use thiserror::Error;

use crate::config::{
    BatchConfig, CalibrationConfig, Config, DataQualityConfig, ObservabilityConfig,
    PercentileConfig, RegimeConfig, RiskConfig, ScoringConfig, ValuationConfig, MAX_CONCURRENCY,
};

/// Tolerance for sums that must match exactly (weights, target proportions).
const SUM_TOLERANCE: f64 = 1e-6;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Number of individual problems carried by this error.
    pub fn count(&self) -> usize {
        match self {
            Self::Multiple(errors) => errors.iter().map(Self::count).sum(),
            _ => 1,
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Collapse a list of errors into a single result.
fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

fn check_bounds(errors: &mut Vec<ValidationError>, field: &str, bounds: &crate::Bounds) {
    if !bounds.is_valid() {
        errors.push(ValidationError::invalid(
            field,
            format!("min {} must be finite and <= max {}", bounds.min, bounds.max),
        ));
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 9] = [
            &self.observability,
            &self.percentile,
            &self.regime,
            &self.valuation,
            &self.quality,
            &self.risk,
            &self.scoring,
            &self.calibration,
            &self.batch,
        ];

        let errors = sections
            .iter()
            .filter_map(|section| section.validate().err())
            .collect();

        collect(errors)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::invalid(
                "observability.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::invalid(
                "observability.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        Ok(())
    }
}

impl Validate for PercentileConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.min_sector_sample < 2 {
            errors.push(ValidationError::invalid(
                "percentile.min_sector_sample",
                "must be at least 2",
            ));
        }
        if self.full_sector_sample < self.min_sector_sample {
            errors.push(ValidationError::Conflict {
                reason: format!(
                    "percentile.full_sector_sample ({}) is below min_sector_sample ({})",
                    self.full_sector_sample, self.min_sector_sample
                ),
            });
        }
        if !(self.degenerate_epsilon.is_finite() && self.degenerate_epsilon >= 0.0) {
            errors.push(ValidationError::invalid(
                "percentile.degenerate_epsilon",
                "must be a non-negative number",
            ));
        }
        if !(0.0..=100.0).contains(&self.neutral_percentile) {
            errors.push(ValidationError::invalid(
                "percentile.neutral_percentile",
                "must be within [0, 100]",
            ));
        }

        collect(errors)
    }
}

impl Validate for RegimeConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.refresh_interval_days <= 0 {
            errors.push(ValidationError::invalid(
                "regime.refresh_interval_days",
                "must be greater than 0",
            ));
        }
        if self.refresh_timeout_secs == 0 {
            errors.push(ValidationError::invalid(
                "regime.refresh_timeout_secs",
                "must be greater than 0",
            ));
        }
        check_bounds(&mut errors, "regime.required_return_bounds", &self.required_return_bounds);
        check_bounds(&mut errors, "regime.retention_ratio_bounds", &self.retention_ratio_bounds);
        if !(self.required_return_bounds.min > 0.0 && self.required_return_bounds.max < 1.0) {
            errors.push(ValidationError::invalid(
                "regime.required_return_bounds",
                "must lie within (0, 1)",
            ));
        }
        if !(self.retention_ratio_bounds.min >= 0.0 && self.retention_ratio_bounds.max < 1.0) {
            errors.push(ValidationError::invalid(
                "regime.retention_ratio_bounds",
                "must lie within [0, 1)",
            ));
        }

        let entries = std::iter::once(("default".to_string(), &self.default)).chain(
            self.sectors
                .iter()
                .map(|(sector, defaults)| (format!("sectors.{}", sector), defaults)),
        );
        for (name, defaults) in entries {
            if !(defaults.required_return > 0.0 && defaults.required_return < 1.0) {
                errors.push(ValidationError::invalid(
                    format!("regime.{}.required_return", name),
                    "must be a fraction in (0, 1)",
                ));
            }
            if !(0.0..1.0).contains(&defaults.retention_ratio) {
                errors.push(ValidationError::invalid(
                    format!("regime.{}.retention_ratio", name),
                    "must be a fraction in [0, 1)",
                ));
            }
        }

        collect(errors)
    }
}

impl Validate for ValuationConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if !(self.full_margin.is_finite() && self.full_margin > 0.0) {
            errors.push(ValidationError::invalid(
                "valuation.full_margin",
                "must be greater than 0",
            ));
        }
        check_bounds(&mut errors, "valuation.roe_winsor", &self.roe_winsor);
        check_bounds(&mut errors, "valuation.per_winsor", &self.per_winsor);
        check_bounds(&mut errors, "valuation.pbr_winsor", &self.pbr_winsor);
        check_bounds(&mut errors, "valuation.roe_plausible", &self.roe_plausible);
        check_bounds(&mut errors, "valuation.per_plausible", &self.per_plausible);
        check_bounds(&mut errors, "valuation.pbr_plausible", &self.pbr_plausible);

        if self.per_winsor.min <= 0.0 || self.pbr_winsor.min <= 0.0 {
            errors.push(ValidationError::Conflict {
                reason: "valuation PER/PBR winsor floors must be positive".into(),
            });
        }

        collect(errors)
    }
}

impl Validate for DataQualityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.max_price_age_trading_days < 0 {
            errors.push(ValidationError::invalid(
                "quality.max_price_age_trading_days",
                "must not be negative",
            ));
        }
        if self.max_financial_age_days <= 0 {
            errors.push(ValidationError::invalid(
                "quality.max_financial_age_days",
                "must be greater than 0",
            ));
        }
        check_bounds(&mut errors, "quality.per_range", &self.per_range);
        check_bounds(&mut errors, "quality.pbr_range", &self.pbr_range);
        check_bounds(&mut errors, "quality.roe_range", &self.roe_range);

        collect(errors)
    }
}

impl RiskConfig {
    /// All configured deductions with their field names.
    fn deductions(&self) -> [(&'static str, f64); 13] {
        [
            ("negative_ocf_points", self.negative_ocf_points),
            ("net_income_volatility_points", self.net_income_volatility_points),
            ("audit_qualified_points", self.audit_qualified_points),
            ("audit_adverse_points", self.audit_adverse_points),
            ("audit_disclaimer_points", self.audit_disclaimer_points),
            ("impairment_partial_points", self.impairment_partial_points),
            ("impairment_severe_points", self.impairment_severe_points),
            ("leverage_high_points", self.leverage_high_points),
            ("leverage_extreme_points", self.leverage_extreme_points),
            ("administrative_issue_points", self.administrative_issue_points),
            ("unfaithful_disclosure_points", self.unfaithful_disclosure_points),
            ("trading_caution_points", self.trading_caution_points),
            ("capital_increase_points", self.capital_increase_points),
        ]
    }
}

impl Validate for RiskConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        let deductions = self.deductions();
        for (field, points) in deductions.iter().chain([("low_liquidity_points", self.low_liquidity_points)].iter()) {
            if !(points.is_finite() && *points <= 0.0) {
                errors.push(ValidationError::invalid(
                    format!("risk.{}", field),
                    format!("deduction must be <= 0, got {}", points),
                ));
            }
        }

        // Administrative issue is the heaviest single deduction.
        if let Some((field, _)) = deductions
            .iter()
            .find(|(_, points)| *points < self.administrative_issue_points)
        {
            errors.push(ValidationError::Conflict {
                reason: format!(
                    "risk.{} outweighs administrative_issue_points ({})",
                    field, self.administrative_issue_points
                ),
            });
        }

        if self.impairment_severe_points > self.impairment_partial_points {
            errors.push(ValidationError::Conflict {
                reason: "risk.impairment_severe_points must not be lighter than the partial tier"
                    .into(),
            });
        }
        if self.leverage_extreme_pct <= self.leverage_high_pct {
            errors.push(ValidationError::Conflict {
                reason: "risk.leverage_extreme_pct must exceed leverage_high_pct".into(),
            });
        }
        if self.negative_ocf_years == 0 {
            errors.push(ValidationError::invalid(
                "risk.negative_ocf_years",
                "must be at least 1",
            ));
        }
        if self.net_income_min_years < 2 {
            errors.push(ValidationError::invalid(
                "risk.net_income_min_years",
                "needs at least 2 years to measure dispersion",
            ));
        }

        collect(errors)
    }
}

impl Validate for ScoringConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if !(self.max_score.is_finite() && self.max_score > 0.0) {
            errors.push(ValidationError::invalid(
                "scoring.max_score",
                "must be greater than 0",
            ));
        }

        let w = &self.weights;
        for (field, value) in [
            ("valuation", w.valuation),
            ("quality", w.quality),
            ("margin_of_safety", w.margin_of_safety),
            ("sector_fit", w.sector_fit),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(ValidationError::invalid(
                    format!("scoring.weights.{}", field),
                    "must be a non-negative number",
                ));
            }
        }
        if (w.total() - self.max_score).abs() > SUM_TOLERANCE {
            errors.push(ValidationError::Conflict {
                reason: format!(
                    "scoring weights sum to {} but max_score is {}",
                    w.total(),
                    self.max_score
                ),
            });
        }

        let t = &self.thresholds;
        if !(t.strong_buy_pct > t.buy_pct && t.buy_pct > t.hold_pct && t.hold_pct > 0.0)
            || t.strong_buy_pct > 100.0
        {
            errors.push(ValidationError::invalid(
                "scoring.thresholds",
                "must satisfy 100 >= strong_buy_pct > buy_pct > hold_pct > 0",
            ));
        }

        for (field, share) in [("per_share", self.per_share), ("roe_share", self.roe_share)] {
            if !(0.0..=1.0).contains(&share) {
                errors.push(ValidationError::invalid(
                    format!("scoring.{}", field),
                    "must be within [0, 1]",
                ));
            }
        }

        if self.debt_ratio_acceptable < self.debt_ratio_healthy {
            errors.push(ValidationError::Conflict {
                reason: "scoring.debt_ratio_acceptable must be >= debt_ratio_healthy".into(),
            });
        }
        if self.current_ratio_acceptable > self.current_ratio_healthy {
            errors.push(ValidationError::Conflict {
                reason: "scoring.current_ratio_acceptable must be <= current_ratio_healthy".into(),
            });
        }
        if self.sector_fit_full_pct <= self.sector_fit_floor_pct {
            errors.push(ValidationError::Conflict {
                reason: "scoring.sector_fit_full_pct must exceed sector_fit_floor_pct".into(),
            });
        }

        collect(errors)
    }
}

impl Validate for CalibrationConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        let t = &self.targets;
        if [t.strong_buy, t.buy, t.hold, t.sell]
            .iter()
            .any(|p| !(0.0..=1.0).contains(p))
        {
            errors.push(ValidationError::invalid(
                "calibration.targets",
                "each proportion must be within [0, 1]",
            ));
        }
        if (t.total() - 1.0).abs() > SUM_TOLERANCE {
            errors.push(ValidationError::invalid(
                "calibration.targets",
                format!("proportions must sum to 1, got {}", t.total()),
            ));
        }
        if !(self.drift_tolerance > 0.0 && self.drift_tolerance < 1.0) {
            errors.push(ValidationError::invalid(
                "calibration.drift_tolerance",
                "must be within (0, 1)",
            ));
        }
        if self.history_path.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "calibration.history_path".into(),
            });
        }

        collect(errors)
    }
}

impl Validate for BatchConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.max_concurrency == 0 || self.max_concurrency > MAX_CONCURRENCY {
            return Err(ValidationError::invalid(
                "batch.max_concurrency",
                format!("must be between 1 and {}", MAX_CONCURRENCY),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ValidationError::invalid(
                "batch.fetch_timeout_secs",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}
