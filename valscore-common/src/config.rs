//! Configuration management for valscore.
//!
//! The engine reads a unified configuration file at `~/.valscore/config.json`,
//! optionally merged with `regimes.json` and `calibration.json` from the same
//! directory (see [`crate::config_loader`]).
//!
//! # Configuration Priority
//!
//! 1. Environment variables (VALSCORE_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `VALSCORE_LOG_LEVEL` → observability.log_level
//! - `VALSCORE_LOG_FORMAT` → observability.log_format
//! - `VALSCORE_MAX_CONCURRENCY` → batch.max_concurrency
//! - `VALSCORE_HISTORY_PATH` → calibration.history_path
//! - `VALSCORE_EXPORT_DIR` → output.export_dir

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config_loader::load_modular_config;
use crate::util::{canonical_bytes, sha256_hex};

/// Hard upper bound on batch worker concurrency.
///
/// The upstream data source is rate-limited; the pool never scales with input size.
pub const MAX_CONCURRENCY: usize = 8;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".valscore"),
        |dirs| dirs.home_dir().join(".valscore"),
    )
}

// ============================================================================
// Shared Types
// ============================================================================

/// Closed numeric interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether `value` lies inside the interval (NaN never does).
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Clip `value` into the interval.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    /// Whether the interval itself is well formed.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Peer-group percentile ranking
    #[serde(default)]
    pub percentile: PercentileConfig,

    /// Sector regime parameters (r, b)
    #[serde(default)]
    pub regime: RegimeConfig,

    /// Justified-multiple valuation
    #[serde(default)]
    pub valuation: ValuationConfig,

    /// Data quality gate
    #[serde(default)]
    pub quality: DataQualityConfig,

    /// Risk flag deductions
    #[serde(default)]
    pub risk: RiskConfig,

    /// Composite score weights and tier thresholds
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Score distribution drift monitoring
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Batch execution
    #[serde(default)]
    pub batch: BatchConfig,

    /// Export output
    #[serde(default)]
    pub output: OutputConfig,
}

/// Sections that change scoring output; these feed the fingerprint.
#[derive(Debug, Serialize)]
struct ScoringSections<'a> {
    percentile: &'a PercentileConfig,
    regime: &'a RegimeConfig,
    valuation: &'a ValuationConfig,
    quality: &'a DataQualityConfig,
    risk: &'a RiskConfig,
    scoring: &'a ScoringConfig,
}

impl Config {
    /// Load configuration from the default directory.
    pub fn load() -> Result<Self> {
        Self::load_from_dir(&config_dir())
    }

    /// Load configuration from a specific directory (modular files merged).
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        if !dir.join("config.json").exists() {
            tracing::info!(dir = %dir.display(), "Config file not found, using defaults");
        }

        let merged = load_modular_config(Some(dir.to_path_buf()))?;
        serde_json::from_value(merged)
            .with_context(|| format!("Failed to parse config from {}", dir.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("VALSCORE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("VALSCORE_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Ok(raw) = std::env::var("VALSCORE_MAX_CONCURRENCY") {
            match raw.parse() {
                Ok(n) => self.batch.max_concurrency = n,
                Err(_) => tracing::warn!(value = %raw, "Ignoring unparsable VALSCORE_MAX_CONCURRENCY"),
            }
        }
        if let Ok(path) = std::env::var("VALSCORE_HISTORY_PATH") {
            self.calibration.history_path = path;
        }
        if let Ok(dir) = std::env::var("VALSCORE_EXPORT_DIR") {
            self.output.export_dir = dir;
        }
    }

    /// SHA-256 fingerprint (hex) of every section that influences scores.
    ///
    /// Observability, batch and output settings are excluded, so two runs with
    /// different log levels still compare equal.
    pub fn fingerprint(&self) -> String {
        let sections = ScoringSections {
            percentile: &self.percentile,
            regime: &self.regime,
            valuation: &self.valuation,
            quality: &self.quality,
            risk: &self.risk,
            scoring: &self.scoring,
        };
        sha256_hex(&canonical_bytes(&sections))
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to quiet to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Percentile Configuration
// ============================================================================

/// Peer-group ranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileConfig {
    /// Below this sector sample size only the global distribution is used
    #[serde(default = "default_min_sector_sample")]
    pub min_sector_sample: usize,

    /// At or above this sample size the sector distribution is used alone
    #[serde(default = "default_full_sector_sample")]
    pub full_sector_sample: usize,

    /// Interquartile width under which a distribution is treated as flat
    #[serde(default = "default_degenerate_epsilon")]
    pub degenerate_epsilon: f64,

    /// Percentile returned when no distribution is usable
    #[serde(default = "default_neutral_percentile")]
    pub neutral_percentile: f64,
}

impl Default for PercentileConfig {
    fn default() -> Self {
        Self {
            min_sector_sample: default_min_sector_sample(),
            full_sector_sample: default_full_sector_sample(),
            degenerate_epsilon: default_degenerate_epsilon(),
            neutral_percentile: default_neutral_percentile(),
        }
    }
}

fn default_min_sector_sample() -> usize {
    10
}

fn default_full_sector_sample() -> usize {
    30
}

fn default_degenerate_epsilon() -> f64 {
    1e-6
}

fn default_neutral_percentile() -> f64 {
    50.0
}

// ============================================================================
// Regime Configuration
// ============================================================================

/// Configured (r, b) for one sector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeDefaults {
    /// Required return r (fraction, e.g. 0.10)
    pub required_return: f64,
    /// Earnings retention ratio b (fraction, e.g. 0.35)
    pub retention_ratio: f64,
}

/// Sector regime parameter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Days after which a cached entry is stale (monthly cadence)
    #[serde(default = "default_refresh_interval_days")]
    pub refresh_interval_days: i64,

    /// Timeout for a single refresh call to the regime source
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,

    /// Fallback used for sectors without a configured default
    #[serde(default = "default_regime_defaults")]
    pub default: RegimeDefaults,

    /// Per-sector defaults keyed by normalized sector name
    #[serde(default)]
    pub sectors: BTreeMap<String, RegimeDefaults>,

    /// Clamp range for r coming from the refresh source
    #[serde(default = "default_required_return_bounds")]
    pub required_return_bounds: Bounds,

    /// Clamp range for b coming from the refresh source
    #[serde(default = "default_retention_ratio_bounds")]
    pub retention_ratio_bounds: Bounds,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            refresh_interval_days: default_refresh_interval_days(),
            refresh_timeout_secs: default_refresh_timeout_secs(),
            default: default_regime_defaults(),
            sectors: BTreeMap::new(),
            required_return_bounds: default_required_return_bounds(),
            retention_ratio_bounds: default_retention_ratio_bounds(),
        }
    }
}

fn default_refresh_interval_days() -> i64 {
    30
}

fn default_refresh_timeout_secs() -> u64 {
    10
}

fn default_regime_defaults() -> RegimeDefaults {
    RegimeDefaults {
        required_return: 0.10,
        retention_ratio: 0.35,
    }
}

fn default_required_return_bounds() -> Bounds {
    Bounds::new(0.02, 0.30)
}

fn default_retention_ratio_bounds() -> Bounds {
    Bounds::new(0.0, 0.95)
}

// ============================================================================
// Valuation Configuration
// ============================================================================

/// Justified-multiple valuation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationConfig {
    /// Margin (justified/observed - 1) that earns the full MoS sub-score
    #[serde(default = "default_full_margin")]
    pub full_margin: f64,

    /// Winsorization bounds applied before use
    #[serde(default = "default_roe_winsor")]
    pub roe_winsor: Bounds,
    #[serde(default = "default_per_winsor")]
    pub per_winsor: Bounds,
    #[serde(default = "default_pbr_winsor")]
    pub pbr_winsor: Bounds,

    /// Inputs outside these ranges are uninvestable for this model
    #[serde(default = "default_roe_plausible")]
    pub roe_plausible: Bounds,
    #[serde(default = "default_per_plausible")]
    pub per_plausible: Bounds,
    #[serde(default = "default_pbr_plausible")]
    pub pbr_plausible: Bounds,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            full_margin: default_full_margin(),
            roe_winsor: default_roe_winsor(),
            per_winsor: default_per_winsor(),
            pbr_winsor: default_pbr_winsor(),
            roe_plausible: default_roe_plausible(),
            per_plausible: default_per_plausible(),
            pbr_plausible: default_pbr_plausible(),
        }
    }
}

fn default_full_margin() -> f64 {
    0.5
}

fn default_roe_winsor() -> Bounds {
    Bounds::new(-50.0, 100.0)
}

fn default_per_winsor() -> Bounds {
    Bounds::new(1.0, 100.0)
}

fn default_pbr_winsor() -> Bounds {
    Bounds::new(0.05, 20.0)
}

fn default_roe_plausible() -> Bounds {
    Bounds::new(0.0, 200.0)
}

fn default_per_plausible() -> Bounds {
    Bounds::new(0.0, 500.0)
}

fn default_pbr_plausible() -> Bounds {
    Bounds::new(0.0, 50.0)
}

// ============================================================================
// Data Quality Configuration
// ============================================================================

/// Data quality gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQualityConfig {
    /// Maximum price age in trading days (weekdays)
    #[serde(default = "default_max_price_age_trading_days")]
    pub max_price_age_trading_days: i64,

    /// Maximum financial statement age in calendar days
    #[serde(default = "default_max_financial_age_days")]
    pub max_financial_age_days: i64,

    /// Sanity ranges; values outside are rejected, never clipped
    #[serde(default = "default_per_sanity")]
    pub per_range: Bounds,
    #[serde(default = "default_pbr_sanity")]
    pub pbr_range: Bounds,
    #[serde(default = "default_roe_sanity")]
    pub roe_range: Bounds,

    /// Known dummy values upstream providers substitute for missing data
    #[serde(default = "default_placeholder_values")]
    pub placeholder_values: Vec<f64>,
}

impl Default for DataQualityConfig {
    fn default() -> Self {
        Self {
            max_price_age_trading_days: default_max_price_age_trading_days(),
            max_financial_age_days: default_max_financial_age_days(),
            per_range: default_per_sanity(),
            pbr_range: default_pbr_sanity(),
            roe_range: default_roe_sanity(),
            placeholder_values: default_placeholder_values(),
        }
    }
}

fn default_max_price_age_trading_days() -> i64 {
    3
}

fn default_max_financial_age_days() -> i64 {
    180
}

fn default_per_sanity() -> Bounds {
    Bounds::new(-1000.0, 1000.0)
}

fn default_pbr_sanity() -> Bounds {
    Bounds::new(-50.0, 100.0)
}

fn default_roe_sanity() -> Bounds {
    Bounds::new(-300.0, 300.0)
}

fn default_placeholder_values() -> Vec<f64> {
    vec![150.0, 999.0, -999.0, 9999.0, -9999.0]
}

// ============================================================================
// Risk Configuration
// ============================================================================

/// Risk flag deduction configuration. All point values are ≤ 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    // === Accounting ===
    #[serde(default = "default_negative_ocf_years")]
    pub negative_ocf_years: usize,
    #[serde(default = "default_negative_ocf_points")]
    pub negative_ocf_points: f64,

    #[serde(default = "default_net_income_cv_threshold")]
    pub net_income_cv_threshold: f64,
    #[serde(default = "default_net_income_min_years")]
    pub net_income_min_years: usize,
    #[serde(default = "default_net_income_volatility_points")]
    pub net_income_volatility_points: f64,

    #[serde(default = "default_audit_qualified_points")]
    pub audit_qualified_points: f64,
    #[serde(default = "default_audit_adverse_points")]
    pub audit_adverse_points: f64,
    #[serde(default = "default_audit_disclaimer_points")]
    pub audit_disclaimer_points: f64,

    /// Impairment ratio (%) at or above which the severe tier applies
    #[serde(default = "default_impairment_severe_pct")]
    pub impairment_severe_pct: f64,
    #[serde(default = "default_impairment_partial_points")]
    pub impairment_partial_points: f64,
    #[serde(default = "default_impairment_severe_points")]
    pub impairment_severe_points: f64,

    /// Debt ratio (%) thresholds
    #[serde(default = "default_leverage_high_pct")]
    pub leverage_high_pct: f64,
    #[serde(default = "default_leverage_extreme_pct")]
    pub leverage_extreme_pct: f64,
    #[serde(default = "default_leverage_high_points")]
    pub leverage_high_points: f64,
    #[serde(default = "default_leverage_extreme_points")]
    pub leverage_extreme_points: f64,

    // === Event ===
    #[serde(default = "default_administrative_issue_points")]
    pub administrative_issue_points: f64,
    #[serde(default = "default_unfaithful_disclosure_points")]
    pub unfaithful_disclosure_points: f64,
    #[serde(default = "default_trading_caution_points")]
    pub trading_caution_points: f64,
    #[serde(default = "default_capital_increase_threshold")]
    pub capital_increase_threshold: u32,
    #[serde(default = "default_capital_increase_points")]
    pub capital_increase_points: f64,

    // === Liquidity ===
    #[serde(default = "default_min_trading_value")]
    pub min_trading_value: f64,
    #[serde(default = "default_low_liquidity_points")]
    pub low_liquidity_points: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            negative_ocf_years: default_negative_ocf_years(),
            negative_ocf_points: default_negative_ocf_points(),
            net_income_cv_threshold: default_net_income_cv_threshold(),
            net_income_min_years: default_net_income_min_years(),
            net_income_volatility_points: default_net_income_volatility_points(),
            audit_qualified_points: default_audit_qualified_points(),
            audit_adverse_points: default_audit_adverse_points(),
            audit_disclaimer_points: default_audit_disclaimer_points(),
            impairment_severe_pct: default_impairment_severe_pct(),
            impairment_partial_points: default_impairment_partial_points(),
            impairment_severe_points: default_impairment_severe_points(),
            leverage_high_pct: default_leverage_high_pct(),
            leverage_extreme_pct: default_leverage_extreme_pct(),
            leverage_high_points: default_leverage_high_points(),
            leverage_extreme_points: default_leverage_extreme_points(),
            administrative_issue_points: default_administrative_issue_points(),
            unfaithful_disclosure_points: default_unfaithful_disclosure_points(),
            trading_caution_points: default_trading_caution_points(),
            capital_increase_threshold: default_capital_increase_threshold(),
            capital_increase_points: default_capital_increase_points(),
            min_trading_value: default_min_trading_value(),
            low_liquidity_points: default_low_liquidity_points(),
        }
    }
}

fn default_negative_ocf_years() -> usize {
    3
}
fn default_negative_ocf_points() -> f64 {
    -5.0
}
fn default_net_income_cv_threshold() -> f64 {
    1.0
}
fn default_net_income_min_years() -> usize {
    3
}
fn default_net_income_volatility_points() -> f64 {
    -3.0
}
fn default_audit_qualified_points() -> f64 {
    -5.0
}
fn default_audit_adverse_points() -> f64 {
    -15.0
}
fn default_audit_disclaimer_points() -> f64 {
    -15.0
}
fn default_impairment_severe_pct() -> f64 {
    50.0
}
fn default_impairment_partial_points() -> f64 {
    -4.0
}
fn default_impairment_severe_points() -> f64 {
    -10.0
}
fn default_leverage_high_pct() -> f64 {
    200.0
}
fn default_leverage_extreme_pct() -> f64 {
    400.0
}
fn default_leverage_high_points() -> f64 {
    -3.0
}
fn default_leverage_extreme_points() -> f64 {
    -8.0
}
fn default_administrative_issue_points() -> f64 {
    -20.0
}
fn default_unfaithful_disclosure_points() -> f64 {
    -8.0
}
fn default_trading_caution_points() -> f64 {
    -5.0
}
fn default_capital_increase_threshold() -> u32 {
    3
}
fn default_capital_increase_points() -> f64 {
    -4.0
}
fn default_min_trading_value() -> f64 {
    100_000_000.0
}
fn default_low_liquidity_points() -> f64 {
    -3.0
}

// ============================================================================
// Scoring Configuration
// ============================================================================

/// Sub-score maxima. Must sum to `ScoringConfig::max_score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub valuation: f64,
    pub quality: f64,
    pub margin_of_safety: f64,
    pub sector_fit: f64,
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.valuation + self.quality + self.margin_of_safety + self.sector_fit
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            valuation: 35.0,
            quality: 30.0,
            margin_of_safety: 25.0,
            sector_fit: 10.0,
        }
    }
}

/// Tier cutoffs as a percentage of the maximum score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub strong_buy_pct: f64,
    pub buy_pct: f64,
    pub hold_pct: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            strong_buy_pct: 75.0,
            buy_pct: 60.0,
            hold_pct: 45.0,
        }
    }
}

/// Composite scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_max_score")]
    pub max_score: f64,

    #[serde(default)]
    pub weights: ScoreWeights,

    #[serde(default)]
    pub thresholds: TierThresholds,

    /// Share of the valuation sub-score driven by PER (rest is PBR)
    #[serde(default = "default_per_share")]
    pub per_share: f64,

    /// Share of the quality sub-score driven by ROE rank (rest is balance sheet)
    #[serde(default = "default_roe_share")]
    pub roe_share: f64,

    /// Debt ratio (%) at or below which leverage earns full credit
    #[serde(default = "default_debt_ratio_healthy")]
    pub debt_ratio_healthy: f64,
    /// Debt ratio (%) at or below which leverage earns half credit
    #[serde(default = "default_debt_ratio_acceptable")]
    pub debt_ratio_acceptable: f64,
    #[serde(default = "default_current_ratio_healthy")]
    pub current_ratio_healthy: f64,
    #[serde(default = "default_current_ratio_acceptable")]
    pub current_ratio_acceptable: f64,

    /// Average oriented percentile at which the sector-fit bonus starts
    #[serde(default = "default_sector_fit_floor_pct")]
    pub sector_fit_floor_pct: f64,
    /// Average oriented percentile at which the sector-fit bonus is full
    #[serde(default = "default_sector_fit_full_pct")]
    pub sector_fit_full_pct: f64,

    /// Negative ROE with PBR above this triggers a one-tier downgrade
    #[serde(default = "default_negative_roe_pbr_guard")]
    pub negative_roe_pbr_guard: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_score: default_max_score(),
            weights: ScoreWeights::default(),
            thresholds: TierThresholds::default(),
            per_share: default_per_share(),
            roe_share: default_roe_share(),
            debt_ratio_healthy: default_debt_ratio_healthy(),
            debt_ratio_acceptable: default_debt_ratio_acceptable(),
            current_ratio_healthy: default_current_ratio_healthy(),
            current_ratio_acceptable: default_current_ratio_acceptable(),
            sector_fit_floor_pct: default_sector_fit_floor_pct(),
            sector_fit_full_pct: default_sector_fit_full_pct(),
            negative_roe_pbr_guard: default_negative_roe_pbr_guard(),
        }
    }
}

fn default_max_score() -> f64 {
    100.0
}
fn default_per_share() -> f64 {
    0.5
}
fn default_roe_share() -> f64 {
    0.7
}
fn default_debt_ratio_healthy() -> f64 {
    100.0
}
fn default_debt_ratio_acceptable() -> f64 {
    200.0
}
fn default_current_ratio_healthy() -> f64 {
    1.5
}
fn default_current_ratio_acceptable() -> f64 {
    1.0
}
fn default_sector_fit_floor_pct() -> f64 {
    50.0
}
fn default_sector_fit_full_pct() -> f64 {
    90.0
}
fn default_negative_roe_pbr_guard() -> f64 {
    3.0
}

// ============================================================================
// Calibration Configuration
// ============================================================================

/// Target share of each recommendation tier (fractions summing to 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierTargets {
    pub strong_buy: f64,
    pub buy: f64,
    pub hold: f64,
    pub sell: f64,
}

impl TierTargets {
    pub fn total(&self) -> f64 {
        self.strong_buy + self.buy + self.hold + self.sell
    }
}

impl Default for TierTargets {
    fn default() -> Self {
        Self {
            strong_buy: 0.10,
            buy: 0.25,
            hold: 0.40,
            sell: 0.25,
        }
    }
}

/// Drift monitoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default)]
    pub targets: TierTargets,

    /// Absolute deviation in proportion that raises a drift flag
    #[serde(default = "default_drift_tolerance")]
    pub drift_tolerance: f64,

    /// Batches smaller than this are recorded but never flagged
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,

    /// Append-only JSONL history of calibration snapshots
    #[serde(default = "default_history_path")]
    pub history_path: String,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            targets: TierTargets::default(),
            drift_tolerance: default_drift_tolerance(),
            min_batch_size: default_min_batch_size(),
            history_path: default_history_path(),
        }
    }
}

fn default_drift_tolerance() -> f64 {
    0.10
}

fn default_min_batch_size() -> usize {
    20
}

fn default_history_path() -> String {
    "~/.valscore/calibration/history.jsonl".to_string()
}

// ============================================================================
// Batch / Output Configuration
// ============================================================================

/// Batch execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Concurrent record fetch+score workers (1..=MAX_CONCURRENCY)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Timeout for one upstream fetch
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Additional attempts after a failed fetch
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            fetch_retries: default_fetch_retries(),
        }
    }
}

fn default_max_concurrency() -> usize {
    4
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_fetch_retries() -> u32 {
    1
}

/// Export output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for export bundles
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
        }
    }
}

fn default_export_dir() -> String {
    "~/.valscore/exports".to_string()
}

// ============================================================================
// Tests
// ============================================================================
