//! Risk flag evaluator.
//!
//! Independent, additive rules. Each triggered rule contributes a fixed
//! non-positive point value and keeps its reason code so consumers can explain
//! "why" separately from "how much".
//!
//! | Category | Rule | Default |
//! |---|---|---|
//! | Accounting | N consecutive years of negative OCF | -5 |
//! | Accounting | Net income CV above threshold | -3 |
//! | Accounting | Qualified / adverse / disclaimer opinion | -5 / -15 / -15 |
//! | Accounting | Capital impairment partial / severe | -4 / -10 |
//! | Accounting | Debt ratio high / extreme | -3 / -8 |
//! | Event | Administrative issue | -20 |
//! | Event | Unfaithful disclosure | -8 |
//! | Event | Trading caution | -5 |
//! | Event | Frequent capital increases | -4 |
//! | Liquidity | Trading value below minimum | -3 |

use serde::{Deserialize, Serialize};
use std::fmt;
use valscore_common::RiskConfig;

use crate::model::{AuditOpinion, StockRecord};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Accounting,
    Event,
    Liquidity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Reason code of a triggered risk rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCode {
    NegativeOperatingCashFlow,
    VolatileNetIncome,
    AuditQualified,
    AuditAdverse,
    AuditDisclaimer,
    CapitalImpairmentPartial,
    CapitalImpairmentSevere,
    LeverageHigh,
    LeverageExtreme,
    AdministrativeIssue,
    UnfaithfulDisclosure,
    TradingCaution,
    FrequentCapitalIncrease,
    LowLiquidity,
}

impl RiskCode {
    pub fn category(self) -> RiskCategory {
        match self {
            Self::NegativeOperatingCashFlow
            | Self::VolatileNetIncome
            | Self::AuditQualified
            | Self::AuditAdverse
            | Self::AuditDisclaimer
            | Self::CapitalImpairmentPartial
            | Self::CapitalImpairmentSevere
            | Self::LeverageHigh
            | Self::LeverageExtreme => RiskCategory::Accounting,
            Self::AdministrativeIssue
            | Self::UnfaithfulDisclosure
            | Self::TradingCaution
            | Self::FrequentCapitalIncrease => RiskCategory::Event,
            Self::LowLiquidity => RiskCategory::Liquidity,
        }
    }

    pub fn severity(self) -> RiskSeverity {
        match self {
            Self::LeverageHigh | Self::LowLiquidity => RiskSeverity::Low,
            Self::VolatileNetIncome
            | Self::AuditQualified
            | Self::CapitalImpairmentPartial
            | Self::TradingCaution
            | Self::FrequentCapitalIncrease => RiskSeverity::Medium,
            Self::NegativeOperatingCashFlow
            | Self::CapitalImpairmentSevere
            | Self::LeverageExtreme
            | Self::UnfaithfulDisclosure => RiskSeverity::High,
            Self::AuditAdverse | Self::AuditDisclaimer | Self::AdministrativeIssue => {
                RiskSeverity::Critical
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NegativeOperatingCashFlow => "negative_operating_cash_flow",
            Self::VolatileNetIncome => "volatile_net_income",
            Self::AuditQualified => "audit_qualified",
            Self::AuditAdverse => "audit_adverse",
            Self::AuditDisclaimer => "audit_disclaimer",
            Self::CapitalImpairmentPartial => "capital_impairment_partial",
            Self::CapitalImpairmentSevere => "capital_impairment_severe",
            Self::LeverageHigh => "leverage_high",
            Self::LeverageExtreme => "leverage_extreme",
            Self::AdministrativeIssue => "administrative_issue",
            Self::UnfaithfulDisclosure => "unfaithful_disclosure",
            Self::TradingCaution => "trading_caution",
            Self::FrequentCapitalIncrease => "frequent_capital_increase",
            Self::LowLiquidity => "low_liquidity",
        }
    }
}

impl fmt::Display for RiskCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One triggered rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReason {
    pub code: RiskCode,
    pub category: RiskCategory,
    pub severity: RiskSeverity,
    /// Deduction (≤ 0)
    pub points: f64,
    pub detail: String,
}

/// Total deduction with itemized reasons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Sum of all deductions (≤ 0)
    pub penalty: f64,
    pub reasons: Vec<RiskReason>,
}

impl RiskAssessment {
    pub fn is_clean(&self) -> bool {
        self.reasons.is_empty()
    }

    /// Whether any accounting rule at High or Critical severity fired.
    pub fn has_severe_accounting_anomaly(&self) -> bool {
        self.reasons.iter().any(|r| {
            r.category == RiskCategory::Accounting && r.severity >= RiskSeverity::High
        })
    }

    pub fn has(&self, code: RiskCode) -> bool {
        self.reasons.iter().any(|r| r.code == code)
    }
}

// ============================================================================
// Evaluator
// ============================================================================

/// Applies the configured deduction rules to a record.
#[derive(Debug, Clone)]
pub struct RiskFlagEvaluator {
    config: RiskConfig,
}

impl RiskFlagEvaluator {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Evaluate every rule against `record`.
    pub fn evaluate(&self, record: &StockRecord) -> RiskAssessment {
        let mut reasons = Vec::new();

        self.accounting_rules(record, &mut reasons);
        self.event_rules(record, &mut reasons);
        self.liquidity_rules(record, &mut reasons);

        let penalty: f64 = reasons.iter().map(|r| r.points).sum();
        let penalty = penalty.min(0.0);

        if !reasons.is_empty() {
            tracing::debug!(
                symbol = %record.symbol,
                penalty,
                codes = ?reasons.iter().map(|r| r.code.as_str()).collect::<Vec<_>>(),
                "Risk flags triggered"
            );
        }

        RiskAssessment { penalty, reasons }
    }

    fn push(&self, reasons: &mut Vec<RiskReason>, code: RiskCode, points: f64, detail: String) {
        reasons.push(RiskReason {
            code,
            category: code.category(),
            severity: code.severity(),
            points: points.min(0.0),
            detail,
        });
    }

    fn accounting_rules(&self, record: &StockRecord, reasons: &mut Vec<RiskReason>) {
        let cfg = &self.config;

        if let Some(ocf) = &record.operating_cash_flows {
            let years = cfg.negative_ocf_years;
            if years > 0 && ocf.len() >= years && ocf[ocf.len() - years..].iter().all(|v| *v < 0.0) {
                self.push(
                    reasons,
                    RiskCode::NegativeOperatingCashFlow,
                    cfg.negative_ocf_points,
                    format!("operating cash flow negative for the last {} years", years),
                );
            }
        }

        if let Some(cv) = record
            .net_incomes
            .as_deref()
            .and_then(|ni| coefficient_of_variation(ni, cfg.net_income_min_years))
        {
            if cv > cfg.net_income_cv_threshold {
                self.push(
                    reasons,
                    RiskCode::VolatileNetIncome,
                    cfg.net_income_volatility_points,
                    format!(
                        "net income CV {:.2} above {:.2}",
                        cv, cfg.net_income_cv_threshold
                    ),
                );
            }
        }

        match record.audit_opinion {
            Some(AuditOpinion::Qualified) => self.push(
                reasons,
                RiskCode::AuditQualified,
                cfg.audit_qualified_points,
                "qualified audit opinion".into(),
            ),
            Some(AuditOpinion::Adverse) => self.push(
                reasons,
                RiskCode::AuditAdverse,
                cfg.audit_adverse_points,
                "adverse audit opinion".into(),
            ),
            Some(AuditOpinion::Disclaimer) => self.push(
                reasons,
                RiskCode::AuditDisclaimer,
                cfg.audit_disclaimer_points,
                "disclaimer of audit opinion".into(),
            ),
            Some(AuditOpinion::Unqualified) | None => {}
        }

        if let Some(ratio) = record.capital_impairment_ratio.filter(|r| r.is_finite()) {
            if ratio >= cfg.impairment_severe_pct {
                self.push(
                    reasons,
                    RiskCode::CapitalImpairmentSevere,
                    cfg.impairment_severe_points,
                    format!("capital impairment {:.1}%", ratio),
                );
            } else if ratio > 0.0 {
                self.push(
                    reasons,
                    RiskCode::CapitalImpairmentPartial,
                    cfg.impairment_partial_points,
                    format!("capital impairment {:.1}%", ratio),
                );
            }
        }

        if let Some(debt) = record.debt_ratio.filter(|d| d.is_finite()) {
            if debt > cfg.leverage_extreme_pct {
                self.push(
                    reasons,
                    RiskCode::LeverageExtreme,
                    cfg.leverage_extreme_points,
                    format!("debt ratio {:.0}% above {:.0}%", debt, cfg.leverage_extreme_pct),
                );
            } else if debt > cfg.leverage_high_pct {
                self.push(
                    reasons,
                    RiskCode::LeverageHigh,
                    cfg.leverage_high_points,
                    format!("debt ratio {:.0}% above {:.0}%", debt, cfg.leverage_high_pct),
                );
            }
        }
    }

    fn event_rules(&self, record: &StockRecord, reasons: &mut Vec<RiskReason>) {
        let cfg = &self.config;
        let flags = record.flags;

        if flags.administrative_issue {
            self.push(
                reasons,
                RiskCode::AdministrativeIssue,
                cfg.administrative_issue_points,
                "designated administrative issue".into(),
            );
        }
        if flags.unfaithful_disclosure {
            self.push(
                reasons,
                RiskCode::UnfaithfulDisclosure,
                cfg.unfaithful_disclosure_points,
                "unfaithful disclosure history".into(),
            );
        }
        if flags.trading_caution {
            self.push(
                reasons,
                RiskCode::TradingCaution,
                cfg.trading_caution_points,
                "investment caution designation".into(),
            );
        }
        if let Some(count) = record.capital_increase_count_3y {
            if count >= cfg.capital_increase_threshold {
                self.push(
                    reasons,
                    RiskCode::FrequentCapitalIncrease,
                    cfg.capital_increase_points,
                    format!("{} capital increases in 3 years", count),
                );
            }
        }
    }

    fn liquidity_rules(&self, record: &StockRecord, reasons: &mut Vec<RiskReason>) {
        if let Some(value) = record.trading_value.filter(|v| v.is_finite()) {
            if value < self.config.min_trading_value {
                self.push(
                    reasons,
                    RiskCode::LowLiquidity,
                    self.config.low_liquidity_points,
                    format!(
                        "trading value {:.0} below {:.0}",
                        value, self.config.min_trading_value
                    ),
                );
            }
        }
    }
}

/// Sample coefficient of variation (`std / |mean|`) of the finite values.
///
/// `None` below `min_len` observations; infinite when the mean is zero.
fn coefficient_of_variation(values: &[f64], min_len: usize) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let n = finite.len();
    if n < min_len.max(2) {
        return None;
    }

    let mean = finite.iter().sum::<f64>() / n as f64;
    let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std = var.sqrt();

    if mean == 0.0 {
        return Some(if std == 0.0 { 0.0 } else { f64::INFINITY });
    }
    Some(std / mean.abs())
}
