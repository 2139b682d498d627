//! Data quality guard.
//!
//! Rejects records that must not reach scoring: stale, look-ahead, placeholder
//! or implausible data. Rejection is never clipping; controlled winsorization
//! belongs to the valuation calculator.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use valscore_common::{Bounds, DataQualityConfig};

use crate::model::StockRecord;

// ============================================================================
// Types
// ============================================================================

/// Quality issue reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCode {
    MissingMetric,
    NonFinite,
    StalePrice,
    StaleFinancials,
    FutureDated,
    LookAhead,
    Placeholder,
    Implausible,
    MissingExtended,
}

impl QualityCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingMetric => "missing_metric",
            Self::NonFinite => "non_finite",
            Self::StalePrice => "stale_price",
            Self::StaleFinancials => "stale_financials",
            Self::FutureDated => "future_dated",
            Self::LookAhead => "look_ahead",
            Self::Placeholder => "placeholder",
            Self::Implausible => "implausible",
            Self::MissingExtended => "missing_extended",
        }
    }
}

impl fmt::Display for QualityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Recorded, scoring continues
    Warn,
    /// Record excluded from scoring
    Reject,
}

/// One finding of the quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub code: QualityCode,
    pub severity: IssueSeverity,
    pub field: Option<String>,
    pub detail: String,
}

impl QualityIssue {
    fn reject(code: QualityCode, field: Option<&str>, detail: String) -> Self {
        Self {
            code,
            severity: IssueSeverity::Reject,
            field: field.map(str::to_string),
            detail,
        }
    }

    fn warn(code: QualityCode, field: Option<&str>, detail: String) -> Self {
        Self {
            code,
            severity: IssueSeverity::Warn,
            field: field.map(str::to_string),
            detail,
        }
    }

    pub fn is_rejection(&self) -> bool {
        self.severity == IssueSeverity::Reject
    }
}

/// Outcome of a quality check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub usable: bool,
    pub issues: Vec<QualityIssue>,
}

impl QualityVerdict {
    pub fn rejections(&self) -> impl Iterator<Item = &QualityIssue> {
        self.issues.iter().filter(|i| i.is_rejection())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &QualityIssue> {
        self.issues.iter().filter(|i| !i.is_rejection())
    }

    pub fn has(&self, code: QualityCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

/// Weekdays strictly after `from`, up to and including `to`.
///
/// Exchange holidays are not modelled.
pub fn trading_days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    if to <= from {
        return 0;
    }
    let total = (to - from).num_days();
    // Whole weeks hold five weekdays; only the remainder needs a walk.
    let start = i64::from(from.weekday().num_days_from_monday());
    let tail = (1..=total % 7).filter(|k| (start + k) % 7 < 5).count() as i64;
    total / 7 * 5 + tail
}

// ============================================================================
// Guard
// ============================================================================

/// Pre-scoring quality gate.
#[derive(Debug, Clone)]
pub struct DataQualityGuard {
    config: DataQualityConfig,
}

impl DataQualityGuard {
    pub fn new(config: DataQualityConfig) -> Self {
        Self { config }
    }

    /// Check a record as of `today`. Every check runs so the reason list is complete.
    pub fn check(&self, record: &StockRecord, today: NaiveDate) -> QualityVerdict {
        let mut issues = Vec::new();

        self.check_core_metrics(record, &mut issues);
        self.check_dates(record, today, &mut issues);
        self.check_placeholders(record, &mut issues);
        self.check_extended(record, &mut issues);

        let usable = !issues.iter().any(QualityIssue::is_rejection);
        if !usable {
            tracing::debug!(
                symbol = %record.symbol,
                reasons = ?issues
                    .iter()
                    .filter(|i| i.is_rejection())
                    .map(|i| i.code.as_str())
                    .collect::<Vec<_>>(),
                "Record rejected by quality gate"
            );
        }

        QualityVerdict { usable, issues }
    }

    fn check_core_metrics(&self, record: &StockRecord, issues: &mut Vec<QualityIssue>) {
        if !record.price.is_finite() {
            issues.push(QualityIssue::reject(
                QualityCode::NonFinite,
                Some("price"),
                format!("price = {}", record.price),
            ));
        } else if record.price <= 0.0 {
            issues.push(QualityIssue::reject(
                QualityCode::Implausible,
                Some("price"),
                format!("price = {} is not positive", record.price),
            ));
        }

        let metrics: [(&str, Option<f64>, Bounds); 3] = [
            ("per", record.per, self.config.per_range),
            ("pbr", record.pbr, self.config.pbr_range),
            ("roe", record.roe, self.config.roe_range),
        ];

        for (field, value, range) in metrics {
            match value {
                None => issues.push(QualityIssue::reject(
                    QualityCode::MissingMetric,
                    Some(field),
                    format!("{} not reported", field),
                )),
                Some(v) if !v.is_finite() => issues.push(QualityIssue::reject(
                    QualityCode::NonFinite,
                    Some(field),
                    format!("{} = {}", field, v),
                )),
                Some(v) if !range.contains(v) => issues.push(QualityIssue::reject(
                    QualityCode::Implausible,
                    Some(field),
                    format!("{} = {} outside [{}, {}]", field, v, range.min, range.max),
                )),
                Some(_) => {}
            }
        }
    }

    fn check_dates(&self, record: &StockRecord, today: NaiveDate, issues: &mut Vec<QualityIssue>) {
        if record.has_look_ahead() {
            issues.push(QualityIssue::reject(
                QualityCode::LookAhead,
                Some("financial_asof"),
                format!(
                    "financial_asof {} is after price_asof {}",
                    record.financial_asof, record.price_asof
                ),
            ));
        }

        if record.price_asof > today {
            issues.push(QualityIssue::reject(
                QualityCode::FutureDated,
                Some("price_asof"),
                format!("price_asof {} is after {}", record.price_asof, today),
            ));
        }

        let price_age = trading_days_between(record.price_asof, today);
        if price_age > self.config.max_price_age_trading_days {
            issues.push(QualityIssue::reject(
                QualityCode::StalePrice,
                Some("price_asof"),
                format!(
                    "price is {} trading days old (max {})",
                    price_age, self.config.max_price_age_trading_days
                ),
            ));
        }

        let financial_age = (today - record.financial_asof).num_days();
        if financial_age > self.config.max_financial_age_days {
            issues.push(QualityIssue::reject(
                QualityCode::StaleFinancials,
                Some("financial_asof"),
                format!(
                    "financials are {} days old (max {})",
                    financial_age, self.config.max_financial_age_days
                ),
            ));
        }
    }

    fn check_placeholders(&self, record: &StockRecord, issues: &mut Vec<QualityIssue>) {
        let ratios: Vec<(&str, f64)> = [
            ("per", record.per),
            ("pbr", record.pbr),
            ("roe", record.roe),
            ("debt_ratio", record.debt_ratio),
            ("current_ratio", record.current_ratio),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
        .collect();

        for &placeholder in &self.config.placeholder_values {
            let matching: Vec<&str> = ratios
                .iter()
                .filter(|(_, v)| *v == placeholder)
                .map(|(field, _)| *field)
                .collect();

            if matching.len() >= 2 {
                issues.push(QualityIssue::reject(
                    QualityCode::Placeholder,
                    None,
                    format!("{} all equal placeholder value {}", matching.join(", "), placeholder),
                ));
            }
        }

        if record.per == Some(0.0) && record.pbr == Some(0.0) && record.roe == Some(0.0) {
            issues.push(QualityIssue::reject(
                QualityCode::Placeholder,
                None,
                "per, pbr, roe all exactly zero".to_string(),
            ));
        }
    }

    fn check_extended(&self, record: &StockRecord, issues: &mut Vec<QualityIssue>) {
        let missing: Vec<&str> = [
            ("debt_ratio", record.debt_ratio.is_none()),
            ("current_ratio", record.current_ratio.is_none()),
            ("operating_cash_flows", record.operating_cash_flows.is_none()),
            ("net_incomes", record.net_incomes.is_none()),
            ("audit_opinion", record.audit_opinion.is_none()),
        ]
        .into_iter()
        .filter(|(_, absent)| *absent)
        .map(|(field, _)| field)
        .collect();

        if !missing.is_empty() {
            issues.push(QualityIssue::warn(
                QualityCode::MissingExtended,
                None,
                format!("not reported: {}", missing.join(", ")),
            ));
        }

        let extended = [
            ("debt_ratio", record.debt_ratio),
            ("current_ratio", record.current_ratio),
            ("trading_value", record.trading_value),
            ("capital_impairment_ratio", record.capital_impairment_ratio),
        ];
        for (field, value) in extended {
            if let Some(v) = value.filter(|v| !v.is_finite()) {
                issues.push(QualityIssue::reject(
                    QualityCode::NonFinite,
                    Some(field),
                    format!("{} = {}", field, v),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuditOpinion;
    use test_case::test_case;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Thursday 2026-10-15.
    fn today() -> NaiveDate {
        d(2026, 10, 15)
    }

    fn good_record() -> StockRecord {
        StockRecord {
            symbol: "105560".into(),
            sector: "Banks".into(),
            price: 60_000.0,
            per: Some(6.0),
            pbr: Some(0.5),
            roe: Some(12.0),
            debt_ratio: Some(150.0),
            current_ratio: Some(1.2),
            operating_cash_flows: Some(vec![1.0, 2.0, 3.0]),
            net_incomes: Some(vec![1.0, 1.1, 1.2]),
            audit_opinion: Some(AuditOpinion::Unqualified),
            trading_value: Some(5e9),
            price_asof: today(),
            financial_asof: d(2026, 6, 30),
            ..StockRecord::default()
        }
    }

    fn guard() -> DataQualityGuard {
        DataQualityGuard::new(DataQualityConfig::default())
    }

    #[test]
    fn test_clean_record_is_usable() {
        let verdict = guard().check(&good_record(), today());
        assert!(verdict.usable);
        assert!(verdict.issues.is_empty());
    }

    #[test]
    fn test_look_ahead_rejected() {
        let mut record = good_record();
        record.financial_asof = record.price_asof.succ_opt().unwrap();
        let verdict = guard().check(&record, today());
        assert!(!verdict.usable);
        assert!(verdict.has(QualityCode::LookAhead));
    }

    #[test_case(d(2026, 10, 12), true ; "three trading days")]
    #[test_case(d(2026, 10, 9), false ; "four trading days over a weekend")]
    fn test_price_freshness(price_asof: NaiveDate, usable: bool) {
        let mut record = good_record();
        record.price_asof = price_asof;
        assert_eq!(guard().check(&record, today()).usable, usable);
    }

    #[test]
    fn test_stale_financials() {
        let mut record = good_record();
        record.financial_asof = d(2026, 3, 31);
        let verdict = guard().check(&record, today());
        assert!(verdict.has(QualityCode::StaleFinancials));
    }

    #[test]
    fn test_shared_placeholder_rejected() {
        let mut record = good_record();
        record.per = Some(999.0);
        record.debt_ratio = Some(999.0);
        let verdict = guard().check(&record, today());
        assert!(!verdict.usable);
        assert!(verdict.has(QualityCode::Placeholder));
    }

    #[test]
    fn test_single_placeholder_value_alone_is_not_flagged() {
        let mut record = good_record();
        record.debt_ratio = Some(150.0);
        record.per = Some(15.0);
        assert!(guard().check(&record, today()).usable);
    }

    #[test]
    fn test_all_zero_core_metrics_rejected() {
        let mut record = good_record();
        record.per = Some(0.0);
        record.pbr = Some(0.0);
        record.roe = Some(0.0);
        assert!(guard().check(&record, today()).has(QualityCode::Placeholder));
    }

    #[test]
    fn test_implausible_rejected_not_clipped() {
        let mut record = good_record();
        record.pbr = Some(250.0);
        let verdict = guard().check(&record, today());
        assert!(!verdict.usable);
        assert!(verdict.has(QualityCode::Implausible));
        assert_eq!(record.pbr, Some(250.0));
    }

    #[test]
    fn test_missing_extended_is_warning_only() {
        let mut record = good_record();
        record.debt_ratio = None;
        record.audit_opinion = None;
        let verdict = guard().check(&record, today());
        assert!(verdict.usable);
        let warning = verdict.warnings().next().unwrap();
        assert_eq!(warning.code, QualityCode::MissingExtended);
        assert!(warning.detail.contains("debt_ratio"));
    }

    #[test]
    fn test_all_reasons_collected() {
        let mut record = good_record();
        record.roe = None;
        record.financial_asof = d(2026, 10, 16);
        let verdict = guard().check(&record, today());
        let codes: Vec<QualityCode> = verdict.rejections().map(|i| i.code).collect();
        assert!(codes.contains(&QualityCode::MissingMetric));
        assert!(codes.contains(&QualityCode::LookAhead));
    }

    #[test]
    fn test_trading_days_between() {
        // Fri 2026-10-09 → Thu 2026-10-15: Mon..Thu
        assert_eq!(trading_days_between(d(2026, 10, 9), d(2026, 10, 15)), 4);
        assert_eq!(trading_days_between(d(2026, 10, 15), d(2026, 10, 15)), 0);
        assert_eq!(trading_days_between(d(2026, 10, 16), d(2026, 10, 15)), 0);
    }

    fn weekdays_by_walking(from: NaiveDate, to: NaiveDate) -> i64 {
        from.iter_days()
            .skip(1)
            .take_while(|day| *day <= to)
            .filter(|day| day.weekday().num_days_from_monday() < 5)
            .count() as i64
    }

    #[test_case(2026, 10, 10, 2026, 10, 11, 0 ; "saturday to sunday")]
    #[test_case(2026, 10, 10, 2026, 10, 12, 1 ; "weekend into monday")]
    #[test_case(2026, 10, 16, 2026, 10, 19, 1 ; "friday over the weekend")]
    #[test_case(2026, 10, 12, 2026, 10, 26, 10 ; "two whole weeks")]
    #[test_case(2024, 1, 1, 2043, 3, 2, 5000 ; "thousand weeks")]
    fn test_trading_days_table(y1: i32, m1: u32, d1: u32, y2: i32, m2: u32, d2: u32, expected: i64) {
        assert_eq!(trading_days_between(d(y1, m1, d1), d(y2, m2, d2)), expected);
    }

    #[test]
    fn test_trading_days_from_distant_past() {
        let ancient = d(1, 1, 1);
        let today = d(2026, 10, 16);
        let split = d(1900, 1, 1);
        let total = trading_days_between(ancient, today);
        assert_eq!(
            total,
            trading_days_between(ancient, split) + trading_days_between(split, today)
        );
        assert_eq!(
            trading_days_between(split, today),
            weekdays_by_walking(split, today)
        );
        assert_eq!(total, 528_504);
    }

    proptest::proptest! {
        #[test]
        fn prop_trading_days_match_calendar_walk(start in 0i64..20_000, span in 0i64..90) {
            let from = d(1990, 1, 1) + chrono::Duration::days(start);
            let to = from + chrono::Duration::days(span);
            proptest::prop_assert_eq!(trading_days_between(from, to), weekdays_by_walking(from, to));
        }
    }
}
