//! Point-in-time company snapshot.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sector name used when a record carries no usable sector label.
pub const UNCLASSIFIED_SECTOR: &str = "unclassified";

/// Normalize a raw sector label for grouping.
///
/// Trims, collapses internal whitespace and lowercases. Empty labels map to
/// [`UNCLASSIFIED_SECTOR`].
pub fn normalize_sector(raw: &str) -> String {
    let normalized = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if normalized.is_empty() {
        UNCLASSIFIED_SECTOR.to_string()
    } else {
        normalized
    }
}

/// Sector label as reported upstream plus its normalized grouping key.
///
/// Serialized as the raw string; the normalized form is always derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SectorLabel {
    raw: String,
    normalized: String,
}

impl SectorLabel {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize_sector(&raw);
        Self { raw, normalized }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Grouping key used for distributions and regime lookups.
    pub fn key(&self) -> &str {
        &self.normalized
    }
}

impl Default for SectorLabel {
    fn default() -> Self {
        Self::new("")
    }
}

impl From<String> for SectorLabel {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for SectorLabel {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<SectorLabel> for String {
    fn from(label: SectorLabel) -> Self {
        label.raw
    }
}

impl fmt::Display for SectorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized)
    }
}

/// External auditor's opinion on the latest statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOpinion {
    Unqualified,
    Qualified,
    Adverse,
    Disclaimer,
}

impl fmt::Display for AuditOpinion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unqualified => write!(f, "unqualified"),
            Self::Qualified => write!(f, "qualified"),
            Self::Adverse => write!(f, "adverse"),
            Self::Disclaimer => write!(f, "disclaimer"),
        }
    }
}

/// Exchange designations attached to a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFlags {
    #[serde(default)]
    pub administrative_issue: bool,
    #[serde(default)]
    pub unfaithful_disclosure: bool,
    #[serde(default)]
    pub trading_caution: bool,
}

/// One company's point-in-time snapshot.
///
/// Unknown values are `None`; there are no sentinel numbers. PER/PBR/ROE are
/// optional because providers omit them (e.g. PER for loss-makers) and the
/// quality gate decides whether the record can still be scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sector: SectorLabel,
    pub price: f64,
    #[serde(default)]
    pub market_cap: Option<f64>,

    /// Price / earnings
    #[serde(default)]
    pub per: Option<f64>,
    /// Price / book
    #[serde(default)]
    pub pbr: Option<f64>,
    /// Return on equity (%)
    #[serde(default)]
    pub roe: Option<f64>,

    /// Total liabilities / equity (%)
    #[serde(default)]
    pub debt_ratio: Option<f64>,
    /// Current assets / current liabilities
    #[serde(default)]
    pub current_ratio: Option<f64>,
    /// Annual operating cash flow, oldest first
    #[serde(default)]
    pub operating_cash_flows: Option<Vec<f64>>,
    /// Annual net income, oldest first
    #[serde(default)]
    pub net_incomes: Option<Vec<f64>>,
    #[serde(default)]
    pub audit_opinion: Option<AuditOpinion>,
    /// Impaired share of paid-in capital (%)
    #[serde(default)]
    pub capital_impairment_ratio: Option<f64>,
    /// Paid-in capital increases over the last three years
    #[serde(default)]
    pub capital_increase_count_3y: Option<u32>,

    #[serde(default)]
    pub flags: EventFlags,
    /// Average daily trading value
    #[serde(default)]
    pub trading_value: Option<f64>,

    pub price_asof: NaiveDate,
    pub financial_asof: NaiveDate,
}

impl StockRecord {
    /// Normalized sector key.
    pub fn sector_key(&self) -> &str {
        self.sector.key()
    }

    /// Whether financial data postdates the price observation.
    pub fn has_look_ahead(&self) -> bool {
        self.financial_asof > self.price_asof
    }
}
