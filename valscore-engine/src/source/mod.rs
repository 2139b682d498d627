//! Upstream collaborators.
//!
//! The engine consumes three black-box sources:
//! - [`MarketDataProvider`]: price, multiples, timestamps, exchange flags
//! - [`FilingsProvider`]: slower-moving accounting fields
//! - [`RegimeSource`]: per-sector (r, b) refresh values
//!
//! [`RecordAssembler`] merges the first two into a [`StockRecord`] under
//! timeouts and retries.

mod assembler;
mod file;

pub use assembler::RecordAssembler;
pub use file::{JsonFileSource, StaticRegimeSource};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{AuditOpinion, EventFlags, StockRecord};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors from upstream collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network error (connection failed, reset)
    Network(String),
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// No data for the requested key
    NotFound(String),
    /// Provider is temporarily unavailable
    Unavailable(String),
    /// Response could not be used
    InvalidData(String),
    /// Call exceeded its timeout
    Timeout { secs: u64 },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            Self::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            Self::Timeout { secs } => write!(f, "Timed out after {} seconds", secs),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Check if the error is worth retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_) | Self::Timeout { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// ============================================================================
// Upstream Payloads
// ============================================================================

/// Fields served by the market-data provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub price: f64,
    pub market_cap: Option<f64>,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub roe: Option<f64>,
    pub trading_value: Option<f64>,
    pub flags: EventFlags,
    pub price_asof: NaiveDate,
    pub financial_asof: NaiveDate,
}

/// Fields served by the filings provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilingsSnapshot {
    pub debt_ratio: Option<f64>,
    pub current_ratio: Option<f64>,
    pub operating_cash_flows: Option<Vec<f64>>,
    pub net_incomes: Option<Vec<f64>>,
    pub audit_opinion: Option<AuditOpinion>,
    pub capital_impairment_ratio: Option<f64>,
    pub capital_increase_count_3y: Option<u32>,
}

/// Raw (r, b) from a regime source; may be out of range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeQuote {
    pub required_return: f64,
    pub retention_ratio: f64,
}

impl StockRecord {
    /// Merge market fields with optional filings fields.
    pub fn from_parts(market: MarketSnapshot, filings: Option<FilingsSnapshot>) -> Self {
        let filings = filings.unwrap_or_default();
        Self {
            symbol: market.symbol,
            name: market.name,
            sector: market.sector.into(),
            price: market.price,
            market_cap: market.market_cap,
            per: market.per,
            pbr: market.pbr,
            roe: market.roe,
            debt_ratio: filings.debt_ratio,
            current_ratio: filings.current_ratio,
            operating_cash_flows: filings.operating_cash_flows,
            net_incomes: filings.net_incomes,
            audit_opinion: filings.audit_opinion,
            capital_impairment_ratio: filings.capital_impairment_ratio,
            capital_increase_count_3y: filings.capital_increase_count_3y,
            flags: market.flags,
            trading_value: market.trading_value,
            price_asof: market.price_asof,
            financial_asof: market.financial_asof,
        }
    }
}

// ============================================================================
// Provider Traits
// ============================================================================

/// Market-data collaborator (rate-limited upstream).
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Fetch the current snapshot for a symbol.
    async fn fetch_market(&self, symbol: &str) -> Result<MarketSnapshot, ProviderError>;
}

/// Filings / financial-statement collaborator.
#[async_trait]
pub trait FilingsProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the latest extended accounting fields for a symbol.
    async fn fetch_filings(&self, symbol: &str) -> Result<FilingsSnapshot, ProviderError>;
}

/// Source of refreshed regime parameters.
#[async_trait]
pub trait RegimeSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch (r, b) for a normalized sector key.
    async fn fetch_regime(&self, sector: &str) -> Result<RegimeQuote, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(ProviderError::Timeout { secs: 5 }.is_recoverable());
        assert!(ProviderError::RateLimited { retry_after_secs: None }.is_recoverable());
        assert!(!ProviderError::NotFound("x".into()).is_recoverable());
        assert!(!ProviderError::InvalidData("x".into()).is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = ProviderError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert_eq!(err.to_string(), "Rate limited, retry after 30 seconds");
        assert_eq!(
            ProviderError::Timeout { secs: 15 }.to_string(),
            "Timed out after 15 seconds"
        );
    }

    #[test]
    fn test_from_parts_without_filings() {
        let market = MarketSnapshot {
            symbol: "000660".into(),
            sector: "Semiconductors".into(),
            price: 180_000.0,
            per: Some(9.0),
            ..MarketSnapshot::default()
        };
        let record = StockRecord::from_parts(market, None);
        assert_eq!(record.sector_key(), "semiconductors");
        assert_eq!(record.per, Some(9.0));
        assert!(record.audit_opinion.is_none());
        assert!(record.debt_ratio.is_none());
    }
}
