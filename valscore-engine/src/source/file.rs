//! File- and map-backed sources for offline runs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use super::{
    FilingsProvider, FilingsSnapshot, MarketDataProvider, MarketSnapshot, ProviderError,
    RegimeQuote, RegimeSource,
};
use crate::model::{normalize_sector, StockRecord};

/// Serves records loaded from a JSON array of [`StockRecord`]s.
///
/// Acts as both market-data and filings provider so offline runs go through
/// the same assembly path as live ones.
pub struct JsonFileSource {
    records: HashMap<String, StockRecord>,
}

impl JsonFileSource {
    /// Load records from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read records from {}", path.display()))?;
        let records: Vec<StockRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse records from {}", path.display()))?;

        tracing::info!(path = %path.display(), count = records.len(), "Loaded records");
        Ok(Self::from_records(records))
    }

    /// Later duplicates of a symbol replace earlier ones.
    pub fn from_records(records: Vec<StockRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| (r.symbol.clone(), r))
                .collect(),
        }
    }

    /// All symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.records.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn lookup(&self, symbol: &str) -> Result<&StockRecord, ProviderError> {
        self.records
            .get(symbol)
            .ok_or_else(|| ProviderError::NotFound(symbol.to_string()))
    }
}

#[async_trait]
impl MarketDataProvider for JsonFileSource {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn fetch_market(&self, symbol: &str) -> Result<MarketSnapshot, ProviderError> {
        let r = self.lookup(symbol)?;
        Ok(MarketSnapshot {
            symbol: r.symbol.clone(),
            name: r.name.clone(),
            sector: r.sector.raw().to_string(),
            price: r.price,
            market_cap: r.market_cap,
            per: r.per,
            pbr: r.pbr,
            roe: r.roe,
            trading_value: r.trading_value,
            flags: r.flags,
            price_asof: r.price_asof,
            financial_asof: r.financial_asof,
        })
    }
}

#[async_trait]
impl FilingsProvider for JsonFileSource {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn fetch_filings(&self, symbol: &str) -> Result<FilingsSnapshot, ProviderError> {
        let r = self.lookup(symbol)?;
        Ok(FilingsSnapshot {
            debt_ratio: r.debt_ratio,
            current_ratio: r.current_ratio,
            operating_cash_flows: r.operating_cash_flows.clone(),
            net_incomes: r.net_incomes.clone(),
            audit_opinion: r.audit_opinion,
            capital_impairment_ratio: r.capital_impairment_ratio,
            capital_increase_count_3y: r.capital_increase_count_3y,
        })
    }
}

/// Regime source backed by a fixed sector → quote map.
pub struct StaticRegimeSource {
    quotes: BTreeMap<String, RegimeQuote>,
}

impl StaticRegimeSource {
    /// Keys are normalized on construction.
    pub fn new(quotes: BTreeMap<String, RegimeQuote>) -> Self {
        Self {
            quotes: quotes
                .into_iter()
                .map(|(sector, quote)| (normalize_sector(&sector), quote))
                .collect(),
        }
    }

    /// Load a `{ "sector": { "required_return": .., "retention_ratio": .. } }` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read regimes from {}", path.display()))?;
        let quotes: BTreeMap<String, RegimeQuote> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse regimes from {}", path.display()))?;
        Ok(Self::new(quotes))
    }
}

#[async_trait]
impl RegimeSource for StaticRegimeSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_regime(&self, sector: &str) -> Result<RegimeQuote, ProviderError> {
        self.quotes
            .get(&normalize_sector(sector))
            .copied()
            .ok_or_else(|| ProviderError::NotFound(format!("no regime for sector {}", sector)))
    }
}
