//! Cached per-sector regime parameters.
//!
//! Lookups never block on a refresh: an entry past the refresh interval is
//! returned flagged stale and its sector is queued for the next
//! [`RegimeParameterProvider::refresh_stale`] call.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use valscore_common::{RegimeConfig, RegimeDefaults, Validate, ValidationError};

use crate::model::normalize_sector;
use crate::source::{ProviderError, RegimeQuote, RegimeSource};

// ============================================================================
// Parameters
// ============================================================================

/// Regime parameter outside its economic domain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegimeError {
    #[error("required return {0} outside (0, 1)")]
    RequiredReturn(f64),
    #[error("retention ratio {0} outside [0, 1)")]
    RetentionRatio(f64),
}

/// Validated (r, b) pair: `0 < r < 1`, `0 <= b < 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RegimeDefaults", into = "RegimeDefaults")]
pub struct RegimeParameters {
    required_return: f64,
    retention_ratio: f64,
}

impl RegimeParameters {
    pub fn new(required_return: f64, retention_ratio: f64) -> Result<Self, RegimeError> {
        if !(required_return > 0.0 && required_return < 1.0) {
            return Err(RegimeError::RequiredReturn(required_return));
        }
        if !(0.0..1.0).contains(&retention_ratio) {
            return Err(RegimeError::RetentionRatio(retention_ratio));
        }
        Ok(Self {
            required_return,
            retention_ratio,
        })
    }

    /// Required return r.
    pub fn required_return(&self) -> f64 {
        self.required_return
    }

    /// Retention ratio b.
    pub fn retention_ratio(&self) -> f64 {
        self.retention_ratio
    }
}

impl TryFrom<RegimeDefaults> for RegimeParameters {
    type Error = RegimeError;

    fn try_from(d: RegimeDefaults) -> Result<Self, Self::Error> {
        Self::new(d.required_return, d.retention_ratio)
    }
}

impl From<RegimeParameters> for RegimeDefaults {
    fn from(p: RegimeParameters) -> Self {
        Self {
            required_return: p.required_return,
            retention_ratio: p.retention_ratio,
        }
    }
}

// ============================================================================
// Lookups
// ============================================================================

/// Where a returned parameter set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeOrigin {
    /// Fetched from the regime source
    Refreshed,
    /// Configured default for the sector
    SectorDefault,
    /// Configured market-wide default
    GlobalDefault,
}

/// Result of a regime lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeLookup {
    pub sector: String,
    pub params: RegimeParameters,
    /// Past the refresh interval, or never refreshed
    pub stale: bool,
    pub origin: RegimeOrigin,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
struct RegimeEntry {
    params: RegimeParameters,
    updated_at: DateTime<Utc>,
}

/// Outcome of a refresh pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshSummary {
    pub refreshed: Vec<String>,
    pub failed: Vec<(String, String)>,
}

// ============================================================================
// Provider
// ============================================================================

/// Per-sector (r, b) cache with configured fallbacks.
pub struct RegimeParameterProvider {
    config: RegimeConfig,
    sector_defaults: HashMap<String, RegimeParameters>,
    global_default: RegimeParameters,
    table: RwLock<Arc<HashMap<String, RegimeEntry>>>,
    pending: Mutex<BTreeSet<String>>,
}

impl RegimeParameterProvider {
    /// Create a provider; invalid configured defaults refuse construction.
    pub fn new(config: RegimeConfig) -> Result<Self, ValidationError> {
        config.validate()?;

        let to_params = |field: String, d: &RegimeDefaults| {
            RegimeParameters::try_from(*d).map_err(|e| ValidationError::InvalidValue {
                field,
                reason: e.to_string(),
            })
        };

        let global_default = to_params("regime.default".into(), &config.default)?;
        let sector_defaults = config
            .sectors
            .iter()
            .map(|(sector, d)| {
                to_params(format!("regime.sectors.{}", sector), d)
                    .map(|p| (normalize_sector(sector), p))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self {
            config,
            sector_defaults,
            global_default,
            table: RwLock::new(Arc::new(HashMap::new())),
            pending: Mutex::new(BTreeSet::new()),
        })
    }

    fn refresh_interval(&self) -> Duration {
        Duration::days(self.config.refresh_interval_days)
    }

    fn snapshot(&self) -> Arc<HashMap<String, RegimeEntry>> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&table)
    }

    fn queue_refresh(&self, sector: &str) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.insert(sector.to_string());
    }

    /// Parameters for `sector`, as of now. A stale sector is queued for refresh.
    pub fn get(&self, sector: &str) -> RegimeLookup {
        self.get_at(sector, Utc::now())
    }

    /// Parameters for `sector` evaluated at `now`, queueing it when stale.
    pub fn get_at(&self, sector: &str, now: DateTime<Utc>) -> RegimeLookup {
        let lookup = self.lookup_at(sector, now);
        if lookup.stale {
            tracing::debug!(
                sector = %lookup.sector,
                origin = ?lookup.origin,
                "Regime parameters stale, reusing and queueing refresh"
            );
            self.queue_refresh(&lookup.sector);
        }
        lookup
    }

    /// Read-only lookup as of now. Never touches the refresh queue.
    pub fn lookup(&self, sector: &str) -> RegimeLookup {
        self.lookup_at(sector, Utc::now())
    }

    pub fn lookup_at(&self, sector: &str, now: DateTime<Utc>) -> RegimeLookup {
        let key = normalize_sector(sector);

        if let Some(entry) = self.snapshot().get(&key).copied() {
            return RegimeLookup {
                stale: now - entry.updated_at > self.refresh_interval(),
                sector: key,
                params: entry.params,
                origin: RegimeOrigin::Refreshed,
                updated_at: Some(entry.updated_at),
            };
        }

        let (params, origin) = match self.sector_defaults.get(&key) {
            Some(params) => (*params, RegimeOrigin::SectorDefault),
            None => (self.global_default, RegimeOrigin::GlobalDefault),
        };

        RegimeLookup {
            sector: key,
            params,
            stale: true,
            origin,
            updated_at: None,
        }
    }

    /// Queue every stale sector among `sectors`; returns how many were queued.
    pub fn queue_stale(&self, sectors: &[String]) -> usize {
        let now = Utc::now();
        let stale: Vec<String> = sectors
            .iter()
            .map(|s| normalize_sector(s))
            .filter(|s| self.is_stale_at(s, now))
            .collect();

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.extend(stale.iter().cloned());
        stale.len()
    }

    /// Whether the parameters for `sector` need a refresh.
    pub fn is_stale(&self, sector: &str) -> bool {
        self.is_stale_at(sector, Utc::now())
    }

    pub fn is_stale_at(&self, sector: &str, now: DateTime<Utc>) -> bool {
        let key = normalize_sector(sector);
        match self.snapshot().get(&key) {
            Some(entry) => now - entry.updated_at > self.refresh_interval(),
            None => true,
        }
    }

    /// Sectors queued for refresh.
    pub fn pending(&self) -> Vec<String> {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.iter().cloned().collect()
    }

    /// Clamp a quote from the regime source into bounds and publish it.
    pub fn install(
        &self,
        sector: &str,
        quote: RegimeQuote,
        updated_at: DateTime<Utc>,
    ) -> Result<RegimeParameters, RegimeError> {
        let key = normalize_sector(sector);

        if !quote.required_return.is_finite() {
            return Err(RegimeError::RequiredReturn(quote.required_return));
        }
        if !quote.retention_ratio.is_finite() {
            return Err(RegimeError::RetentionRatio(quote.retention_ratio));
        }

        let r = self.config.required_return_bounds.clamp(quote.required_return);
        let b = self.config.retention_ratio_bounds.clamp(quote.retention_ratio);
        if r != quote.required_return || b != quote.retention_ratio {
            tracing::warn!(
                sector = %key,
                required_return = quote.required_return,
                retention_ratio = quote.retention_ratio,
                clamped_required_return = r,
                clamped_retention_ratio = b,
                "Regime source value out of bounds, clamped"
            );
        }

        let params = RegimeParameters::new(r, b)?;

        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        let mut next = HashMap::clone(&table);
        next.insert(key.clone(), RegimeEntry { params, updated_at });
        *table = Arc::new(next);
        drop(table);

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(&key);

        Ok(params)
    }

    /// Fetch fresh parameters for one sector under the configured timeout.
    ///
    /// On failure the previous entry (if any) stays in place.
    pub async fn refresh(
        &self,
        sector: &str,
        source: &dyn RegimeSource,
    ) -> Result<RegimeLookup, ProviderError> {
        let key = normalize_sector(sector);
        let timeout = std::time::Duration::from_secs(self.config.refresh_timeout_secs);

        let quote = match tokio::time::timeout(timeout, source.fetch_regime(&key)).await {
            Ok(Ok(quote)) => quote,
            Ok(Err(e)) => {
                tracing::warn!(sector = %key, source = source.name(), error = %e, "Regime refresh failed");
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(sector = %key, source = source.name(), "Regime refresh timed out");
                return Err(ProviderError::Timeout {
                    secs: self.config.refresh_timeout_secs,
                });
            }
        };

        let now = Utc::now();
        self.install(&key, quote, now)
            .map_err(|e| ProviderError::InvalidData(e.to_string()))?;

        Ok(self.lookup_at(&key, now))
    }

    /// Refresh every stale sector among `sectors` plus everything queued.
    pub async fn refresh_stale(&self, sectors: &[String], source: &dyn RegimeSource) -> RefreshSummary {
        let now = Utc::now();
        let mut candidates: BTreeSet<String> = self.pending().into_iter().collect();
        candidates.extend(
            sectors
                .iter()
                .map(|s| normalize_sector(s))
                .filter(|s| self.is_stale_at(s, now)),
        );

        let mut summary = RefreshSummary::default();
        for sector in candidates {
            match self.refresh(&sector, source).await {
                Ok(_) => summary.refreshed.push(sector),
                Err(e) => summary.failed.push((sector, e.to_string())),
            }
        }

        tracing::info!(
            refreshed = summary.refreshed.len(),
            failed = summary.failed.len(),
            "Regime refresh pass complete"
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticRegimeSource;
    use std::collections::BTreeMap;

    fn provider() -> RegimeParameterProvider {
        let mut config = RegimeConfig::default();
        config.sectors.insert(
            "Banks".into(),
            RegimeDefaults {
                required_return: 0.09,
                retention_ratio: 0.5,
            },
        );
        RegimeParameterProvider::new(config).unwrap()
    }

    #[test]
    fn test_parameters_domain() {
        assert!(RegimeParameters::new(0.10, 0.35).is_ok());
        assert_eq!(
            RegimeParameters::new(0.0, 0.35),
            Err(RegimeError::RequiredReturn(0.0))
        );
        assert_eq!(
            RegimeParameters::new(0.10, 1.0),
            Err(RegimeError::RetentionRatio(1.0))
        );
        assert!(RegimeParameters::new(f64::NAN, 0.3).is_err());
    }

    #[test]
    fn test_defaults_when_never_refreshed() {
        let p = provider();
        let banks = p.get(" BANKS ");
        assert_eq!(banks.origin, RegimeOrigin::SectorDefault);
        assert_eq!(banks.params.required_return(), 0.09);
        assert!(banks.stale);

        let other = p.get("steel");
        assert_eq!(other.origin, RegimeOrigin::GlobalDefault);
        assert_eq!(other.params.retention_ratio(), 0.35);
        assert_eq!(p.pending(), vec!["banks".to_string(), "steel".to_string()]);
    }

    #[test]
    fn test_install_clamps_out_of_range_quotes() {
        let p = provider();
        let params = p
            .install(
                "steel",
                RegimeQuote {
                    required_return: -0.05,
                    retention_ratio: 1.4,
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(params.required_return(), 0.02);
        assert_eq!(params.retention_ratio(), 0.95);

        let lookup = p.get("steel");
        assert_eq!(lookup.origin, RegimeOrigin::Refreshed);
        assert!(!lookup.stale);
        assert!(p.pending().is_empty());
    }

    #[test]
    fn test_staleness_after_interval() {
        let p = provider();
        let then = Utc::now() - Duration::days(45);
        p.install(
            "steel",
            RegimeQuote {
                required_return: 0.11,
                retention_ratio: 0.3,
            },
            then,
        )
        .unwrap();

        assert!(p.is_stale("steel"));
        assert!(!p.is_stale_at("steel", then + Duration::days(10)));

        let lookup = p.get("steel");
        assert!(lookup.stale);
        assert_eq!(lookup.params.required_return(), 0.11);
        assert_eq!(p.pending(), vec!["steel".to_string()]);
    }

    #[test]
    fn test_lookup_leaves_queue_untouched() {
        let p = provider();
        let banks = p.lookup("Banks");
        assert_eq!(banks.origin, RegimeOrigin::SectorDefault);
        assert!(banks.stale);
        assert!(p.lookup("steel").stale);
        assert!(p.pending().is_empty());
    }

    #[test]
    fn test_queue_stale_skips_fresh_sectors() {
        let p = provider();
        p.install(
            "steel",
            RegimeQuote {
                required_return: 0.11,
                retention_ratio: 0.3,
            },
            Utc::now(),
        )
        .unwrap();

        let sectors = vec!["Steel".to_string(), "Banks".to_string(), "retail".to_string()];
        assert_eq!(p.queue_stale(&sectors), 2);
        assert_eq!(p.pending(), vec!["banks".to_string(), "retail".to_string()]);
    }

    #[test]
    fn test_non_finite_quote_rejected() {
        let p = provider();
        let result = p.install(
            "steel",
            RegimeQuote {
                required_return: f64::NAN,
                retention_ratio: 0.3,
            },
            Utc::now(),
        );
        assert!(result.is_err());
        assert_eq!(p.get("steel").origin, RegimeOrigin::GlobalDefault);
    }

    #[test]
    fn test_invalid_default_refuses_start() {
        let mut config = RegimeConfig::default();
        config.default.required_return = 1.5;
        assert!(RegimeParameterProvider::new(config).is_err());
    }

    #[tokio::test]
    async fn test_refresh_stale_uses_source() {
        let p = provider();
        let mut quotes = BTreeMap::new();
        quotes.insert(
            "banks".to_string(),
            RegimeQuote {
                required_return: 0.08,
                retention_ratio: 0.4,
            },
        );
        let source = StaticRegimeSource::new(quotes);

        let summary = p
            .refresh_stale(&["Banks".to_string(), "steel".to_string()], &source)
            .await;

        assert_eq!(summary.refreshed, vec!["banks".to_string()]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "steel");

        let banks = p.get("banks");
        assert_eq!(banks.origin, RegimeOrigin::Refreshed);
        assert_eq!(banks.params.required_return(), 0.08);
        assert_eq!(p.get("steel").origin, RegimeOrigin::GlobalDefault);
    }
}
