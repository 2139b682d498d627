//! Record assembly from market and filings providers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use valscore_common::BatchConfig;

use super::{FilingsProvider, FilingsSnapshot, MarketDataProvider, ProviderError};
use crate::model::StockRecord;

/// Fetches and merges one record per symbol.
///
/// Every upstream call runs under a timeout; recoverable failures are retried
/// up to `retries` more times. A filings failure degrades to a record without
/// extended fields, while a market-data failure makes the record unavailable.
pub struct RecordAssembler {
    market: Arc<dyn MarketDataProvider>,
    filings: Option<Arc<dyn FilingsProvider>>,
    timeout: Duration,
    retries: u32,
}

impl RecordAssembler {
    pub fn new(market: Arc<dyn MarketDataProvider>, timeout: Duration, retries: u32) -> Self {
        Self {
            market,
            filings: None,
            timeout,
            retries,
        }
    }

    /// Timeout and retry policy from batch configuration.
    pub fn from_config(market: Arc<dyn MarketDataProvider>, config: &BatchConfig) -> Self {
        Self::new(
            market,
            Duration::from_secs(config.fetch_timeout_secs),
            config.fetch_retries,
        )
    }

    pub fn with_filings(mut self, filings: Arc<dyn FilingsProvider>) -> Self {
        self.filings = Some(filings);
        self
    }

    /// Fetch and merge the record for `symbol`.
    pub async fn assemble(&self, symbol: &str) -> Result<StockRecord, ProviderError> {
        let market = self.with_retries("market", symbol, || self.market.fetch_market(symbol));
        let filings = self.fetch_filings(symbol);

        let (market, filings) = tokio::join!(market, filings);
        Ok(StockRecord::from_parts(market?, filings))
    }

    async fn fetch_filings(&self, symbol: &str) -> Option<FilingsSnapshot> {
        let provider = self.filings.as_ref()?;

        match self
            .with_retries("filings", symbol, || provider.fetch_filings(symbol))
            .await
        {
            Ok(filings) => Some(filings),
            Err(ProviderError::NotFound(_)) => {
                tracing::debug!(symbol, provider = provider.name(), "No filings on record");
                None
            }
            Err(e) => {
                tracing::warn!(
                    symbol,
                    provider = provider.name(),
                    error = %e,
                    "Filings unavailable, continuing without extended fields"
                );
                None
            }
        }
    }

    async fn with_retries<T, F, Fut>(
        &self,
        what: &str,
        symbol: &str,
        mut call: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            let err = match tokio::time::timeout(self.timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout {
                    secs: self.timeout.as_secs(),
                },
            };

            if !err.is_recoverable() || attempt >= self.retries {
                return Err(err);
            }

            attempt += 1;
            tracing::debug!(
                symbol,
                source = what,
                attempt,
                error = %err,
                "Retrying upstream fetch"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MarketSnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyMarket {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl MarketDataProvider for FlakyMarket {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch_market(&self, symbol: &str) -> Result<MarketSnapshot, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(ProviderError::Network("connection reset".into()));
            }
            Ok(MarketSnapshot {
                symbol: symbol.to_string(),
                price: 1000.0,
                ..MarketSnapshot::default()
            })
        }
    }

    struct SlowFilings;

    #[async_trait]
    impl FilingsProvider for SlowFilings {
        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch_filings(&self, _symbol: &str) -> Result<FilingsSnapshot, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(FilingsSnapshot::default())
        }
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let market = Arc::new(FlakyMarket {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        let assembler = RecordAssembler::new(market.clone(), Duration::from_secs(1), 1);

        let record = assembler.assemble("A").await.unwrap();
        assert_eq!(record.symbol, "A");
        assert_eq!(market.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let market = Arc::new(FlakyMarket {
            failures: 5,
            calls: AtomicU32::new(0),
        });
        let assembler = RecordAssembler::new(market.clone(), Duration::from_secs(1), 2);

        let err = assembler.assemble("A").await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
        assert_eq!(market.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_filings_timeout_degrades() {
        let market = Arc::new(FlakyMarket {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let assembler = RecordAssembler::new(market, Duration::from_millis(100), 0)
            .with_filings(Arc::new(SlowFilings));

        let record = assembler.assemble("A").await.unwrap();
        assert!(record.debt_ratio.is_none());
    }
}
