//! Batch scoring.
//!
//! Fetches records with bounded concurrency, gates them, publishes the
//! distribution snapshot for the run date, scores every usable record and
//! hands the batch to the calibration monitor.

use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use valscore_common::logging::generate_run_id;
use valscore_common::{Config, MAX_CONCURRENCY};

use super::pipeline::{Exclusion, RecordScorer};
use crate::calibration::{CalibrationHistory, CalibrationMonitor, CalibrationSnapshot, ProposedCutoffs};
use crate::error::EngineError;
use crate::model::{ScoreResult, StockRecord};
use crate::percentile::{DistributionSnapshot, DistributionStore};
use crate::quality::QualityIssue;
use crate::regime::RegimeParameterProvider;
use crate::source::{RecordAssembler, RegimeSource};

// ============================================================================
// Batch Report
// ============================================================================

/// Outcome of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    pub as_of: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Scored records, best total first
    pub scored: Vec<ScoreResult>,
    pub excluded: Vec<Exclusion>,
    /// Excluded records per reason code
    pub exclusion_counts: BTreeMap<String, usize>,
    pub calibration: CalibrationSnapshot,
    pub proposed_cutoffs: Option<ProposedCutoffs>,
    pub distribution_generation: u64,
    pub distribution_as_of: NaiveDate,
    /// Content hash of the snapshot, stable across processes
    pub distribution_fingerprint: String,
    pub config_fingerprint: String,
    /// False if the calibration history could not be appended
    pub history_written: bool,
}

impl BatchReport {
    pub fn scored_count(&self) -> usize {
        self.scored.len()
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        let reasons = self
            .exclusion_counts
            .iter()
            .map(|(code, n)| format!("{}={}", code, n))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Run {} as of {}: {} scored, {} excluded{}",
            self.run_id,
            self.as_of,
            self.scored_count(),
            self.excluded_count(),
            if reasons.is_empty() {
                String::new()
            } else {
                format!(" ({})", reasons)
            }
        )
    }
}

// ============================================================================
// Batch Scorer
// ============================================================================

/// Scores batches against shared distribution and regime caches.
pub struct BatchScorer {
    config: Config,
    scorer: RecordScorer,
    monitor: CalibrationMonitor,
    regimes: Arc<RegimeParameterProvider>,
    distributions: Arc<DistributionStore>,
    regime_source: Option<Arc<dyn RegimeSource>>,
    history: Option<CalibrationHistory>,
    snapshot_file: Option<PathBuf>,
    fingerprint: String,
}

impl BatchScorer {
    /// Build a scorer; an invalid configuration is refused.
    pub fn new(config: Config) -> Result<Self, EngineError> {
        config.validate()?;

        let regimes = RegimeParameterProvider::new(config.regime.clone())?;

        Ok(Self {
            scorer: RecordScorer::new(&config),
            monitor: CalibrationMonitor::new(config.calibration.clone(), config.scoring.max_score),
            regimes: Arc::new(regimes),
            distributions: Arc::new(DistributionStore::new()),
            regime_source: None,
            history: None,
            snapshot_file: None,
            fingerprint: config.fingerprint(),
            config,
        })
    }

    pub fn with_history(mut self, history: CalibrationHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_regime_source(mut self, source: Arc<dyn RegimeSource>) -> Self {
        self.regime_source = Some(source);
        self
    }

    /// Share a distribution store with other scorers.
    pub fn with_distributions(mut self, store: Arc<DistributionStore>) -> Self {
        self.distributions = store;
        self
    }

    /// Save built snapshots to `path`; a cold store restores from it first.
    pub fn with_snapshot_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_file = Some(path.into());
        self
    }

    pub fn regimes(&self) -> &RegimeParameterProvider {
        &self.regimes
    }

    pub fn distributions(&self) -> &DistributionStore {
        &self.distributions
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Worker pool size: configured value, capped by [`MAX_CONCURRENCY`].
    pub fn concurrency(&self) -> usize {
        self.config.batch.max_concurrency.clamp(1, MAX_CONCURRENCY)
    }

    /// Fetch, gate and score `symbols`.
    ///
    /// Upstream failures become exclusions; this never fails for a single record.
    pub async fn run(
        &self,
        symbols: &[String],
        assembler: &RecordAssembler,
        as_of: NaiveDate,
    ) -> BatchReport {
        let started_at = Utc::now();
        let concurrency = self.concurrency();
        info!(symbols = symbols.len(), concurrency, as_of = %as_of, "Starting batch");

        let fetched: Vec<_> = stream::iter(symbols.iter())
            .map(|symbol| async move { (symbol, assembler.assemble(symbol).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut records = Vec::with_capacity(fetched.len());
        let mut excluded = Vec::new();
        for (symbol, result) in fetched {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Record unavailable, excluding");
                    excluded.push(Exclusion::from_provider(symbol, &e));
                }
            }
        }

        self.score_batch(records, excluded, as_of, started_at).await
    }

    /// Gate and score records that were fetched elsewhere.
    pub async fn score_records(&self, records: Vec<StockRecord>, as_of: NaiveDate) -> BatchReport {
        self.score_batch(records, Vec::new(), as_of, Utc::now()).await
    }

    async fn score_batch(
        &self,
        records: Vec<StockRecord>,
        mut excluded: Vec<Exclusion>,
        as_of: NaiveDate,
        started_at: DateTime<Utc>,
    ) -> BatchReport {
        let run_id = generate_run_id();

        let mut usable: Vec<(StockRecord, Vec<QualityIssue>)> = Vec::with_capacity(records.len());
        for record in records {
            let verdict = self.scorer.check(&record, as_of);
            if verdict.usable {
                let warnings = verdict.warnings().cloned().collect();
                usable.push((record, warnings));
            } else {
                let exclusion = Exclusion::from_verdict(&record.symbol, &verdict);
                debug!(symbol = %record.symbol, reasons = ?exclusion.codes(), "Record excluded");
                excluded.push(exclusion);
            }
        }

        let snapshot = self.snapshot_for(as_of, &usable);
        self.refresh_regimes(&usable).await;

        let mut scored: Vec<ScoreResult> = usable
            .into_iter()
            .map(|(record, warnings)| {
                let regime = self.regimes.lookup(record.sector_key());
                self.scorer.score(&record, &snapshot, regime, warnings)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.total_score
                .total_cmp(&a.total_score)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        excluded.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let previous = self.history.as_ref().and_then(|h| match h.latest() {
            Ok(previous) => previous,
            Err(e) => {
                warn!(error = %e, "Could not read calibration history");
                None
            }
        });
        let calibration = self
            .monitor
            .observe(&run_id, &scored, &self.fingerprint, previous.as_ref());
        let totals: Vec<f64> = scored.iter().map(|r| r.total_score).collect();
        let proposed_cutoffs = self.monitor.propose_cutoffs(&totals);

        let history_written = match &self.history {
            Some(history) => match history.append(&calibration) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        path = %history.path().display(),
                        error = %e,
                        "Failed to append calibration history"
                    );
                    false
                }
            },
            None => false,
        };

        let mut exclusion_counts = BTreeMap::new();
        for exclusion in &excluded {
            for code in exclusion.codes() {
                *exclusion_counts.entry(code.to_string()).or_insert(0) += 1;
            }
        }

        let report = BatchReport {
            run_id,
            as_of,
            started_at,
            completed_at: Utc::now(),
            scored,
            excluded,
            exclusion_counts,
            calibration,
            proposed_cutoffs,
            distribution_generation: snapshot.generation,
            distribution_as_of: snapshot.as_of,
            distribution_fingerprint: snapshot.fingerprint(),
            config_fingerprint: self.fingerprint.clone(),
            history_written,
        };

        info!("{}", report.summary());
        report
    }

    /// The published snapshot for `as_of`: in-process first, then the snapshot
    /// file, otherwise built from this batch (and saved).
    fn snapshot_for(
        &self,
        as_of: NaiveDate,
        usable: &[(StockRecord, Vec<QualityIssue>)],
    ) -> Arc<DistributionSnapshot> {
        if let Some(existing) = self.distributions.exact(as_of) {
            debug!(generation = existing.generation, as_of = %as_of, "Reusing distribution snapshot");
            return existing;
        }

        if let Some(path) = &self.snapshot_file {
            match self.distributions.restore(as_of, path) {
                Ok(Some(restored)) => {
                    info!(path = %path.display(), as_of = %as_of, "Restored distribution snapshot");
                    return restored;
                }
                Ok(None) => {}
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not restore distribution snapshot, rebuilding"
                ),
            }
        }

        let universe: Vec<StockRecord> = usable.iter().map(|(r, _)| r.clone()).collect();
        let snapshot = self
            .distributions
            .publish(DistributionSnapshot::build(as_of, &universe));

        if let Some(path) = &self.snapshot_file {
            if let Err(e) = self.distributions.save(as_of, path) {
                warn!(path = %path.display(), error = %e, "Failed to save distribution snapshot");
            }
        }

        snapshot
    }

    /// Queue the batch's stale sectors, then refresh them if a source is wired.
    async fn refresh_regimes(&self, usable: &[(StockRecord, Vec<QualityIssue>)]) {
        let sectors: Vec<String> = usable
            .iter()
            .map(|(r, _)| r.sector_key().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let queued = self.regimes.queue_stale(&sectors);
        let Some(source) = &self.regime_source else {
            if queued > 0 {
                debug!(queued, "No regime source, stale sectors left queued");
            }
            return;
        };

        let summary = self.regimes.refresh_stale(&sectors, source.as_ref()).await;
        for (sector, error) in &summary.failed {
            debug!(sector = %sector, error = %error, "Keeping previous regime parameters");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valscore_common::ScoreWeights;

    #[test]
    fn test_invalid_config_is_refused() {
        let mut config = Config::default();
        config.scoring.weights = ScoreWeights {
            valuation: 50.0,
            ..ScoreWeights::default()
        };
        let err = BatchScorer::new(config).err().unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_concurrency_is_capped() {
        let scorer = BatchScorer::new(Config::default()).unwrap();
        assert_eq!(scorer.concurrency(), Config::default().batch.max_concurrency);
        assert!(scorer.concurrency() <= MAX_CONCURRENCY);
    }

    #[tokio::test]
    async fn test_empty_batch_reports_nothing() {
        let scorer = BatchScorer::new(Config::default()).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let report = scorer.score_records(Vec::new(), as_of).await;

        assert_eq!(report.scored_count(), 0);
        assert_eq!(report.excluded_count(), 0);
        assert!(!report.history_written);
        assert_eq!(report.distribution_generation, 1);
    }

    #[tokio::test]
    async fn test_shared_store_reuses_snapshot() {
        let store = Arc::new(DistributionStore::new());
        let as_of = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

        let a = BatchScorer::new(Config::default())
            .unwrap()
            .with_distributions(store.clone());
        let b = BatchScorer::new(Config::default())
            .unwrap()
            .with_distributions(store.clone());

        let first = a.score_records(Vec::new(), as_of).await;
        let second = b.score_records(Vec::new(), as_of).await;
        assert_eq!(first.distribution_generation, second.distribution_generation);
        assert_eq!(store.exact(as_of).map(|s| s.generation), Some(1));
    }
}
