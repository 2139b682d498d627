//! Auditable JSON export of a batch run.
//!
//! Every exported record carries the raw inputs needed to re-derive its
//! score, and the bundle carries a version stamp so two exports can be
//! diffed for reproducibility.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::{Confidence, DowngradeCause, Grade, Recommendation, ScoreResult, SubScores};
use crate::risk::RiskReason;
use crate::scoring::{BatchReport, Exclusion};

/// Engine version baked into every stamp.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Version Stamp
// ============================================================================

/// Identifies the inputs and configuration behind an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataVersionStamp {
    pub run_id: String,
    pub computed_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    /// Latest price date among exported records
    pub price_cutoff: Option<NaiveDate>,
    /// Latest financial statement date among exported records
    pub financial_cutoff: Option<NaiveDate>,
    /// SHA-256 of the scoring configuration
    pub config_fingerprint: String,
    pub distribution_generation: u64,
    pub distribution_as_of: NaiveDate,
    /// SHA-256 of the distributions every percentile was ranked against
    pub distribution_fingerprint: String,
    pub engine_version: String,
}

impl DataVersionStamp {
    /// Whether two exports were produced from the same data and configuration.
    ///
    /// Run identity, wall-clock time and the in-process generation counter
    /// are ignored.
    pub fn same_inputs(&self, other: &Self) -> bool {
        self.as_of == other.as_of
            && self.price_cutoff == other.price_cutoff
            && self.financial_cutoff == other.financial_cutoff
            && self.config_fingerprint == other.config_fingerprint
            && self.distribution_as_of == other.distribution_as_of
            && self.distribution_fingerprint == other.distribution_fingerprint
            && self.engine_version == other.engine_version
    }
}

// ============================================================================
// Export Record
// ============================================================================

/// One scored record, flattened for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub roe: Option<f64>,
    pub price_asof: NaiveDate,
    pub financial_asof: NaiveDate,
    pub required_return: f64,
    pub retention_ratio: f64,
    pub regime_stale: bool,
    pub sub_scores: SubScores,
    pub base_score: f64,
    pub risk_penalty: f64,
    pub total_score: f64,
    pub grade: Grade,
    pub recommendation: Recommendation,
    pub downgrade: Option<DowngradeCause>,
    pub confidence: Confidence,
    pub sector_sample_size: usize,
    pub valuation_diagnostic: String,
    pub risk_reasons: Vec<RiskReason>,
}

impl From<&ScoreResult> for ExportRecord {
    fn from(r: &ScoreResult) -> Self {
        Self {
            symbol: r.symbol.clone(),
            name: r.name.clone(),
            sector: r.sector.clone(),
            per: r.per,
            pbr: r.pbr,
            roe: r.roe,
            price_asof: r.price_asof,
            financial_asof: r.financial_asof,
            required_return: r.regime.params.required_return(),
            retention_ratio: r.regime.params.retention_ratio(),
            regime_stale: r.regime.stale,
            sub_scores: r.sub_scores,
            base_score: r.base_score,
            risk_penalty: r.risk_penalty,
            total_score: r.total_score,
            grade: r.grade,
            recommendation: r.recommendation,
            downgrade: r.downgrade,
            confidence: r.confidence,
            sector_sample_size: r.sector_sample_size,
            valuation_diagnostic: r.valuation.diagnostic.code().to_string(),
            risk_reasons: r.risk_reasons.clone(),
        }
    }
}

// ============================================================================
// Export Bundle
// ============================================================================

/// Stamp plus records plus exclusions for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub stamp: DataVersionStamp,
    pub records: Vec<ExportRecord>,
    pub exclusions: Vec<Exclusion>,
}

impl ExportBundle {
    pub fn from_report(report: &BatchReport) -> Self {
        let stamp = DataVersionStamp {
            run_id: report.run_id.clone(),
            computed_at: report.completed_at,
            as_of: report.as_of,
            price_cutoff: report.scored.iter().map(|r| r.price_asof).max(),
            financial_cutoff: report.scored.iter().map(|r| r.financial_asof).max(),
            config_fingerprint: report.config_fingerprint.clone(),
            distribution_generation: report.distribution_generation,
            distribution_as_of: report.distribution_as_of,
            distribution_fingerprint: report.distribution_fingerprint.clone(),
            engine_version: ENGINE_VERSION.to_string(),
        };

        Self {
            stamp,
            records: report.scored.iter().map(ExportRecord::from).collect(),
            exclusions: report.excluded.clone(),
        }
    }

    /// Default file name: `valscore-<as_of>-<run id prefix>.json`.
    pub fn file_name(&self) -> String {
        let run: String = self.stamp.run_id.chars().take(8).collect();
        format!("valscore-{}-{}.json", self.stamp.as_of, run)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize export bundle")
    }

    /// Write the bundle into `dir`; returns the written path.
    pub fn save_to_file(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create export directory {}", dir.display()))?;

        let path = dir.join(self.file_name());
        std::fs::write(&path, self.to_json()?)
            .with_context(|| format!("Failed to write export {}", path.display()))?;

        tracing::info!(path = %path.display(), records = self.records.len(), "Export written");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read export {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse export {}", path.display()))
    }
}
