//! Append-only JSONL history of calibration snapshots.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use valscore_common::error::{Result, ResultExt};
use valscore_common::util::expand_path;

use super::monitor::CalibrationSnapshot;

/// One snapshot per line, oldest first. Lines are only ever appended.
#[derive(Debug, Clone)]
pub struct CalibrationHistory {
    path: PathBuf,
}

impl CalibrationHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// History at a configured path (`~` expanded).
    pub fn from_config_path(raw: &str) -> Self {
        Self::new(expand_path(raw))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one snapshot.
    pub fn append(&self, snapshot: &CalibrationSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(format!("Failed to open calibration history: {}", self.path.display()))?;

        let line = serde_json::to_string(snapshot)?;
        writeln!(file, "{}", line).context("Failed to append calibration snapshot")?;

        tracing::debug!(
            path = %self.path.display(),
            period = %snapshot.period,
            run_id = %snapshot.run_id,
            "Calibration snapshot appended"
        );
        Ok(())
    }

    /// Every readable snapshot, oldest first. Malformed lines are skipped.
    pub fn load_all(&self) -> Result<Vec<CalibrationSnapshot>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)
            .context(format!("Failed to open calibration history: {}", self.path.display()))?;

        let mut snapshots = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CalibrationSnapshot>(&line) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    line = idx + 1,
                    error = %e,
                    "Skipping malformed calibration history line"
                ),
            }
        }

        Ok(snapshots)
    }

    /// The most recent `n` snapshots, oldest first.
    pub fn last(&self, n: usize) -> Result<Vec<CalibrationSnapshot>> {
        let mut all = self.load_all()?;
        let skip = all.len().saturating_sub(n);
        Ok(all.split_off(skip))
    }

    pub fn latest(&self) -> Result<Option<CalibrationSnapshot>> {
        Ok(self.load_all()?.pop())
    }

    /// Snapshots computed in `period` (`YYYY-MM`).
    pub fn by_period(&self, period: &str) -> Result<Vec<CalibrationSnapshot>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|s| s.period == period)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationMonitor;
    use chrono::{TimeZone, Utc};
    use valscore_common::CalibrationConfig;

    fn snapshot(run_id: &str, month: u32) -> CalibrationSnapshot {
        let at = Utc.with_ymd_and_hms(2026, month, 1, 0, 0, 0).unwrap();
        CalibrationMonitor::new(CalibrationConfig::default(), 100.0)
            .observe_at(run_id, &[], "fp", None, at)
    }

    #[test]
    fn test_append_only_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let history = CalibrationHistory::new(dir.path().join("nested/history.jsonl"));

        assert!(history.load_all().unwrap().is_empty());
        assert!(history.latest().unwrap().is_none());

        history.append(&snapshot("a", 8)).unwrap();
        history.append(&snapshot("b", 9)).unwrap();
        history.append(&snapshot("c", 9)).unwrap();

        let all = history.load_all().unwrap();
        let ids: Vec<&str> = all.iter().map(|s| s.run_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let last_two: Vec<String> = history.last(2).unwrap().into_iter().map(|s| s.run_id).collect();
        assert_eq!(last_two, vec!["b", "c"]);
        assert_eq!(history.last(10).unwrap().len(), 3);
        assert_eq!(history.latest().unwrap().unwrap().run_id, "c");
        assert_eq!(history.by_period("2026-09").unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let history = CalibrationHistory::new(&path);

        history.append(&snapshot("a", 8)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        history.append(&snapshot("b", 9)).unwrap();

        assert_eq!(history.load_all().unwrap().len(), 2);
    }
}
