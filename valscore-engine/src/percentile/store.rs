//! Versioned distribution snapshots.
//!
//! Snapshots are published wholesale behind an `Arc`; readers clone the `Arc`
//! and keep a complete, consistent view for as long as they need it.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use super::distribution::{DistributionSnapshot, SectorDistribution};

/// Snapshots retained for as-of queries.
const DEFAULT_RETAINED: usize = 24;

#[derive(Default)]
struct StoreState {
    generation: u64,
    latest: Option<Arc<DistributionSnapshot>>,
    by_date: BTreeMap<NaiveDate, Arc<DistributionSnapshot>>,
}

/// Read-mostly store of published distribution snapshots.
pub struct DistributionStore {
    state: RwLock<StoreState>,
    retained: usize,
}

impl Default for DistributionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DistributionStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETAINED)
    }

    pub fn with_retention(retained: usize) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            retained: retained.max(1),
        }
    }

    /// Publish a snapshot, superseding any previous one for the same date.
    ///
    /// Returns the published snapshot with its generation assigned.
    pub fn publish(&self, mut snapshot: DistributionSnapshot) -> Arc<DistributionSnapshot> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        state.generation += 1;
        snapshot.generation = state.generation;
        let snapshot = Arc::new(snapshot);

        state.by_date.insert(snapshot.as_of, Arc::clone(&snapshot));
        while state.by_date.len() > self.retained {
            state.by_date.pop_first();
        }

        let newer_exists = state
            .latest
            .as_ref()
            .is_some_and(|current| current.as_of > snapshot.as_of);
        if !newer_exists {
            state.latest = Some(Arc::clone(&snapshot));
        }

        tracing::info!(
            generation = snapshot.generation,
            as_of = %snapshot.as_of,
            sectors = snapshot.sectors.len(),
            universe = snapshot.universe_size(),
            "Published distribution snapshot"
        );

        snapshot
    }

    /// Most recently dated snapshot.
    pub fn latest(&self) -> Option<Arc<DistributionSnapshot>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.latest.clone()
    }

    /// Latest snapshot computed on or before `as_of`.
    pub fn as_of(&self, as_of: NaiveDate) -> Option<Arc<DistributionSnapshot>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .by_date
            .range(..=as_of)
            .next_back()
            .map(|(_, snapshot)| Arc::clone(snapshot))
    }

    /// Snapshot published for exactly `as_of`.
    pub fn exact(&self, as_of: NaiveDate) -> Option<Arc<DistributionSnapshot>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.by_date.get(&as_of).cloned()
    }

    /// Distribution of `sector` valid at `as_of`.
    pub fn sector(&self, sector: &str, as_of: NaiveDate) -> Option<SectorDistribution> {
        self.as_of(as_of)
            .and_then(|snapshot| snapshot.sector(sector).cloned())
    }

    /// Current generation counter (0 before the first publish).
    pub fn generation(&self) -> u64 {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.generation
    }

    /// Write the snapshot published for `as_of` as JSON. False if there is none.
    pub fn save(&self, as_of: NaiveDate, path: &Path) -> Result<bool> {
        let Some(snapshot) = self.exact(as_of) else {
            return Ok(false);
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(snapshot.as_ref())?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;

        tracing::debug!(path = %path.display(), as_of = %as_of, "Distribution snapshot saved");
        Ok(true)
    }

    /// Publish the snapshot saved at `path` if it was computed for `as_of`.
    ///
    /// `None` when the file is absent or belongs to another date.
    pub fn restore(&self, as_of: NaiveDate, path: &Path) -> Result<Option<Arc<DistributionSnapshot>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot from {}", path.display()))?;
        let snapshot: DistributionSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot from {}", path.display()))?;

        if snapshot.as_of != as_of {
            tracing::debug!(
                path = %path.display(),
                saved = %snapshot.as_of,
                wanted = %as_of,
                "Saved snapshot is for another date"
            );
            return Ok(None);
        }

        Ok(Some(self.publish(snapshot)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StockRecord;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn universe(per: f64) -> Vec<StockRecord> {
        (0..12)
            .map(|i| StockRecord {
                symbol: format!("S{}", i),
                sector: "banks".into(),
                per: Some(per + i as f64),
                pbr: Some(1.0),
                roe: Some(10.0),
                ..StockRecord::default()
            })
            .collect()
    }

    #[test]
    fn test_publish_assigns_generations() {
        let store = DistributionStore::new();
        assert!(store.latest().is_none());

        let first = store.publish(DistributionSnapshot::build(date(1), &universe(5.0)));
        let second = store.publish(DistributionSnapshot::build(date(2), &universe(6.0)));

        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert_eq!(store.generation(), 2);
        assert_eq!(store.latest().unwrap().as_of, date(2));
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let store = DistributionStore::new();
        let held = store.publish(DistributionSnapshot::build(date(1), &universe(5.0)));
        store.publish(DistributionSnapshot::build(date(1), &universe(50.0)));

        let old_p50 = held.sector("banks").unwrap().per.unwrap().p50;
        let new_p50 = store.latest().unwrap().sector("banks").unwrap().per.unwrap().p50;
        assert!(old_p50 < new_p50);
    }

    #[test]
    fn test_as_of_lookup() {
        let store = DistributionStore::new();
        store.publish(DistributionSnapshot::build(date(1), &universe(5.0)));
        store.publish(DistributionSnapshot::build(date(10), &universe(6.0)));

        assert_eq!(store.as_of(date(5)).unwrap().as_of, date(1));
        assert_eq!(store.as_of(date(10)).unwrap().as_of, date(10));
        assert!(store.exact(date(5)).is_none());
        assert!(store.sector("banks", date(3)).is_some());
        assert!(store.sector("steel", date(3)).is_none());

        let before = NaiveDate::from_ymd_opt(2026, 9, 30).unwrap();
        assert!(store.as_of(before).is_none());
    }

    #[test]
    fn test_backfill_does_not_replace_latest() {
        let store = DistributionStore::new();
        store.publish(DistributionSnapshot::build(date(10), &universe(6.0)));
        store.publish(DistributionSnapshot::build(date(1), &universe(5.0)));
        assert_eq!(store.latest().unwrap().as_of, date(10));
    }

    #[test]
    fn test_retention_limit() {
        let store = DistributionStore::with_retention(2);
        for d in 1..=3 {
            store.publish(DistributionSnapshot::build(date(d), &universe(5.0)));
        }
        assert!(store.exact(date(1)).is_none());
        assert!(store.exact(date(3)).is_some());
    }

    #[test]
    fn test_save_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots").join("latest.json");

        let store = DistributionStore::new();
        assert!(!store.save(date(1), &path).unwrap());
        let saved = store.publish(DistributionSnapshot::build(date(1), &universe(5.0)));
        assert!(store.save(date(1), &path).unwrap());

        let restored = DistributionStore::new();
        assert!(restored.restore(date(2), &path).unwrap().is_none());
        assert_eq!(restored.generation(), 0);

        let snapshot = restored.restore(date(1), &path).unwrap().unwrap();
        assert_eq!(snapshot.as_of, date(1));
        assert_eq!(snapshot.sector("banks").unwrap().record_count, 12);
        assert_eq!(snapshot.fingerprint(), saved.fingerprint());
        assert_eq!(restored.exact(date(1)).map(|s| s.generation), Some(1));
    }

    #[test]
    fn test_restore_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DistributionStore::new();
        assert!(store.restore(date(1), &dir.path().join("absent.json")).unwrap().is_none());

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{not json").unwrap();
        assert!(store.restore(date(1), &corrupt).is_err());
        assert!(store.latest().is_none());
    }
}
