use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::info;

use crate::domain::{TractId, TractKey, TractRecord};

/// Immutable, indexed view of one complete load.
///
/// Index vectors hold positions into `records`, which is sorted by
/// `(tract_id, year)`, so every index lists records in that order too.
#[derive(Debug, Default)]
pub struct TractSnapshot {
    pub version: u64,
    pub loaded_at: Option<DateTime<Utc>>,
    pub source_sha256: Option<String>,
    records: Vec<TractRecord>,
    by_key: HashMap<TractKey, usize>,
    by_tract: HashMap<TractId, Vec<usize>>,
    by_state: BTreeMap<String, Vec<usize>>,
    by_county: BTreeMap<(String, String), Vec<usize>>,
    by_year: BTreeMap<i32, Vec<usize>>,
}

impl TractSnapshot {
    pub fn build(
        mut records: Vec<TractRecord>,
        version: u64,
        source_sha256: Option<String>,
    ) -> Self {
        records.sort_by(|a, b| a.key().cmp(&b.key()));
        records.dedup_by(|later, earlier| later.key() == earlier.key());

        let mut snapshot = Self {
            version,
            loaded_at: Some(Utc::now()),
            source_sha256,
            ..Self::default()
        };
        for (idx, record) in records.iter().enumerate() {
            snapshot.by_key.insert(record.key(), idx);
            snapshot
                .by_tract
                .entry(record.tract_id.clone())
                .or_default()
                .push(idx);
            snapshot
                .by_state
                .entry(record.state.clone())
                .or_default()
                .push(idx);
            snapshot
                .by_county
                .entry((record.state.clone(), record.county.clone()))
                .or_default()
                .push(idx);
            snapshot.by_year.entry(record.year).or_default().push(idx);
        }
        snapshot.records = records;
        snapshot
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TractRecord] {
        &self.records
    }

    pub fn get(&self, tract_id: &TractId, year: i32) -> Option<&TractRecord> {
        self.by_key
            .get(&(tract_id.clone(), year))
            .map(|&idx| &self.records[idx])
    }

    /// All years of one tract, chronologically
    pub fn tract_history(&self, tract_id: &TractId) -> Vec<&TractRecord> {
        self.resolve(self.by_tract.get(tract_id))
    }

    pub fn in_state(&self, state: &str) -> Vec<&TractRecord> {
        self.resolve(self.by_state.get(state))
    }

    pub fn in_county(&self, state: &str, county: &str) -> Vec<&TractRecord> {
        self.resolve(self.by_county.get(&(state.to_string(), county.to_string())))
    }

    /// Counties of all states when `state` is `None`
    pub fn counties(&self, state: Option<&str>) -> Vec<(&str, &str)> {
        self.by_county
            .keys()
            .filter(|(s, _)| state.map_or(true, |wanted| s == wanted))
            .map(|(s, c)| (s.as_str(), c.as_str()))
            .collect()
    }

    pub fn in_year(&self, year: i32) -> Vec<&TractRecord> {
        self.resolve(self.by_year.get(&year))
    }

    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.by_state.keys().map(String::as_str)
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.by_year.keys().copied()
    }

    pub fn tract_count(&self) -> usize {
        self.by_tract.len()
    }

    fn resolve(&self, positions: Option<&Vec<usize>>) -> Vec<&TractRecord> {
        positions
            .map(|ps| ps.iter().map(|&idx| &self.records[idx]).collect())
            .unwrap_or_default()
    }
}

/// Holder of the current snapshot.
///
/// Readers clone the `Arc` once per query and keep a consistent view for
/// its whole duration; `install` replaces the pointer in one step, so a
/// reader sees either the old record set or the new one, never a mix.
pub struct SnapshotStore {
    current: RwLock<Arc<TractSnapshot>>,
    version: AtomicU64,
    // Serializes installers; readers never take it
    install_lock: Mutex<()>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(TractSnapshot::empty())),
            version: AtomicU64::new(0),
            install_lock: Mutex::new(()),
        }
    }

    pub fn current(&self) -> Arc<TractSnapshot> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Build a snapshot from `records` under the next version and swap it in.
    /// Returns the installed version.
    pub fn install(&self, records: Vec<TractRecord>, source_sha256: Option<String>) -> u64 {
        self.install_at_least(records, source_sha256, 0)
    }

    /// Like [`install`](Self::install), but the version is raised to `floor`
    /// when the counter is behind it, e.g. when restoring a persisted load.
    pub fn install_at_least(
        &self,
        records: Vec<TractRecord>,
        source_sha256: Option<String>,
        floor: u64,
    ) -> u64 {
        let _installing = self
            .install_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = (self.version.load(Ordering::Acquire) + 1).max(floor);
        let snapshot = Arc::new(TractSnapshot::build(records, next, source_sha256));
        let count = snapshot.len();
        {
            let mut guard = self
                .current
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = snapshot;
            self.version.store(next, Ordering::Release);
        }
        info!("Installed snapshot version {} with {} records", next, count);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OpportunityZone;

    fn record(id: &str, year: i32, state: &str, county: &str) -> TractRecord {
        TractRecord {
            tract_id: TractId::parse(id).unwrap(),
            year,
            county: county.into(),
            state: state.into(),
            is_opportunity_zone: OpportunityZone::Unknown,
            metrics: BTreeMap::new(),
        }
    }

    #[test]
    fn indexes_are_sorted_and_consistent() {
        let snapshot = TractSnapshot::build(
            vec![
                record("13089021415", 2021, "Georgia", "DeKalb County"),
                record("13089021415", 2019, "Georgia", "DeKalb County"),
                record("01001020100", 2019, "Alabama", "Autauga County"),
            ],
            1,
            None,
        );
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.records()[0].tract_id.as_str(), "01001020100");

        let id = TractId::parse("13089021415").unwrap();
        let years: Vec<i32> = snapshot.tract_history(&id).iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2019, 2021]);
        assert!(snapshot.get(&id, 2020).is_none());
        assert_eq!(snapshot.in_state("Georgia").len(), 2);
        assert_eq!(snapshot.in_county("Georgia", "DeKalb County").len(), 2);
        assert_eq!(snapshot.in_year(2019).len(), 2);
        assert!(snapshot.in_state("Nowhere").is_empty());
        assert_eq!(snapshot.states().collect::<Vec<_>>(), vec!["Alabama", "Georgia"]);
        assert_eq!(snapshot.tract_count(), 2);
    }

    #[test]
    fn readers_keep_their_snapshot_across_install() {
        let store = SnapshotStore::new();
        assert_eq!(store.version(), 0);

        store.install(vec![record("13089021415", 2020, "Georgia", "DeKalb County")], None);
        let held = store.current();
        assert_eq!(held.version, 1);

        let v = store.install(Vec::new(), None);
        assert_eq!(v, 2);
        assert_eq!(held.len(), 1);
        assert!(store.current().is_empty());
        assert_eq!(store.current().version, 2);
    }

    #[test]
    fn install_at_least_raises_but_never_lowers() {
        let store = SnapshotStore::new();
        assert_eq!(store.install_at_least(Vec::new(), None, 5), 5);
        assert_eq!(store.install_at_least(Vec::new(), None, 2), 6);
        assert_eq!(store.install(Vec::new(), None), 7);
    }
}
