//! Per-selector storage of result records.

use std::collections::HashMap;
use std::sync::Arc;

use slab::Slab;

use crate::dependency::{Dependencies, DependencyInfo};
use crate::error::SelectorError;

/// Run counters, kept per record and aggregated per selector.
///
/// Every counter is monotonically non-decreasing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunCounters {
    /// Evaluations started, whatever their outcome.
    pub invoke_count: u64,
    /// Evaluations answered from the cache.
    pub skipped_run_count: u64,
    /// Transform runs whose output was equivalent to the cached one.
    pub phantom_run_count: u64,
    /// Transform runs whose output replaced the cached one.
    pub full_run_count: u64,
    /// Evaluations that needed a run but were not permitted one.
    pub aborted_run_count: u64,
    /// Transform runs that failed.
    pub error_count: u64,
}

/// What a counter increment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tally {
    Invoke,
    Skipped,
    PhantomRun,
    FullRun,
    Aborted,
    Error,
}

impl RunCounters {
    pub(crate) fn tally(&mut self, tally: Tally) {
        let counter = match tally {
            Tally::Invoke => &mut self.invoke_count,
            Tally::Skipped => &mut self.skipped_run_count,
            Tally::PhantomRun => &mut self.phantom_run_count,
            Tally::FullRun => &mut self.full_run_count,
            Tally::Aborted => &mut self.aborted_run_count,
            Tally::Error => &mut self.error_count,
        };
        *counter += 1;
    }

    /// Number of times the transform actually ran.
    pub fn run_count(&self) -> u64 {
        self.phantom_run_count + self.full_run_count + self.error_count
    }
}

/// Persistent bookkeeping for one selector and one parameter key.
pub(crate) struct ResultRecord<S, O> {
    /// State the current return value was last validated against.
    pub(crate) state: Option<Arc<S>>,
    pub(crate) root_edges: Dependencies<S>,
    pub(crate) own_edges: Dependencies<S>,
    /// Set once a successful run has captured edges; used by static selectors.
    pub(crate) dependencies_captured: bool,
    pub(crate) return_value: Option<Arc<O>>,
    pub(crate) error: Option<SelectorError>,
    pub(crate) counters: RunCounters,
}

impl<S, O> Default for ResultRecord<S, O> {
    fn default() -> Self {
        Self {
            state: None,
            root_edges: Dependencies::default(),
            own_edges: Dependencies::default(),
            dependencies_captured: false,
            return_value: None,
            error: None,
            counters: RunCounters::default(),
        }
    }
}

impl<S, O> ResultRecord<S, O> {
    pub(crate) fn has_return_value(&self) -> bool {
        self.return_value.is_some()
    }

    /// Cheap copy of the fields the reuse checks read.
    pub(crate) fn view(&self) -> RecordView<S, O> {
        RecordView {
            state: self.state.clone(),
            root_edges: self.root_edges.clone(),
            own_edges: self.own_edges.clone(),
            return_value: self.return_value.clone(),
        }
    }

    pub(crate) fn snapshot(&self, key: &str) -> RecordSnapshot<S, O> {
        RecordSnapshot {
            key: key.to_string(),
            state: self.state.clone(),
            has_return_value: self.has_return_value(),
            return_value: self.return_value.clone(),
            error: self.error.clone(),
            counters: self.counters,
            root_dependencies: self.root_edges.iter().map(|edge| edge.info()).collect(),
            own_dependencies: self.own_edges.iter().map(|edge| edge.info()).collect(),
        }
    }
}

/// The parts of a record the engine reads without holding the store lock.
pub(crate) struct RecordView<S, O> {
    pub(crate) state: Option<Arc<S>>,
    pub(crate) root_edges: Dependencies<S>,
    pub(crate) own_edges: Dependencies<S>,
    pub(crate) return_value: Option<Arc<O>>,
}

impl<S, O> RecordView<S, O> {
    pub(crate) fn has_dependencies(&self) -> bool {
        !self.root_edges.is_empty() || !self.own_edges.is_empty()
    }
}

/// Read-only copy of a result record, for diagnostics.
#[derive(Debug)]
pub struct RecordSnapshot<S, O> {
    /// Record key.
    pub key: String,
    /// State the current value was last validated against.
    ///
    /// A failed run leaves the state of the last successful run here.
    pub state: Option<Arc<S>>,
    /// Whether a successful run produced the current value.
    pub has_return_value: bool,
    /// Current value, if any.
    pub return_value: Option<Arc<O>>,
    /// Failure of the most recent run, if it failed.
    pub error: Option<SelectorError>,
    /// Counters for this key.
    pub counters: RunCounters,
    /// Root-selector dependencies from the last successful run.
    pub root_dependencies: Vec<DependencyInfo>,
    /// Direct dependencies from the last successful run.
    pub own_dependencies: Vec<DependencyInfo>,
}

impl<S, O> Clone for RecordSnapshot<S, O> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            state: self.state.clone(),
            has_return_value: self.has_return_value,
            return_value: self.return_value.clone(),
            error: self.error.clone(),
            counters: self.counters,
            root_dependencies: self.root_dependencies.clone(),
            own_dependencies: self.own_dependencies.clone(),
        }
    }
}

/// Result records of one selector, indexed by key.
///
/// Records live in a slab so removing a key frees its slot for reuse.
pub(crate) struct RecordStore<S, O> {
    index: HashMap<String, usize, ahash::RandomState>,
    records: Slab<ResultRecord<S, O>>,
    counters: RunCounters,
}

impl<S, O> Default for RecordStore<S, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, O> RecordStore<S, O> {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            index: HashMap::with_hasher(ahash::RandomState::new()),
            records: Slab::new(),
            counters: RunCounters::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ResultRecord<S, O>> {
        self.index.get(key).and_then(|&slot| self.records.get(slot))
    }

    /// Get the record for `key`, creating an empty one on first use.
    pub fn get_or_insert(&mut self, key: &str) -> &mut ResultRecord<S, O> {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                let slot = self.records.insert(ResultRecord::default());
                self.index.insert(key.to_string(), slot);
                slot
            }
        };
        &mut self.records[slot]
    }

    /// Count an event against both the record and the selector totals.
    pub fn tally(&mut self, key: &str, tally: Tally) {
        self.counters.tally(tally);
        self.get_or_insert(key).counters.tally(tally);
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn remove(&mut self, key: &str) -> bool {
        match self.index.remove(key) {
            Some(slot) => {
                self.records.remove(slot);
                true
            }
            None => false,
        }
    }

    /// Drop every record. Selector-wide counters are kept.
    pub fn clear(&mut self) {
        self.index.clear();
        self.records.clear();
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.index.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_store_basic() {
        let mut store: RecordStore<(), String> = RecordStore::new();

        // Initially empty
        assert!(store.get("1").is_none());
        assert_eq!(store.len(), 0);

        store.tally("1", Tally::Invoke);
        store.get_or_insert("1").return_value = Some(Arc::new("a".to_string()));
        store.tally("1", Tally::FullRun);
        store.tally("2", Tally::Invoke);

        let record = store.get("1").unwrap();
        assert!(record.has_return_value());
        assert_eq!(record.counters.invoke_count, 1);
        assert_eq!(record.counters.full_run_count, 1);
        assert_eq!(store.counters().invoke_count, 2);
        assert_eq!(store.keys(), vec!["1".to_string(), "2".to_string()]);

        // Remove frees the key but keeps totals
        assert!(store.remove("1"));
        assert!(!store.remove("1"));
        assert!(store.get("1").is_none());
        assert_eq!(store.counters().full_run_count, 1);

        store.clear();
        assert_eq!(store.len(), 0);
        assert_eq!(store.counters().invoke_count, 2);
    }

    #[test]
    fn test_snapshot() {
        let mut store: RecordStore<(), i32> = RecordStore::new();
        store.get_or_insert("k").error = Some(SelectorError::Aborted {
            selector: "s".into(),
        });
        let snapshot = store.get("k").unwrap().snapshot("k");
        assert_eq!(snapshot.key, "k");
        assert!(snapshot.state.is_none());
        assert!(!snapshot.has_return_value);
        assert!(snapshot.error.is_some());
        assert!(snapshot.own_dependencies.is_empty());
    }

    #[test]
    fn test_run_count() {
        let mut counters = RunCounters::default();
        counters.tally(Tally::FullRun);
        counters.tally(Tally::PhantomRun);
        counters.tally(Tally::Skipped);
        counters.tally(Tally::Error);
        assert_eq!(counters.run_count(), 3);
    }
}
