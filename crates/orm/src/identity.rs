//! Identity cache - select results remembered until a write touches the table
//!
//! Owned by the persistence context rather than held in a global, and off
//! unless `OrmConfig::identity_cache` is set. Writes through the context
//! forget the affected table; writes by other contexts sharing the store are
//! not seen, so the ledger table never goes through it. A committed deferred
//! binding replay calls `invalidate` because it can change rows other loaded
//! records depend on. At capacity an arbitrary entry is dropped first.

use crate::query::Query;
use crate::value::Row;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub evictions: u64,
}

#[derive(Debug)]
pub struct IdentityCache {
    enabled: AtomicBool,
    capacity: usize,
    entries: DashMap<String, (String, Vec<Row>)>,
    by_table: DashMap<String, HashSet<String>>,
    stats: Mutex<IdentityStats>,
}

impl IdentityCache {
    pub fn new(enabled: bool, capacity: usize) -> Self {
        Self {
            enabled: AtomicBool::new(enabled && capacity > 0),
            capacity,
            entries: DashMap::new(),
            by_table: DashMap::new(),
            stats: Mutex::new(IdentityStats::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled && self.capacity > 0, Ordering::Relaxed);
        if !enabled {
            self.clear();
        }
    }

    pub fn get(&self, query: &Query) -> Option<Vec<Row>> {
        if !self.is_enabled() {
            return None;
        }
        let found = self.entries.get(&query.fingerprint()).map(|entry| entry.1.clone());
        let mut stats = self.stats.lock();
        match found {
            Some(rows) => {
                stats.hits += 1;
                Some(rows)
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    pub fn put(&self, query: &Query, rows: &[Row]) {
        if !self.is_enabled() {
            return;
        }
        let fingerprint = query.fingerprint();
        if !self.entries.contains_key(&fingerprint) {
            self.make_room();
        }
        self.by_table
            .entry(query.table.clone())
            .or_default()
            .insert(fingerprint.clone());
        self.entries.insert(fingerprint, (query.table.clone(), rows.to_vec()));
    }

    fn make_room(&self) {
        while self.entries.len() >= self.capacity {
            // The iterator guard must be gone before removing
            let victim = self.entries.iter().next().map(|entry| entry.key().clone());
            let Some(fingerprint) = victim else {
                return;
            };
            if let Some((_, (table, _))) = self.entries.remove(&fingerprint) {
                if let Some(mut fingerprints) = self.by_table.get_mut(&table) {
                    fingerprints.remove(&fingerprint);
                }
            }
            self.stats.lock().evictions += 1;
        }
    }

    /// Drop cached results of one table
    pub fn forget_table(&self, table: &str) {
        if let Some((_, fingerprints)) = self.by_table.remove(table) {
            for fingerprint in fingerprints {
                self.entries.remove(&fingerprint);
            }
        }
    }

    /// Drop everything
    pub fn invalidate(&self) {
        self.clear();
        self.stats.lock().invalidations += 1;
    }

    fn clear(&self) {
        self.entries.clear();
        self.by_table.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> IdentityStats {
        *self.stats.lock()
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new(false, 1024)
    }
}
