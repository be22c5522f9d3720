//! In-memory host store.
//!
//! Cloning a [`MemoryStore`] yields another handle onto the same data, so a
//! host can hand one clone to the engine and inspect the other afterwards.

use crate::backend::{StoreBackend, WriteOp};
use crate::range::{KeyRange, Order, Record};
use sealvm_core::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of reads (including seeks)
    pub read_count: u64,
    /// Number of writes
    pub write_count: u64,
    /// Number of removals
    pub remove_count: u64,
}

#[derive(Debug)]
struct MemoryInner {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    stats: StoreStats,
    available: bool,
}

impl Default for MemoryInner {
    fn default() -> Self {
        Self {
            data: BTreeMap::new(),
            stats: StoreStats::default(),
            available: true,
        }
    }
}

/// BTreeMap-backed store shared behind a lock
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with records
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        store.write_inner().data.extend(records);
        store
    }

    /// Simulate the host becoming unreachable; every operation then fails
    /// with an operational error
    pub fn set_available(&self, available: bool) {
        self.write_inner().available = available;
    }

    /// Snapshot of all records in key order
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.read_inner()
            .data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of keys stored
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_inner().data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_inner().data.is_empty()
    }

    /// Get store statistics
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.read_inner().stats.clone()
    }

    fn read_inner(&self) -> std::sync::RwLockReadGuard<'_, MemoryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> std::sync::RwLockWriteGuard<'_, MemoryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unavailable() -> BridgeError {
    BridgeError::other("memory store unavailable")
}

impl StoreBackend for MemoryStore {
    fn get(&self, key: &[u8]) -> BridgeResult<Option<Vec<u8>>> {
        let mut inner = self.write_inner();
        if !inner.available {
            return Err(unavailable());
        }
        inner.stats.read_count += 1;
        Ok(inner.data.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> BridgeResult<()> {
        let mut inner = self.write_inner();
        if !inner.available {
            return Err(unavailable());
        }
        inner.stats.write_count += 1;
        inner.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> BridgeResult<()> {
        let mut inner = self.write_inner();
        if !inner.available {
            return Err(unavailable());
        }
        inner.stats.remove_count += 1;
        inner.data.remove(key);
        Ok(())
    }

    fn apply_batch(&mut self, ops: &[WriteOp]) -> BridgeResult<()> {
        let mut inner = self.write_inner();
        if !inner.available {
            return Err(unavailable());
        }
        for op in ops {
            match op {
                WriteOp::Set(key, value) => {
                    inner.stats.write_count += 1;
                    inner.data.insert(key.clone(), value.clone());
                }
                WriteOp::Remove(key) => {
                    inner.stats.remove_count += 1;
                    inner.data.remove(key);
                }
            }
        }
        Ok(())
    }

    fn seek(&self, range: &KeyRange, order: Order) -> BridgeResult<Option<Record>> {
        let mut inner = self.write_inner();
        if !inner.available {
            return Err(unavailable());
        }
        inner.stats.read_count += 1;
        if range.is_empty() {
            return Ok(None);
        }
        let mut entries = inner.data.range::<[u8], _>(range.as_bounds());
        let entry = match order {
            Order::Ascending => entries.next(),
            Order::Descending => entries.next_back(),
        };
        Ok(entry.map(|(k, v)| (k.clone(), v.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> MemoryStore {
        MemoryStore::from_records([
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ])
    }

    #[test]
    fn test_get_set_remove() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get(b"k").unwrap(), None);
        store.set(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        store.remove(b"k").unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
        store.remove(b"k").unwrap();
    }

    #[test]
    fn test_clones_share_data() {
        let store = MemoryStore::new();
        let mut handle = store.clone();
        handle.set(b"k", b"v").unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_seek_both_orders() {
        let store = abc();
        let all = KeyRange::all();
        assert_eq!(
            store.seek(&all, Order::Ascending).unwrap(),
            Some((b"a".to_vec(), b"1".to_vec()))
        );
        assert_eq!(
            store.seek(&all, Order::Descending).unwrap(),
            Some((b"c".to_vec(), b"3".to_vec()))
        );
        let range = KeyRange::new(Some(b"b".to_vec()), Some(b"c".to_vec()));
        assert_eq!(
            store.seek(&range, Order::Descending).unwrap(),
            Some((b"b".to_vec(), b"2".to_vec()))
        );
    }

    #[test]
    fn test_seek_inverted_range_is_empty() {
        let store = abc();
        let range = KeyRange::new(Some(b"c".to_vec()), Some(b"a".to_vec()));
        assert_eq!(store.seek(&range, Order::Ascending).unwrap(), None);
    }

    #[test]
    fn test_unavailable_store_fails() {
        let mut store = abc();
        store.set_available(false);
        assert!(matches!(store.get(b"a"), Err(BridgeError::Other(_))));
        assert!(store.set(b"d", b"4").is_err());
        store.set_available(true);
        assert!(store.get(b"a").is_ok());
    }

    #[test]
    fn test_stats() {
        let mut store = MemoryStore::new();
        store.set(b"k", b"v").unwrap();
        store.get(b"k").unwrap();
        store.remove(b"k").unwrap();
        let stats = store.stats();
        assert_eq!(stats.write_count, 1);
        assert_eq!(stats.read_count, 1);
        assert_eq!(stats.remove_count, 1);
    }
}
