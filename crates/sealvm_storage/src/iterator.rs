//! Iterator registry.
//!
//! Cursors are created by scans and belong to one store handle. A cursor
//! remembers the part of its range it has not yet returned and asks the
//! store for the first record of that remainder on every `next`, so it stays
//! valid while the store is written to. Once a cursor reports exhaustion it
//! keeps reporting exhaustion. Releasing the store handle invalidates all of
//! its cursors.

use crate::range::{KeyRange, Order, Record};
use sealvm_core::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a store handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(u64);

impl StoreId {
    /// Allocate a process-unique identifier
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create from a raw value
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

/// Handle naming one cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IteratorHandle {
    /// Store handle owning the cursor
    pub store: StoreId,
    /// Index of the cursor within its store, starting at 0
    pub index: u32,
}

#[derive(Debug)]
struct Cursor {
    remaining: KeyRange,
    order: Order,
    exhausted: bool,
}

/// Registry of cursors grouped by store handle
#[derive(Debug, Default)]
pub struct IteratorRegistry {
    stores: HashMap<StoreId, Vec<Cursor>>,
}

impl IteratorRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live store handle
    pub fn open_store(&mut self, store: StoreId) {
        self.stores.entry(store).or_default();
    }

    /// Release a store handle and every cursor it owns
    ///
    /// Returns `false` if the handle was not live.
    pub fn release_store(&mut self, store: StoreId) -> bool {
        self.stores.remove(&store).is_some()
    }

    /// Check whether a store handle is live
    #[must_use]
    pub fn is_open(&self, store: StoreId) -> bool {
        self.stores.contains_key(&store)
    }

    /// Number of cursors a store handle owns
    #[must_use]
    pub fn cursor_count(&self, store: StoreId) -> usize {
        self.stores.get(&store).map_or(0, Vec::len)
    }

    /// Create a cursor over `range`
    ///
    /// # Errors
    ///
    /// Returns bad-argument if the store handle is not live
    pub fn create(
        &mut self,
        store: StoreId,
        range: KeyRange,
        order: Order,
    ) -> BridgeResult<IteratorHandle> {
        let cursors = self
            .stores
            .get_mut(&store)
            .ok_or_else(|| BridgeError::bad_argument(format!("unknown {}", store)))?;
        let index = u32::try_from(cursors.len())
            .map_err(|_| BridgeError::bad_argument("too many iterators"))?;
        cursors.push(Cursor {
            remaining: range,
            order,
            exhausted: false,
        });
        Ok(IteratorHandle { store, index })
    }

    /// Advance a cursor
    ///
    /// `seek` answers "first record of this range in this order" against the
    /// store the cursor belongs to. `Ok(None)` marks exhaustion and is
    /// returned again on every later call.
    ///
    /// # Errors
    ///
    /// Returns bad-argument for an unknown or released handle, or whatever
    /// `seek` fails with (the cursor is left unchanged in that case)
    pub fn next<F>(&mut self, handle: IteratorHandle, seek: F) -> BridgeResult<Option<Record>>
    where
        F: FnOnce(&KeyRange, Order) -> BridgeResult<Option<Record>>,
    {
        let cursor = self
            .stores
            .get_mut(&handle.store)
            .ok_or_else(|| {
                BridgeError::bad_argument(format!("iterator on released {}", handle.store))
            })?
            .get_mut(handle.index as usize)
            .ok_or_else(|| {
                BridgeError::bad_argument(format!(
                    "unknown iterator {} on {}",
                    handle.index, handle.store
                ))
            })?;
        if cursor.exhausted {
            return Ok(None);
        }
        match seek(&cursor.remaining, cursor.order)? {
            Some(record) => {
                cursor.remaining.advance_past(&record.0, cursor.order);
                Ok(Some(record))
            }
            None => {
                cursor.exhausted = true;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StoreBackend;
    use crate::memory::MemoryStore;

    fn abc() -> MemoryStore {
        MemoryStore::from_records([
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ])
    }

    fn step(
        registry: &mut IteratorRegistry,
        store: &MemoryStore,
        handle: IteratorHandle,
    ) -> BridgeResult<Option<Record>> {
        registry.next(handle, |range, order| store.seek(range, order))
    }

    fn rec(k: &[u8], v: &[u8]) -> Option<Record> {
        Some((k.to_vec(), v.to_vec()))
    }

    #[test]
    fn test_ascending_then_exhausted() {
        let store = abc();
        let id = StoreId::next();
        let mut registry = IteratorRegistry::new();
        registry.open_store(id);
        let it = registry.create(id, KeyRange::all(), Order::Ascending).unwrap();
        assert_eq!(it.index, 0);

        assert_eq!(step(&mut registry, &store, it).unwrap(), rec(b"a", b"1"));
        assert_eq!(step(&mut registry, &store, it).unwrap(), rec(b"b", b"2"));
        assert_eq!(step(&mut registry, &store, it).unwrap(), rec(b"c", b"3"));
        for _ in 0..3 {
            assert_eq!(step(&mut registry, &store, it).unwrap(), None);
        }
    }

    #[test]
    fn test_descending() {
        let store = abc();
        let id = StoreId::next();
        let mut registry = IteratorRegistry::new();
        registry.open_store(id);
        let it = registry.create(id, KeyRange::all(), Order::Descending).unwrap();

        assert_eq!(step(&mut registry, &store, it).unwrap(), rec(b"c", b"3"));
        assert_eq!(step(&mut registry, &store, it).unwrap(), rec(b"b", b"2"));
        assert_eq!(step(&mut registry, &store, it).unwrap(), rec(b"a", b"1"));
        assert_eq!(step(&mut registry, &store, it).unwrap(), None);
    }

    #[test]
    fn test_exhausted_stays_exhausted_after_new_writes() {
        let mut store = abc();
        let id = StoreId::next();
        let mut registry = IteratorRegistry::new();
        registry.open_store(id);
        let it = registry.create(id, KeyRange::all(), Order::Ascending).unwrap();
        while step(&mut registry, &store, it).unwrap().is_some() {}
        store.set(b"d", b"4").unwrap();
        assert_eq!(step(&mut registry, &store, it).unwrap(), None);
    }

    #[test]
    fn test_independent_cursors() {
        let store = abc();
        let id = StoreId::next();
        let mut registry = IteratorRegistry::new();
        registry.open_store(id);
        let first = registry.create(id, KeyRange::all(), Order::Ascending).unwrap();
        let second = registry
            .create(id, KeyRange::new(Some(b"b".to_vec()), None), Order::Ascending)
            .unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(step(&mut registry, &store, second).unwrap(), rec(b"b", b"2"));
        assert_eq!(step(&mut registry, &store, first).unwrap(), rec(b"a", b"1"));
        assert_eq!(registry.cursor_count(id), 2);
    }

    #[test]
    fn test_released_store_invalidates_cursors() {
        let store = abc();
        let id = StoreId::next();
        let mut registry = IteratorRegistry::new();
        registry.open_store(id);
        let it = registry.create(id, KeyRange::all(), Order::Ascending).unwrap();
        assert!(registry.release_store(id));
        assert!(!registry.release_store(id));

        let err = step(&mut registry, &store, it).unwrap_err();
        assert!(matches!(err, BridgeError::BadArgument(_)));
        assert!(registry.create(id, KeyRange::all(), Order::Ascending).is_err());
    }

    #[test]
    fn test_unknown_index_is_bad_argument() {
        let store = abc();
        let id = StoreId::next();
        let mut registry = IteratorRegistry::new();
        registry.open_store(id);
        let bogus = IteratorHandle { store: id, index: 7 };
        assert!(matches!(
            step(&mut registry, &store, bogus),
            Err(BridgeError::BadArgument(_))
        ));
    }

    #[test]
    fn test_seek_failure_leaves_cursor() {
        let store = abc();
        let id = StoreId::next();
        let mut registry = IteratorRegistry::new();
        registry.open_store(id);
        let it = registry.create(id, KeyRange::all(), Order::Ascending).unwrap();
        store.set_available(false);
        assert!(matches!(
            step(&mut registry, &store, it),
            Err(BridgeError::Other(_))
        ));
        store.set_available(true);
        assert_eq!(step(&mut registry, &store, it).unwrap(), rec(b"a", b"1"));
    }
}
