//! Staged writes of one contract call.
//!
//! Writes and removals are journaled in issue order and indexed by key.
//! Reads and scans see the journal merged over the backend. The journal is
//! handed to the backend as one batch only when the call succeeds; dropping
//! the overlay discards every staged change.

use crate::backend::{StoreBackend, WriteOp};
use crate::range::{KeyRange, Order, Record};
use sealvm_core::BridgeResult;
use std::collections::BTreeMap;

/// Write overlay over a [`StoreBackend`]
#[derive(Debug, Default)]
pub struct WriteOverlay {
    journal: Vec<WriteOp>,
    // `None` is a tombstone hiding the backend's value.
    index: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl WriteOverlay {
    /// Create an empty overlay
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a write
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.journal.push(WriteOp::Set(key.to_vec(), value.to_vec()));
        self.index.insert(key.to_vec(), Some(value.to_vec()));
    }

    /// Stage a removal
    pub fn remove(&mut self, key: &[u8]) {
        self.journal.push(WriteOp::Remove(key.to_vec()));
        self.index.insert(key.to_vec(), None);
    }

    /// Read through the overlay
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot answer
    pub fn get<S: StoreBackend + ?Sized>(
        &self,
        backend: &S,
        key: &[u8],
    ) -> BridgeResult<Option<Vec<u8>>> {
        match self.index.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => backend.get(key),
        }
    }

    /// First record of `range` in `order`, merging staged entries over the
    /// backend; staged entries win on equal keys and tombstones hide keys
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot answer
    pub fn seek<S: StoreBackend + ?Sized>(
        &self,
        backend: &S,
        range: &KeyRange,
        order: Order,
    ) -> BridgeResult<Option<Record>> {
        let mut range = range.clone();
        loop {
            if range.is_empty() {
                return Ok(None);
            }
            let stored = backend.seek(&range, order)?;
            let Some((key, staged)) = self.first_staged(&range, order) else {
                return Ok(stored);
            };
            let staged_first = match &stored {
                None => true,
                Some((stored_key, _)) => match order {
                    Order::Ascending => key <= stored_key,
                    Order::Descending => key >= stored_key,
                },
            };
            if !staged_first {
                return Ok(stored);
            }
            match staged {
                Some(value) => return Ok(Some((key.clone(), value.clone()))),
                None => range.advance_past(key, order),
            }
        }
    }

    fn first_staged(
        &self,
        range: &KeyRange,
        order: Order,
    ) -> Option<(&Vec<u8>, &Option<Vec<u8>>)> {
        let mut entries = self.index.range::<[u8], _>(range.as_bounds());
        match order {
            Order::Ascending => entries.next(),
            Order::Descending => entries.next_back(),
        }
    }

    /// Number of staged operations
    #[must_use]
    pub fn len(&self) -> usize {
        self.journal.len()
    }

    /// Check if nothing is staged
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.journal.is_empty()
    }

    /// Apply staged operations to the backend in issue order, as one batch
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the batch; nothing is applied
    pub fn commit<S: StoreBackend + ?Sized>(self, backend: &mut S) -> BridgeResult<usize> {
        if self.journal.is_empty() {
            return Ok(0);
        }
        backend.apply_batch(&self.journal)?;
        Ok(self.journal.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn abc() -> MemoryStore {
        MemoryStore::from_records([
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ])
    }

    fn drain(overlay: &WriteOverlay, store: &MemoryStore, order: Order) -> Vec<Record> {
        let mut range = KeyRange::all();
        let mut out = Vec::new();
        while let Some(record) = overlay.seek(store, &range, order).unwrap() {
            range.advance_past(&record.0, order);
            out.push(record);
        }
        out
    }

    #[test]
    fn test_get_prefers_staged() {
        let store = abc();
        let mut overlay = WriteOverlay::new();
        overlay.set(b"a", b"9");
        overlay.remove(b"b");
        assert_eq!(overlay.get(&store, b"a").unwrap(), Some(b"9".to_vec()));
        assert_eq!(overlay.get(&store, b"b").unwrap(), None);
        assert_eq!(overlay.get(&store, b"c").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn test_seek_merges_and_hides_tombstones() {
        let store = abc();
        let mut overlay = WriteOverlay::new();
        overlay.remove(b"b");
        overlay.set(b"bb", b"x");
        overlay.set(b"c", b"33");

        let asc = drain(&overlay, &store, Order::Ascending);
        assert_eq!(
            asc,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"bb".to_vec(), b"x".to_vec()),
                (b"c".to_vec(), b"33".to_vec()),
            ]
        );
        let mut desc = drain(&overlay, &store, Order::Descending);
        desc.reverse();
        assert_eq!(asc, desc);
    }

    #[test]
    fn test_commit_replays_in_order() {
        let mut store = abc();
        let mut overlay = WriteOverlay::new();
        overlay.set(b"d", b"4");
        overlay.remove(b"d");
        overlay.remove(b"a");
        assert_eq!(overlay.commit(&mut store).unwrap(), 3);
        assert_eq!(store.get(b"d").unwrap(), None);
        assert_eq!(store.get(b"a").unwrap(), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_failed_commit_applies_nothing() {
        let mut store = abc();
        let mut overlay = WriteOverlay::new();
        overlay.set(b"a", b"9");
        overlay.remove(b"b");
        overlay.set(b"d", b"4");

        store.set_available(false);
        assert!(overlay.commit(&mut store).is_err());
        store.set_available(true);
        assert_eq!(store.records(), abc().records());
    }

    #[test]
    fn test_drop_discards() {
        let store = abc();
        {
            let mut overlay = WriteOverlay::new();
            overlay.set(b"z", b"26");
            assert_eq!(overlay.len(), 1);
        }
        assert_eq!(store.len(), 3);
    }

    #[derive(Debug, Clone)]
    enum Action {
        Set(u8, u8),
        Remove(u8),
    }

    fn action() -> impl Strategy<Value = Action> {
        prop_oneof![
            (0u8..8, any::<u8>()).prop_map(|(k, v)| Action::Set(k, v)),
            (0u8..8).prop_map(Action::Remove),
        ]
    }

    proptest::proptest! {
        #[test]
        fn prop_overlay_scan_matches_reference(
            seed in prop::collection::btree_map(0u8..8, any::<u8>(), 0..8),
            actions in prop::collection::vec(action(), 0..16),
        ) {
            let store = MemoryStore::from_records(seed.iter().map(|(k, v)| (vec![*k], vec![*v])));
            let mut reference: BTreeMap<Vec<u8>, Vec<u8>> =
                seed.iter().map(|(k, v)| (vec![*k], vec![*v])).collect();
            let mut overlay = WriteOverlay::new();
            for action in actions {
                match action {
                    Action::Set(k, v) => {
                        overlay.set(&[k], &[v]);
                        reference.insert(vec![k], vec![v]);
                    }
                    Action::Remove(k) => {
                        overlay.remove(&[k]);
                        reference.remove(&vec![k]);
                    }
                }
            }
            let expected: Vec<Record> = reference.into_iter().collect();
            prop_assert_eq!(drain(&overlay, &store, Order::Ascending), expected.clone());

            let mut committed = store.clone();
            overlay.commit(&mut committed).unwrap();
            prop_assert_eq!(store.records(), expected);
        }
    }
}
