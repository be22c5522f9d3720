//! Host storage interface.

use crate::range::{KeyRange, Order, Record};
use sealvm_core::BridgeResult;

/// One staged mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Store a value under a key
    Set(Vec<u8>, Vec<u8>),
    /// Remove a key
    Remove(Vec<u8>),
}

/// Key/value store implemented by the host
///
/// Absence of a key is a successful `None`, never an error. Errors are
/// reserved for the host being unable to answer at all, and are classified
/// through [`sealvm_core::BridgeError`].
pub trait StoreBackend {
    /// Read the value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns error if the host cannot answer
    fn get(&self, key: &[u8]) -> BridgeResult<Option<Vec<u8>>>;

    /// Store `value` under `key`
    ///
    /// # Errors
    ///
    /// Returns error on host-side failure
    fn set(&mut self, key: &[u8], value: &[u8]) -> BridgeResult<()>;

    /// Remove `key`; removing an absent key succeeds
    ///
    /// # Errors
    ///
    /// Returns error on host-side failure
    fn remove(&mut self, key: &[u8]) -> BridgeResult<()>;

    /// First record of `range` in `order`, if any
    ///
    /// # Errors
    ///
    /// Returns error if the host cannot answer
    fn seek(&self, range: &KeyRange, order: Order) -> BridgeResult<Option<Record>>;

    /// Apply `ops` in order as one unit: either every operation takes
    /// effect or none does
    ///
    /// # Errors
    ///
    /// Returns error on host-side failure, with the store unchanged
    fn apply_batch(&mut self, ops: &[WriteOp]) -> BridgeResult<()>;
}

impl<T: StoreBackend + ?Sized> StoreBackend for Box<T> {
    fn get(&self, key: &[u8]) -> BridgeResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> BridgeResult<()> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &[u8]) -> BridgeResult<()> {
        (**self).remove(key)
    }

    fn seek(&self, range: &KeyRange, order: Order) -> BridgeResult<Option<Record>> {
        (**self).seek(range, order)
    }

    fn apply_batch(&mut self, ops: &[WriteOp]) -> BridgeResult<()> {
        (**self).apply_batch(ops)
    }
}
