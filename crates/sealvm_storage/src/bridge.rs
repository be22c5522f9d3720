//! Gas-metered storage bridge.
//!
//! Every operation takes the call's [`GasMeter`] explicitly. Costs that are
//! known up front are charged before anything happens, so a call that runs
//! out of gas never performs its side effect. Costs that depend on the
//! result (bytes read back) are charged before the result is returned.

use crate::backend::StoreBackend;
use crate::iterator::{IteratorHandle, IteratorRegistry, StoreId};
use crate::overlay::WriteOverlay;
use crate::range::{KeyRange, Order, Record};
use sealvm_core::{BridgeError, BridgeResult, GasCosts, GasMeter};
use serde::{Deserialize, Serialize};

/// Whether the call may mutate state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// instantiate / execute
    ReadWrite,
    /// query
    ReadOnly,
}

/// Size limits on keys and values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageLimits {
    /// Maximum key length in bytes
    pub max_key_len: usize,
    /// Maximum value length in bytes
    pub max_value_len: usize,
}

impl StorageLimits {
    /// Create the default limits (64 KiB keys, 128 KiB values)
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_key_len: 64 * 1024,
            max_value_len: 128 * 1024,
        }
    }

    /// Set maximum key length
    #[must_use]
    pub fn with_max_key_len(mut self, len: usize) -> Self {
        self.max_key_len = len;
        self
    }

    /// Set maximum value length
    #[must_use]
    pub fn with_max_value_len(mut self, len: usize) -> Self {
        self.max_value_len = len;
        self
    }
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage bridge for one contract call
///
/// Owns the host backend for the duration of the call. Writes are staged
/// and reach the backend only through [`StorageBridge::finish`] with
/// `commit = true`.
#[derive(Debug)]
pub struct StorageBridge<S> {
    backend: S,
    store: StoreId,
    mode: AccessMode,
    overlay: WriteOverlay,
    iterators: IteratorRegistry,
    costs: GasCosts,
    limits: StorageLimits,
}

impl<S: StoreBackend> StorageBridge<S> {
    /// Open a bridge over `backend`
    #[must_use]
    pub fn new(backend: S, mode: AccessMode, costs: GasCosts, limits: StorageLimits) -> Self {
        let store = StoreId::next();
        let mut iterators = IteratorRegistry::new();
        iterators.open_store(store);
        Self {
            backend,
            store,
            mode,
            overlay: WriteOverlay::new(),
            iterators,
            costs,
            limits,
        }
    }

    /// Identifier of the store handle
    #[must_use]
    pub fn store_id(&self) -> StoreId {
        self.store
    }

    /// Access mode of the call
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Key and value size limits
    #[must_use]
    pub fn limits(&self) -> &StorageLimits {
        &self.limits
    }

    /// Number of staged writes and removals
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.overlay.len()
    }

    /// Read a key
    ///
    /// # Errors
    ///
    /// Returns bad-argument for an invalid key, out-of-gas, or the backend's
    /// error if it cannot answer
    pub fn read(&self, gas: &mut GasMeter, key: &[u8]) -> BridgeResult<Option<Vec<u8>>> {
        self.check_key(key)?;
        gas.charge(self.costs.read_cost(key.len()), "db_read")?;
        let value = self.overlay.get(&self.backend, key)?;
        if let Some(value) = &value {
            gas.charge(self.costs.bytes_cost(value.len()), "db_read")?;
        }
        Ok(value)
    }

    /// Write a key
    ///
    /// # Errors
    ///
    /// Returns bad-argument in read-only mode or for an invalid key or
    /// value, or out-of-gas
    pub fn write(&mut self, gas: &mut GasMeter, key: &[u8], value: &[u8]) -> BridgeResult<()> {
        self.check_writable("write")?;
        self.check_key(key)?;
        if value.is_empty() {
            return Err(BridgeError::bad_argument("value must not be empty"));
        }
        if value.len() > self.limits.max_value_len {
            return Err(BridgeError::bad_argument(format!(
                "value of {} bytes exceeds limit {}",
                value.len(),
                self.limits.max_value_len
            )));
        }
        gas.charge(self.costs.write_cost(key.len(), value.len()), "db_write")?;
        self.overlay.set(key, value);
        Ok(())
    }

    /// Remove a key; removing an absent key succeeds
    ///
    /// # Errors
    ///
    /// Returns bad-argument in read-only mode or for an invalid key, or
    /// out-of-gas
    pub fn remove(&mut self, gas: &mut GasMeter, key: &[u8]) -> BridgeResult<()> {
        self.check_writable("remove")?;
        self.check_key(key)?;
        gas.charge(self.costs.remove_cost(key.len()), "db_remove")?;
        self.overlay.remove(key);
        Ok(())
    }

    /// Open an iterator; absent or empty bounds mean unbounded
    ///
    /// # Errors
    ///
    /// Returns out-of-gas, or bad-argument if the store handle was released
    pub fn scan(
        &mut self,
        gas: &mut GasMeter,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> BridgeResult<IteratorHandle> {
        let range = KeyRange::new(start.map(<[u8]>::to_vec), end.map(<[u8]>::to_vec));
        gas.charge(self.costs.scan_cost(range.bounds_len()), "db_scan")?;
        self.iterators.create(self.store, range, order)
    }

    /// Advance an iterator; `None` means exhausted
    ///
    /// # Errors
    ///
    /// Returns bad-argument for an unknown or released iterator, out-of-gas,
    /// or the backend's error if it cannot answer
    pub fn next(&mut self, gas: &mut GasMeter, handle: IteratorHandle) -> BridgeResult<Option<Record>> {
        let Self {
            backend,
            overlay,
            iterators,
            costs,
            ..
        } = self;
        gas.charge(costs.db_next, "db_next")?;
        let record = iterators.next(handle, |range, order| overlay.seek(&*backend, range, order))?;
        if let Some((key, value)) = &record {
            gas.charge(costs.bytes_cost(key.len() + value.len()), "db_next")?;
        }
        Ok(record)
    }

    /// Release the store handle, invalidating all of its iterators
    pub fn release(&mut self) {
        self.iterators.release_store(self.store);
    }

    /// End the call and hand the backend back
    ///
    /// With `commit = true` staged writes are applied to the backend as one
    /// batch; otherwise they are discarded.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the batch is rejected, in which case
    /// none of it was applied; the backend is still returned alongside it
    pub fn finish(self, commit: bool) -> (S, BridgeResult<usize>) {
        let Self {
            mut backend,
            store,
            overlay,
            ..
        } = self;
        if !commit {
            if !overlay.is_empty() {
                tracing::debug!(%store, discarded = overlay.len(), "Discarding staged writes");
            }
            return (backend, Ok(0));
        }
        let result = overlay.commit(&mut backend);
        if let Ok(count) = &result {
            tracing::debug!(%store, committed = *count, "Committed staged writes");
        }
        (backend, result)
    }

    fn check_writable(&self, operation: &str) -> BridgeResult<()> {
        match self.mode {
            AccessMode::ReadWrite => Ok(()),
            AccessMode::ReadOnly => Err(BridgeError::bad_argument(format!(
                "{} not permitted in a read-only call",
                operation
            ))),
        }
    }

    fn check_key(&self, key: &[u8]) -> BridgeResult<()> {
        if key.is_empty() {
            return Err(BridgeError::bad_argument("key must not be empty"));
        }
        if key.len() > self.limits.max_key_len {
            return Err(BridgeError::bad_argument(format!(
                "key of {} bytes exceeds limit {}",
                key.len(),
                self.limits.max_key_len
            )));
        }
        Ok(())
    }
}
