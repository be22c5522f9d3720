//! Gas metering for contract calls.
//!
//! One [`GasMeter`] is threaded through every host callback of a call. Wasm
//! instruction fuel and callback costs are charged against the same limit,
//! so `used` is the single source of truth for what a call consumed.

use serde::{Deserialize, Serialize};

/// Gas meter for one contract call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasMeter {
    limit: u64,
    used: u64,
}

impl GasMeter {
    /// Create a new meter with a limit
    #[must_use]
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// Charge gas for an operation
    ///
    /// On failure the meter is exhausted (`used == limit`) so that an
    /// aborted call always reports its full limit as consumed.
    ///
    /// # Errors
    ///
    /// Returns error if `amount` exceeds the remaining gas
    pub fn charge(&mut self, amount: u64, operation: &str) -> Result<(), GasError> {
        let remaining = self.remaining();
        if amount > remaining {
            self.used = self.limit;
            return Err(GasError::OutOfGas {
                operation: operation.to_string(),
                requested: amount,
                remaining,
            });
        }
        self.used += amount;
        Ok(())
    }

    /// Check if there's enough gas for an operation
    #[must_use]
    pub fn can_afford(&self, amount: u64) -> bool {
        amount <= self.remaining()
    }

    /// Get remaining gas
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.limit - self.used
    }

    /// Get gas used so far
    #[must_use]
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Get the gas limit
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Check if the meter is exhausted
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.used == self.limit
    }

    /// Mark the whole limit as used
    pub fn exhaust(&mut self) {
        self.used = self.limit;
    }
}

/// Gas cost policy for host callbacks
///
/// Wasm fuel is charged 1:1. Callback costs are a flat base plus a per-byte
/// component on the bytes crossing the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasCosts {
    /// Base cost of a storage read
    pub db_read: u64,
    /// Base cost of a storage write
    pub db_write: u64,
    /// Base cost of a storage removal
    pub db_remove: u64,
    /// Base cost of opening an iterator
    pub db_scan: u64,
    /// Base cost of advancing an iterator
    pub db_next: u64,
    /// Cost per byte read from or written to storage
    pub per_byte: u64,
    /// Cost of canonicalizing an address
    pub canonicalize: u64,
    /// Cost of humanizing an address
    pub humanize: u64,
    /// Base cost of a cross-contract query
    pub query: u64,
    /// Cost of a guest debug line
    pub debug: u64,
}

impl GasCosts {
    /// Create the default cost table
    #[must_use]
    pub fn new() -> Self {
        Self {
            db_read: 1_000,
            db_write: 2_000,
            db_remove: 1_000,
            db_scan: 2_000,
            db_next: 500,
            per_byte: 3,
            canonicalize: 4_000,
            humanize: 4_000,
            query: 10_000,
            debug: 100,
        }
    }

    /// A table where every callback is free; only wasm fuel is charged
    #[must_use]
    pub fn free() -> Self {
        Self {
            db_read: 0,
            db_write: 0,
            db_remove: 0,
            db_scan: 0,
            db_next: 0,
            per_byte: 0,
            canonicalize: 0,
            humanize: 0,
            query: 0,
            debug: 0,
        }
    }

    /// Cost of `len` bytes crossing the boundary
    #[must_use]
    pub fn bytes_cost(&self, len: usize) -> u64 {
        (len as u64).saturating_mul(self.per_byte)
    }

    /// Cost of a read, charged before the lookup
    #[must_use]
    pub fn read_cost(&self, key_len: usize) -> u64 {
        self.db_read.saturating_add(self.bytes_cost(key_len))
    }

    /// Cost of a write
    #[must_use]
    pub fn write_cost(&self, key_len: usize, value_len: usize) -> u64 {
        self.db_write
            .saturating_add(self.bytes_cost(key_len))
            .saturating_add(self.bytes_cost(value_len))
    }

    /// Cost of a removal
    #[must_use]
    pub fn remove_cost(&self, key_len: usize) -> u64 {
        self.db_remove.saturating_add(self.bytes_cost(key_len))
    }

    /// Cost of opening an iterator over the given bound lengths
    #[must_use]
    pub fn scan_cost(&self, bounds_len: usize) -> u64 {
        self.db_scan.saturating_add(self.bytes_cost(bounds_len))
    }
}

impl Default for GasCosts {
    fn default() -> Self {
        Self::new()
    }
}

/// Gas-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GasError {
    /// Gas limit reached
    #[error("Out of gas during {operation}: requested {requested}, remaining {remaining}")]
    OutOfGas {
        /// Operation that exhausted the meter
        operation: String,
        /// Amount the operation needed
        requested: u64,
        /// Amount that was left
        remaining: u64,
    },
}
