//! SealVM Storage
//!
//! The storage half of the contract host boundary: the [`StoreBackend`]
//! trait hosts implement, key ranges and scan order, the write overlay that
//! keeps a failed call from leaving partial writes behind, the iterator
//! registry, and the gas-metered [`StorageBridge`] that ties them together.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod bridge;
pub mod iterator;
pub mod memory;
pub mod overlay;
pub mod range;

pub use backend::{StoreBackend, WriteOp};
pub use bridge::{AccessMode, StorageBridge, StorageLimits};
pub use iterator::{IteratorHandle, IteratorRegistry, StoreId};
pub use memory::{MemoryStore, StoreStats};
pub use overlay::WriteOverlay;
pub use range::{KeyRange, Order, Record};
