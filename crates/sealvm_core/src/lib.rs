//! SealVM Core Types
//!
//! Pure types shared by every layer of the contract host boundary: the
//! status taxonomy that crosses the boundary, code checksums, gas metering,
//! capability sets, the contract environment and the result envelope.
//! Nothing in this crate performs I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capability;
pub mod checksum;
pub mod env;
pub mod envelope;
pub mod error;
pub mod gas;
pub mod status;

// Re-exports
pub use capability::{Capability, CapabilitySet};
pub use checksum::Checksum;
pub use env::{BlockInfo, ContractInfo, Env, MessageInfo};
pub use envelope::ContractResult;
pub use error::{CoreError, CoreResult};
pub use gas::{GasCosts, GasError, GasMeter};
pub use status::{BridgeError, BridgeResult, Status};
