//! SealVM Enclave
//!
//! Identity and attestation lifecycle of the isolated environment contracts
//! run in. The confidential-computing primitives (measurement, sealing,
//! report signing) sit behind the [`Platform`] trait; [`SoftwarePlatform`]
//! implements them in software for development nodes and tests.
//!
//! An [`Enclave`] moves through
//! `uninitialized -> bootstrapped -> node_initialized -> ready` and fails
//! closed: an operation that cannot complete leaves the state untouched.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod identity;
pub mod platform;
pub mod provisioning;
pub mod report;
mod seal;

pub use config::EnclaveConfig;
pub use error::{EnclaveError, EnclaveResult};
pub use identity::{BootstrapOutput, Enclave, EnclaveState, HealthStatus, KeyPair};
pub use platform::{Platform, SoftwarePlatform};
pub use provisioning::{LocalProvisioning, ProvisioningCredentials, ProvisioningService};
pub use report::{EnclaveReport, Evidence, ReportAttributes, REPORT_SIZE};
