//! SealVM WASM Engine
//!
//! Validates, compiles and caches contract bytecode, and runs its entry
//! points inside wasmtime with one gas budget covering both instruction
//! fuel and every host callback the contract makes.
//!
//! The host plugs in its own storage, address codec and query router
//! through [`Backend`]; the engine hands the backend back after every call
//! together with the gas used and the outcome.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abi;
pub mod address;
pub mod backend;
pub mod cache;
pub mod code_store;
pub mod compile;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod imports;
pub mod memory;
pub mod querier;

#[cfg(test)]
pub(crate) mod testdata;

pub use abi::{ImportSignature, HOST_IMPORTS};
pub use address::HexAddressCodec;
pub use backend::{AddressCodec, Backend, QueryRouter};
pub use cache::{CacheStats, ModuleCache};
pub use code_store::CodeStore;
pub use compile::{AnalysisReport, CompileError, CompiledModule, EntryPoint, ModuleCompiler};
pub use config::CacheConfig;
pub use engine::CallReport;
pub use error::{VmError, VmResult};
pub use memory::{MemoryLimit, Region};
pub use querier::MockQuerier;
