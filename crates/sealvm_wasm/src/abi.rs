//! Host import table.
//!
//! Every function a contract may import lives in module `env` and takes and
//! returns only `i32` values: region pointers, iterator ids and scan order.

use serde::Serialize;
use wasmtime::{FuncType, ValType};

/// Module name all host imports live under
pub const IMPORT_MODULE: &str = "env";

/// Longest human readable address accepted from a contract
pub const MAX_ADDRESS_LEN: usize = 256;

/// Longest query request or debug message accepted from a contract
pub const MAX_QUERY_LEN: usize = 256 * 1024;

/// Longest entry point result accepted from a contract
pub const MAX_RESULT_LEN: usize = 64 * 1024 * 1024;

/// Signature of one host import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSignature {
    /// Function name
    pub name: &'static str,
    /// Number of `i32` parameters
    pub params: usize,
    /// Number of `i32` results
    pub results: usize,
}

impl ImportSignature {
    const fn new(name: &'static str, params: usize, results: usize) -> Self {
        Self {
            name,
            params,
            results,
        }
    }

    /// Check a function type against this signature
    #[must_use]
    pub fn matches(&self, ty: &FuncType) -> bool {
        has_i32_signature(ty, self.params, self.results)
    }
}

/// All host imports a contract may use
pub const HOST_IMPORTS: &[ImportSignature] = &[
    ImportSignature::new("db_read", 1, 1),
    ImportSignature::new("db_write", 2, 0),
    ImportSignature::new("db_remove", 1, 0),
    ImportSignature::new("db_scan", 3, 1),
    ImportSignature::new("db_next", 1, 1),
    ImportSignature::new("addr_canonicalize", 1, 1),
    ImportSignature::new("addr_humanize", 1, 1),
    ImportSignature::new("query_chain", 1, 1),
    ImportSignature::new("debug", 1, 0),
];

/// Look up a host import by name
#[must_use]
pub fn lookup(name: &str) -> Option<&'static ImportSignature> {
    HOST_IMPORTS.iter().find(|sig| sig.name == name)
}

/// Check that `ty` takes `params` and returns `results` values, all `i32`
#[must_use]
pub fn has_i32_signature(ty: &FuncType, params: usize, results: usize) -> bool {
    ty.params().len() == params
        && ty.results().len() == results
        && ty
            .params()
            .chain(ty.results())
            .all(|t| matches!(t, ValType::I32))
}
