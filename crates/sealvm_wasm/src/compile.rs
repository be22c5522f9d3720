//! Bytecode validation, static analysis and compilation.

use crate::abi::{self, IMPORT_MODULE};
use crate::memory::MemoryLimit;
use sealvm_core::{Capability, CapabilitySet, Checksum, Status};
use sealvm_storage::AccessMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use wasmtime::{Engine, ExternType, Module};

/// Prefix of exports declaring a required capability
pub const REQUIRES_PREFIX: &str = "requires_";

/// Exports reported as special entry points by [`AnalysisReport`]
pub const SPECIAL_ENTRY_POINTS: &[&str] = &[
    "ibc_channel_open",
    "ibc_channel_connect",
    "ibc_channel_close",
    "ibc_packet_receive",
    "ibc_packet_ack",
    "ibc_packet_timeout",
];

/// Entry points the engine can call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    /// First call after code upload
    Instantiate,
    /// State-changing call
    Execute,
    /// Read-only call
    Query,
}

impl EntryPoint {
    /// All entry points
    pub const ALL: [EntryPoint; 3] = [Self::Instantiate, Self::Execute, Self::Query];

    /// Export name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Instantiate => "instantiate",
            Self::Execute => "execute",
            Self::Query => "query",
        }
    }

    /// Storage access the entry point is allowed
    #[must_use]
    pub const fn access_mode(self) -> AccessMode {
        match self {
            Self::Instantiate | Self::Execute => AccessMode::ReadWrite,
            Self::Query => AccessMode::ReadOnly,
        }
    }
}

impl std::fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of static inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Whether any special entry point is exported
    pub has_special_entry_points: bool,
    /// Special entry points exported, sorted
    pub special_entry_points: Vec<String>,
    /// Capabilities the code requires
    pub required_capabilities: CapabilitySet,
    /// Standard entry points exported
    pub entry_points: BTreeSet<EntryPoint>,
}

/// Compilation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// Invalid WASM module
    #[error("Invalid WASM module: {0}")]
    InvalidModule(String),

    /// Module does not follow the contract interface
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Size limit exceeded
    #[error("Module size {size} exceeds limit {limit}")]
    SizeLimitExceeded {
        /// Bytecode size
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// Initial memory does not fit the limit
    #[error("Memory limit {limit} too small, need at least {needed}")]
    MemoryLimitTooSmall {
        /// Configured limit in bytes
        limit: u64,
        /// Initial memory in bytes
        needed: u64,
    },

    /// Required capabilities the host does not support
    #[error("Unsupported capabilities: {0}")]
    UnsupportedCapabilities(String),

    /// Code generation failed
    #[error("Code generation failed: {0}")]
    Codegen(String),
}

impl CompileError {
    /// Classify this error
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Codegen(_) => Status::Other,
            _ => Status::BadArgument,
        }
    }
}

/// Compiled module ready for execution
#[derive(Debug, Clone)]
pub struct CompiledModule {
    checksum: Checksum,
    code: Arc<[u8]>,
    module: Module,
    report: AnalysisReport,
}

impl CompiledModule {
    /// Checksum of the bytecode
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Original bytecode
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Bytecode size in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.code.len()
    }

    /// Compiled wasmtime module
    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Static analysis of the bytecode
    #[must_use]
    pub fn report(&self) -> &AnalysisReport {
        &self.report
    }
}

/// Validates and compiles contract bytecode
#[derive(Debug, Clone)]
pub struct ModuleCompiler {
    max_size: usize,
    memory_limit: MemoryLimit,
    supported: CapabilitySet,
}

impl ModuleCompiler {
    /// Create a new compiler
    #[must_use]
    pub fn new(max_size: usize, memory_limit: MemoryLimit, supported: CapabilitySet) -> Self {
        Self {
            max_size,
            memory_limit,
            supported,
        }
    }

    /// Check size, magic number and version before parsing
    ///
    /// # Errors
    ///
    /// Returns error if the header is not a WASM 1.0 module or the bytecode
    /// is too large
    pub fn check_header(&self, wasm: &[u8]) -> Result<(), CompileError> {
        if wasm.len() > self.max_size {
            return Err(CompileError::SizeLimitExceeded {
                size: wasm.len(),
                limit: self.max_size,
            });
        }
        if wasm.len() < 8 {
            return Err(CompileError::InvalidModule("Too small".to_string()));
        }
        if &wasm[0..4] != b"\0asm" {
            return Err(CompileError::InvalidModule(
                "Invalid magic number".to_string(),
            ));
        }
        let version = &wasm[4..8];
        if version != b"\x01\x00\x00\x00" {
            return Err(CompileError::InvalidModule(format!(
                "Unsupported version: {:?}",
                version
            )));
        }
        Ok(())
    }

    /// Validate, inspect and compile bytecode
    ///
    /// # Errors
    ///
    /// Returns error if the bytecode is malformed, does not follow the
    /// contract interface, needs unsupported capabilities, or fails to
    /// compile
    pub fn compile(
        &self,
        engine: &Engine,
        checksum: Checksum,
        wasm: &[u8],
    ) -> Result<CompiledModule, CompileError> {
        self.check_header(wasm)?;
        Module::validate(engine, wasm).map_err(|e| CompileError::InvalidModule(format!("{:#}", e)))?;
        let module =
            Module::new(engine, wasm).map_err(|e| CompileError::Codegen(format!("{:#}", e)))?;
        let report = self.inspect(&module)?;

        if !self.supported.supports(&report.required_capabilities) {
            let missing = self.supported.missing(&report.required_capabilities);
            return Err(CompileError::UnsupportedCapabilities(missing.to_list()));
        }

        Ok(CompiledModule {
            checksum,
            code: Arc::from(wasm),
            module,
            report,
        })
    }

    /// Check imports and exports against the contract interface
    fn inspect(&self, module: &Module) -> Result<AnalysisReport, CompileError> {
        for import in module.imports() {
            let name = import.name();
            if import.module() != IMPORT_MODULE {
                return Err(CompileError::ValidationFailed(format!(
                    "import {}.{} is outside module {}",
                    import.module(),
                    name,
                    IMPORT_MODULE
                )));
            }
            let signature = abi::lookup(name).ok_or_else(|| {
                CompileError::ValidationFailed(format!("unknown import {}", name))
            })?;
            match import.ty() {
                ExternType::Func(ty) if signature.matches(&ty) => {}
                _ => {
                    return Err(CompileError::ValidationFailed(format!(
                        "import {} has the wrong signature",
                        name
                    )));
                }
            }
        }

        let mut has_memory = false;
        let mut has_allocate = false;
        let mut has_deallocate = false;
        let mut entry_points = BTreeSet::new();
        let mut special = Vec::new();
        let mut required = CapabilitySet::new();

        for export in module.exports() {
            let name = export.name();
            match (name, export.ty()) {
                ("memory", ExternType::Memory(ty)) => {
                    let needed = ty.minimum();
                    if !self.memory_limit.pages_within_limit(needed) {
                        return Err(CompileError::MemoryLimitTooSmall {
                            limit: self.memory_limit.max_bytes,
                            needed: needed.saturating_mul(crate::memory::PAGE_SIZE),
                        });
                    }
                    has_memory = true;
                }
                ("allocate", ExternType::Func(ty)) if abi::has_i32_signature(&ty, 1, 1) => {
                    has_allocate = true;
                }
                ("deallocate", ExternType::Func(ty)) if abi::has_i32_signature(&ty, 1, 0) => {
                    has_deallocate = true;
                }
                (_, ExternType::Func(ty)) => {
                    if let Some(entry) = EntryPoint::ALL.iter().find(|e| e.as_str() == name) {
                        if !abi::has_i32_signature(&ty, 2, 1) {
                            return Err(CompileError::ValidationFailed(format!(
                                "entry point {} has the wrong signature",
                                name
                            )));
                        }
                        entry_points.insert(*entry);
                    } else if SPECIAL_ENTRY_POINTS.contains(&name) {
                        special.push(name.to_string());
                    } else if let Some(cap) = name.strip_prefix(REQUIRES_PREFIX) {
                        let cap = Capability::new(cap)
                            .map_err(|e| CompileError::ValidationFailed(e.to_string()))?;
                        required.insert(cap);
                    }
                }
                _ => {}
            }
        }

        if !has_memory {
            return Err(CompileError::ValidationFailed(
                "missing memory export".to_string(),
            ));
        }
        if !(has_allocate && has_deallocate) {
            return Err(CompileError::ValidationFailed(
                "missing allocate/deallocate exports".to_string(),
            ));
        }
        if entry_points.is_empty() {
            return Err(CompileError::ValidationFailed(
                "no entry point exported".to_string(),
            ));
        }

        special.sort();
        Ok(AnalysisReport {
            has_special_entry_points: !special.is_empty(),
            special_entry_points: special,
            required_capabilities: required,
            entry_points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata;

    fn compiler() -> ModuleCompiler {
        ModuleCompiler::new(
            10 * 1024 * 1024,
            MemoryLimit::default(),
            CapabilitySet::parse_list("iterator,staking").unwrap(),
        )
    }

    fn compile(wat: &str) -> Result<CompiledModule, CompileError> {
        let wasm = wat::parse_str(wat).unwrap();
        compiler().compile(&Engine::default(), Checksum::generate(&wasm), &wasm)
    }

    #[test]
    fn test_header_checks() {
        let compiler = compiler();
        assert!(matches!(
            compiler.check_header(b"\0as"),
            Err(CompileError::InvalidModule(_))
        ));
        assert!(compiler.check_header(b"\x7fELF\x01\x00\x00\x00").is_err());
        assert!(compiler.check_header(b"\0asm\x02\x00\x00\x00").is_err());
        assert!(compiler.check_header(b"\0asm\x01\x00\x00\x00").is_ok());

        let small = ModuleCompiler::new(4, MemoryLimit::default(), CapabilitySet::new());
        assert!(matches!(
            small.check_header(b"\0asm\x01\x00\x00\x00"),
            Err(CompileError::SizeLimitExceeded { size: 8, limit: 4 })
        ));
    }

    #[test]
    fn test_garbage_is_invalid() {
        let compiler = compiler();
        let mut wasm = b"\0asm\x01\x00\x00\x00".to_vec();
        wasm.extend_from_slice(&[0xff; 16]);
        let err = compiler
            .compile(&Engine::default(), Checksum::generate(&wasm), &wasm)
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidModule(_)));
        assert_eq!(err.status(), Status::BadArgument);
    }

    #[test]
    fn test_full_contract_report() {
        let module = compile(testdata::CONTRACT_WAT).unwrap();
        let report = module.report();
        assert_eq!(report.entry_points.len(), 3);
        assert!(!report.has_special_entry_points);
        assert!(report.required_capabilities.is_empty());
    }

    #[test]
    fn test_special_entry_points_and_capabilities() {
        let module = compile(testdata::IBC_CONTRACT_WAT).unwrap();
        let report = module.report();
        assert!(report.has_special_entry_points);
        assert_eq!(report.special_entry_points, vec!["ibc_packet_receive"]);
        assert_eq!(report.required_capabilities.to_list(), "staking");
        assert_eq!(
            report.entry_points.iter().copied().collect::<Vec<_>>(),
            vec![EntryPoint::Query]
        );
    }

    #[test]
    fn test_unsupported_capability() {
        let err = compile(
            r#"(module
                (memory (export "memory") 1)
                (func (export "allocate") (param i32) (result i32) (i32.const 0))
                (func (export "deallocate") (param i32))
                (func (export "query") (param i32 i32) (result i32) (i32.const 0))
                (func (export "requires_stargate")))"#,
        )
        .unwrap_err();
        assert_eq!(err, CompileError::UnsupportedCapabilities("stargate".into()));
    }

    #[test]
    fn test_missing_exports() {
        let err = compile(
            r#"(module
                (func (export "allocate") (param i32) (result i32) (i32.const 0))
                (func (export "deallocate") (param i32))
                (func (export "query") (param i32 i32) (result i32) (i32.const 0)))"#,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::ValidationFailed(ref m) if m.contains("memory")));

        let err = compile(
            r#"(module
                (memory (export "memory") 1)
                (func (export "allocate") (param i32) (result i32) (i32.const 0))
                (func (export "deallocate") (param i32)))"#,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::ValidationFailed(ref m) if m.contains("entry point")));
    }

    #[test]
    fn test_unknown_import_rejected() {
        let err = compile(
            r#"(module
                (import "env" "spawn_thread" (func (param i32)))
                (memory (export "memory") 1)
                (func (export "allocate") (param i32) (result i32) (i32.const 0))
                (func (export "deallocate") (param i32))
                (func (export "query") (param i32 i32) (result i32) (i32.const 0)))"#,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::ValidationFailed(ref m) if m.contains("spawn_thread")));
    }

    #[test]
    fn test_wrong_import_signature_rejected() {
        let err = compile(
            r#"(module
                (import "env" "db_read" (func (param i64) (result i32)))
                (memory (export "memory") 1)
                (func (export "allocate") (param i32) (result i32) (i32.const 0))
                (func (export "deallocate") (param i32))
                (func (export "query") (param i32 i32) (result i32) (i32.const 0)))"#,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::ValidationFailed(_)));
    }

    #[test]
    fn test_memory_over_limit() {
        let compiler = ModuleCompiler::new(
            1024 * 1024,
            MemoryLimit::with_pages(1),
            CapabilitySet::new(),
        );
        let wasm = wat::parse_str(
            r#"(module
                (memory (export "memory") 2)
                (func (export "allocate") (param i32) (result i32) (i32.const 0))
                (func (export "deallocate") (param i32))
                (func (export "query") (param i32 i32) (result i32) (i32.const 0)))"#,
        )
        .unwrap();
        let err = compiler
            .compile(&Engine::default(), Checksum::generate(&wasm), &wasm)
            .unwrap_err();
        assert!(matches!(err, CompileError::MemoryLimitTooSmall { .. }));
    }
}
