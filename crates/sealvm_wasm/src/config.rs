//! Module cache configuration.

use crate::memory::MemoryLimit;
use sealvm_core::{CapabilitySet, GasCosts};
use sealvm_storage::StorageLimits;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default maximum size of contract bytecode (10 MiB)
pub const DEFAULT_MAX_WASM_SIZE: usize = 10 * 1024 * 1024;

/// Module cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for persisted bytecode; memory only when unset
    pub data_dir: Option<PathBuf>,
    /// Capabilities this host offers to contracts
    pub supported_capabilities: CapabilitySet,
    /// Maximum bytecode size in bytes
    pub max_wasm_size: usize,
    /// Guest memory limit per instance
    pub memory_limit: MemoryLimit,
    /// Gas schedule for host callbacks
    pub gas_costs: GasCosts,
    /// Key and value size limits for storage callbacks
    pub storage_limits: StorageLimits,
}

impl CacheConfig {
    /// Create a memory-only configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist bytecode under `dir`
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set supported capabilities
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.supported_capabilities = capabilities;
        self
    }

    /// Set maximum bytecode size
    #[must_use]
    pub fn with_max_wasm_size(mut self, size: usize) -> Self {
        self.max_wasm_size = size;
        self
    }

    /// Set guest memory limit
    #[must_use]
    pub fn with_memory_limit(mut self, limit: MemoryLimit) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Set gas schedule
    #[must_use]
    pub fn with_gas_costs(mut self, costs: GasCosts) -> Self {
        self.gas_costs = costs;
        self
    }

    /// Set storage limits
    #[must_use]
    pub fn with_storage_limits(mut self, limits: StorageLimits) -> Self {
        self.storage_limits = limits;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            supported_capabilities: CapabilitySet::new(),
            max_wasm_size: DEFAULT_MAX_WASM_SIZE,
            memory_limit: MemoryLimit::default(),
            gas_costs: GasCosts::default(),
            storage_limits: StorageLimits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"supported_capabilities": ["iterator", "staking"]}"#).unwrap();
        assert_eq!(config.supported_capabilities.len(), 2);
        assert_eq!(config.max_wasm_size, DEFAULT_MAX_WASM_SIZE);
        assert_eq!(config.memory_limit, MemoryLimit::default());
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::new()
            .with_data_dir("/tmp/sealvm")
            .with_max_wasm_size(1024)
            .with_memory_limit(MemoryLimit::with_pages(4));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/sealvm")));
        assert_eq!(config.max_wasm_size, 1024);
        assert_eq!(config.memory_limit.max_pages, 4);
    }
}
