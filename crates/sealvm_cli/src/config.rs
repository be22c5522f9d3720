//! Node configuration file.

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use sealvm_enclave::EnclaveConfig;
use sealvm_wasm::CacheConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Data directory used when neither the file nor the flags name one
pub const DEFAULT_DATA_DIR: &str = ".sealvm";

/// Log filter used when neither `RUST_LOG` nor the file set one
pub const DEFAULT_LOG_FILTER: &str = "sealvm=info";

/// Node configuration, read from JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Module cache settings
    pub cache: CacheConfig,
    /// Enclave identity settings
    pub enclave: EnclaveConfig,
    /// `tracing` filter directive
    pub log_filter: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            enclave: EnclaveConfig::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl NodeConfig {
    /// Read `path`, or use defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .wrap_err_with(|| format!("Invalid config {}", path.display()))
    }

    /// Apply command line overrides and fill in the default data directory
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir {
            self.cache.data_dir = Some(dir);
        } else if self.cache.data_dir.is_none() {
            self.cache.data_dir = Some(PathBuf::from(DEFAULT_DATA_DIR));
        }
        self
    }

    /// Data directory, after overrides
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.cache
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = NodeConfig::load(None).unwrap().with_data_dir(None);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.data_dir(), PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn test_partial_file_and_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(
            &path,
            r#"{"cache": {"max_wasm_size": 2048, "data_dir": "/var/lib/sealvm"}, "enclave": {"debug": true}}"#,
        )
        .unwrap();

        let config = NodeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.cache.max_wasm_size, 2048);
        assert!(config.enclave.debug);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/sealvm"));

        let config = config.with_data_dir(Some(dir.path().to_path_buf()));
        assert_eq!(config.data_dir(), dir.path());
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(NodeConfig::load(Some(&path)).is_err());
        assert!(NodeConfig::load(Some(&dir.path().join("missing.json"))).is_err());
    }
}
