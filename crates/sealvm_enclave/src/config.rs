//! Enclave configuration.

use serde::{Deserialize, Serialize};

/// Identity fields reported in attestation evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnclaveConfig {
    /// Product identifier
    pub isv_prod_id: u16,
    /// Security version
    pub isv_svn: u16,
    /// Report the enclave as debuggable
    pub debug: bool,
}

impl EnclaveConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set product identifier
    #[must_use]
    pub fn with_isv_prod_id(mut self, id: u16) -> Self {
        self.isv_prod_id = id;
        self
    }

    /// Set security version
    #[must_use]
    pub fn with_isv_svn(mut self, svn: u16) -> Self {
        self.isv_svn = svn;
        self
    }

    /// Set debug flag
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Default for EnclaveConfig {
    fn default() -> Self {
        Self {
            isv_prod_id: 0,
            isv_svn: 1,
            debug: false,
        }
    }
}
