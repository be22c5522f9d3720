//! Remote provisioning service interface.

use crate::error::{EnclaveError, EnclaveResult};
use crate::report::Evidence;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Mutex, PoisonError};

/// Credentials for the provisioning service
///
/// The API key is held as a secret and never printed.
pub struct ProvisioningCredentials {
    spid: String,
    api_key: SecretString,
}

impl ProvisioningCredentials {
    /// Create credentials
    ///
    /// # Errors
    ///
    /// Returns error if the SPID is not hex or the API key is empty
    pub fn new(spid: impl Into<String>, api_key: impl Into<String>) -> EnclaveResult<Self> {
        let spid = spid.into();
        let api_key = api_key.into();
        if spid.is_empty() || hex::decode(&spid).is_err() {
            return Err(EnclaveError::InvalidCredentials(
                "SPID must be non-empty hex".to_string(),
            ));
        }
        if api_key.trim().is_empty() {
            return Err(EnclaveError::InvalidCredentials(
                "API key must not be empty".to_string(),
            ));
        }
        Ok(Self {
            spid,
            api_key: SecretString::from(api_key),
        })
    }

    /// Service provider identifier
    #[must_use]
    pub fn spid(&self) -> &str {
        &self.spid
    }

    /// API key
    #[must_use]
    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }
}

impl std::fmt::Debug for ProvisioningCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningCredentials")
            .field("spid", &self.spid)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Remote service that registers attested enclaves
pub trait ProvisioningService: Send + Sync {
    /// Submit evidence on behalf of `credentials`
    ///
    /// # Errors
    ///
    /// Returns error if the service refuses the credentials or evidence
    fn submit(&self, credentials: &ProvisioningCredentials, evidence: &Evidence) -> EnclaveResult<()>;
}

/// In-process provisioning service accepting one API key
pub struct LocalProvisioning {
    api_key: SecretString,
    accepted: Mutex<Vec<Evidence>>,
}

impl LocalProvisioning {
    /// Create a service accepting `api_key`
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            accepted: Mutex::new(Vec::new()),
        }
    }

    /// Evidence accepted so far
    #[must_use]
    pub fn accepted(&self) -> Vec<Evidence> {
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProvisioningService for LocalProvisioning {
    fn submit(&self, credentials: &ProvisioningCredentials, evidence: &Evidence) -> EnclaveResult<()> {
        if credentials.api_key().expose_secret() != self.api_key.expose_secret() {
            return Err(EnclaveError::ProvisioningRejected(
                "unknown API key".to_string(),
            ));
        }
        evidence
            .verify()
            .map_err(|e| EnclaveError::ProvisioningRejected(e.to_string()))?;
        self.accepted
            .lock()
            .map_err(|_| EnclaveError::Internal("provisioning log poisoned".to_string()))?
            .push(evidence.clone());
        tracing::debug!(spid = %credentials.spid(), "Accepted attestation evidence");
        Ok(())
    }
}

impl std::fmt::Debug for LocalProvisioning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProvisioning").finish_non_exhaustive()
    }
}
