//! Enclave errors.

use sealvm_core::Status;

/// Result type of enclave operations
pub type EnclaveResult<T> = Result<T, EnclaveError>;

/// Enclave errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnclaveError {
    /// Operation called in the wrong lifecycle state
    #[error("Invalid state: {operation} is not allowed while {state}")]
    InvalidState {
        /// Rejected operation
        operation: &'static str,
        /// State the enclave was in
        state: String,
    },

    /// Sealed data was tampered with or sealed elsewhere
    #[error("Unsealing failed: {0}")]
    Unseal(String),

    /// Sealing failed
    #[error("Sealing failed: {0}")]
    Seal(String),

    /// Secret material does not match what it was checked against
    #[error("Integrity mismatch: {0}")]
    IntegrityMismatch(String),

    /// Malformed report bytes
    #[error("Invalid report: {0}")]
    InvalidReport(String),

    /// Evidence failed verification
    #[error("Invalid evidence: {0}")]
    InvalidEvidence(String),

    /// Credentials malformed or refused
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Provisioning service refused the submission
    #[error("Provisioning rejected: {0}")]
    ProvisioningRejected(String),

    /// Internal fault, such as a poisoned lock
    #[error("Internal fault: {0}")]
    Internal(String),
}

impl EnclaveError {
    /// Classify this error
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidState { .. }
            | Self::Unseal(_)
            | Self::IntegrityMismatch(_)
            | Self::InvalidReport(_)
            | Self::InvalidEvidence(_)
            | Self::InvalidCredentials(_) => Status::BadArgument,
            Self::Seal(_) | Self::ProvisioningRejected(_) | Self::Internal(_) => Status::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status() {
        let err = EnclaveError::InvalidState {
            operation: "init_node",
            state: "uninitialized".into(),
        };
        assert_eq!(err.status(), Status::BadArgument);
        assert_eq!(err.to_string(), "Invalid state: init_node is not allowed while uninitialized");
        assert_eq!(EnclaveError::Internal("x".into()).status(), Status::Other);
    }
}
