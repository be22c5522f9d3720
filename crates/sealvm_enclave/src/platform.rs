//! Confidential-computing primitives.

use crate::config::EnclaveConfig;
use crate::error::EnclaveResult;
use crate::report::{EnclaveReport, Evidence, ReportAttributes};
use crate::seal;
use ed25519_dalek::{Signer, SigningKey};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretBox};
use zeroize::Zeroizing;

const SEALING_CONTEXT: &str = "sealvm 2024-01-01 enclave sealing key";
const ATTESTATION_CONTEXT: &str = "sealvm 2024-01-01 enclave attestation key";
const SIGNER_CONTEXT: &str = "sealvm 2024-01-01 enclave signer measurement";

const FLAG_INITTED: u64 = 0x1;
const FLAG_DEBUG: u64 = 0x2;

/// Primitives the enclave lifecycle is built on
///
/// Sealed blobs must only unseal on a platform with the same root secret
/// and measurement. Evidence must bind `report_data` to the measurement.
pub trait Platform: Send + Sync {
    /// Measurement of the code running in the enclave
    fn measurement(&self) -> [u8; 32];

    /// Seal `secret` to this platform and measurement
    ///
    /// # Errors
    ///
    /// Returns error if sealing fails
    fn seal(&self, secret: &[u8]) -> EnclaveResult<Vec<u8>>;

    /// Recover a secret sealed by [`Platform::seal`]
    ///
    /// # Errors
    ///
    /// Returns error if the blob was tampered with or sealed elsewhere
    fn unseal(&self, blob: &[u8]) -> EnclaveResult<Zeroizing<Vec<u8>>>;

    /// Produce signed evidence carrying `report_data`
    ///
    /// # Errors
    ///
    /// Returns error if the report cannot be produced
    fn attest(&self, report_data: [u8; 64]) -> EnclaveResult<Evidence>;
}

/// Software implementation of [`Platform`]
///
/// Sealing and attestation keys are derived from a root secret with
/// BLAKE3; the sealing key also covers the measurement.
pub struct SoftwarePlatform {
    measurement: [u8; 32],
    sealing_key: SecretBox<[u8; 32]>,
    attestation_key: SigningKey,
    config: EnclaveConfig,
}

impl SoftwarePlatform {
    /// Create a platform with a fresh random root secret
    #[must_use]
    pub fn new(measurement: [u8; 32]) -> Self {
        let mut root = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut root[..]);
        Self::from_secret(&root, measurement)
    }

    /// Create a platform from a known root secret
    #[must_use]
    pub fn from_secret(root: &[u8; 32], measurement: [u8; 32]) -> Self {
        let mut material = Zeroizing::new([0u8; 64]);
        material[..32].copy_from_slice(root);
        material[32..].copy_from_slice(&measurement);
        let sealing_key = Box::new(blake3::derive_key(SEALING_CONTEXT, &material[..]));
        let attestation_key = Zeroizing::new(blake3::derive_key(ATTESTATION_CONTEXT, root));
        Self {
            measurement,
            sealing_key: SecretBox::new(sealing_key),
            attestation_key: SigningKey::from_bytes(&attestation_key),
            config: EnclaveConfig::default(),
        }
    }

    /// Measurement of a code image
    #[must_use]
    pub fn measure(image: &[u8]) -> [u8; 32] {
        *blake3::hash(image).as_bytes()
    }

    /// Set the identity fields reported in evidence
    #[must_use]
    pub fn with_config(mut self, config: EnclaveConfig) -> Self {
        self.config = config;
        self
    }

    /// Public key evidence is signed with
    #[must_use]
    pub fn attestation_public_key(&self) -> [u8; 32] {
        self.attestation_key.verifying_key().to_bytes()
    }
}

impl Platform for SoftwarePlatform {
    fn measurement(&self) -> [u8; 32] {
        self.measurement
    }

    fn seal(&self, secret: &[u8]) -> EnclaveResult<Vec<u8>> {
        seal::seal(self.sealing_key.expose_secret(), &self.measurement, secret)
    }

    fn unseal(&self, blob: &[u8]) -> EnclaveResult<Zeroizing<Vec<u8>>> {
        seal::unseal(self.sealing_key.expose_secret(), &self.measurement, blob)
    }

    fn attest(&self, report_data: [u8; 64]) -> EnclaveResult<Evidence> {
        let mut flags = FLAG_INITTED;
        if self.config.debug {
            flags |= FLAG_DEBUG;
        }
        let report = EnclaveReport {
            cpu_svn: [0; 16],
            misc_select: 0,
            attributes: ReportAttributes { flags, xfrm: 0 },
            mr_enclave: self.measurement,
            mr_signer: blake3::derive_key(SIGNER_CONTEXT, &self.attestation_public_key()),
            isv_prod_id: self.config.isv_prod_id,
            isv_svn: self.config.isv_svn,
            report_data,
        };
        let body = report.to_bytes().to_vec();
        let signature = self.attestation_key.sign(&body);
        Ok(Evidence {
            report: body,
            signature: signature.to_bytes().to_vec(),
            signer: self.attestation_public_key(),
        })
    }
}

impl std::fmt::Debug for SoftwarePlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwarePlatform")
            .field("measurement", &hex::encode(self.measurement))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
