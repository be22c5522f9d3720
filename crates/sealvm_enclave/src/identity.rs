//! Enclave identity lifecycle.
//!
//! ```text
//! uninitialized --key_gen / restore_key / init_bootstrap--> bootstrapped
//! bootstrapped  --init_node-->                            node_initialized
//! node_initialized --create_attestation_report-->         ready
//! ```
//!
//! A node-initialized enclave hands the seed to a joining node with
//! [`Enclave::get_encrypted_seed`]; the joining node passes that blob to
//! [`Enclave::init_node`] in place of a blob sealed to itself.
//!
//! Every operation computes its full result before touching the state, so
//! a failure leaves the enclave exactly where it was.

use crate::error::{EnclaveError, EnclaveResult};
use crate::platform::Platform;
use crate::provisioning::{ProvisioningCredentials, ProvisioningService};
use crate::report::Evidence;
use crate::seal;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use zeroize::Zeroizing;

const MASTER_KEY_CONTEXT: &str = "sealvm 2024-01-01 consensus master key";
const SEED_LEN: usize = 32;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnclaveState {
    /// No identity yet
    Uninitialized,
    /// Registration key present
    Bootstrapped,
    /// Seed unsealed and checked
    NodeInitialized,
    /// Attestation accepted by the provisioning service
    Ready,
}

impl fmt::Display for EnclaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Bootstrapped => "bootstrapped",
            Self::NodeInitialized => "node_initialized",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Registration key pair as handed to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// Ed25519 public key
    pub public_key: [u8; 32],
    /// Private key sealed to this enclave, for the host to persist
    pub sealed_private_key: Vec<u8>,
}

/// Result of a bootstrap registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutput {
    /// Seed sealed to this enclave
    pub encrypted_seed: Vec<u8>,
    /// Public master key derived from the seed
    pub master_key: [u8; 32],
}

/// Liveness payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Lifecycle state
    pub state: EnclaveState,
    /// Hex measurement of the enclave code
    pub measurement: String,
    /// Whether a registration key is loaded
    pub registration_key: bool,
    /// Attestations accepted so far
    pub attestations: u64,
}

impl HealthStatus {
    /// Render as JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> EnclaveResult<String> {
        serde_json::to_string(self).map_err(|e| EnclaveError::Internal(e.to_string()))
    }
}

struct Inner {
    state: EnclaveState,
    registration_key: Option<SigningKey>,
    seed: Option<Zeroizing<Vec<u8>>>,
    seed_issued: bool,
    attestations: u64,
}

/// Enclave identity and attestation
pub struct Enclave<P, V> {
    platform: P,
    provisioning: V,
    inner: Mutex<Inner>,
}

impl<P: Platform, V: ProvisioningService> Enclave<P, V> {
    /// Create an uninitialized enclave
    #[must_use]
    pub fn new(platform: P, provisioning: V) -> Self {
        Self {
            platform,
            provisioning,
            inner: Mutex::new(Inner {
                state: EnclaveState::Uninitialized,
                registration_key: None,
                seed: None,
                seed_issued: false,
                attestations: 0,
            }),
        }
    }

    /// Platform the enclave runs on
    #[must_use]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Current lifecycle state
    ///
    /// # Errors
    ///
    /// Returns error if the state lock is poisoned
    pub fn state(&self) -> EnclaveResult<EnclaveState> {
        Ok(self.lock()?.state)
    }

    /// Generate a fresh registration key pair
    ///
    /// # Errors
    ///
    /// Returns error if the node is already initialized or sealing fails
    pub fn key_gen(&self) -> EnclaveResult<KeyPair> {
        let mut inner = self.lock()?;
        require(&inner, "key_gen", &[EnclaveState::Uninitialized, EnclaveState::Bootstrapped])?;

        let mut secret = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut secret[..]);
        let key = SigningKey::from_bytes(&secret);
        let pair = KeyPair {
            public_key: key.verifying_key().to_bytes(),
            sealed_private_key: self.platform.seal(&secret[..])?,
        };

        inner.registration_key = Some(key);
        inner.state = EnclaveState::Bootstrapped;
        tracing::info!(public_key = %hex::encode(pair.public_key), "Generated registration key");
        Ok(pair)
    }

    /// Reload a registration key sealed by [`Enclave::key_gen`]
    ///
    /// # Errors
    ///
    /// Returns error if the node is already initialized or the blob does
    /// not unseal to a key
    pub fn restore_key(&self, sealed_private_key: &[u8]) -> EnclaveResult<[u8; 32]> {
        let mut inner = self.lock()?;
        require(
            &inner,
            "restore_key",
            &[EnclaveState::Uninitialized, EnclaveState::Bootstrapped],
        )?;

        let secret = self.platform.unseal(sealed_private_key)?;
        let bytes = <&[u8; 32]>::try_from(&secret[..]).map_err(|_| {
            EnclaveError::IntegrityMismatch("sealed key has the wrong length".to_string())
        })?;
        let key = SigningKey::from_bytes(bytes);
        let public_key = key.verifying_key().to_bytes();

        inner.registration_key = Some(key);
        inner.state = EnclaveState::Bootstrapped;
        tracing::info!(public_key = %hex::encode(public_key), "Restored registration key");
        Ok(public_key)
    }

    /// Register as the bootstrap node and create the network seed
    ///
    /// Can succeed once per enclave identity.
    ///
    /// # Errors
    ///
    /// Returns error if a seed was already issued, the node is initialized,
    /// or the provisioning service refuses the registration
    pub fn init_bootstrap(&self, credentials: &ProvisioningCredentials) -> EnclaveResult<BootstrapOutput> {
        let mut inner = self.lock()?;
        require(
            &inner,
            "init_bootstrap",
            &[EnclaveState::Uninitialized, EnclaveState::Bootstrapped],
        )?;
        if inner.seed_issued {
            return Err(EnclaveError::InvalidState {
                operation: "init_bootstrap",
                state: format!("{} with a seed already issued", inner.state),
            });
        }

        let registration_key = match &inner.registration_key {
            Some(key) => key.clone(),
            None => {
                let mut secret = Zeroizing::new([0u8; 32]);
                OsRng.fill_bytes(&mut secret[..]);
                SigningKey::from_bytes(&secret)
            }
        };
        let mut seed = Zeroizing::new(vec![0u8; SEED_LEN]);
        OsRng.fill_bytes(&mut seed[..]);
        let master_key = master_key_of(&seed);
        let encrypted_seed = self.platform.seal(&seed)?;

        let evidence = self.evidence(&registration_key, &master_key)?;
        self.provisioning.submit(credentials, &evidence)?;

        inner.registration_key = Some(registration_key);
        inner.seed_issued = true;
        inner.state = EnclaveState::Bootstrapped;
        tracing::info!(
            spid = %credentials.spid(),
            master_key = %hex::encode(master_key),
            "Bootstrap registration complete"
        );
        Ok(BootstrapOutput {
            encrypted_seed,
            master_key,
        })
    }

    /// Unseal the network seed and check it against `master_key`
    ///
    /// `encrypted_seed` is either the blob [`Enclave::init_bootstrap`]
    /// sealed to this enclave or one [`Enclave::get_encrypted_seed`] issued
    /// to this node's registration key.
    ///
    /// # Errors
    ///
    /// Returns error if the enclave is not bootstrapped, the seed does not
    /// unseal or does not match `master_key`, or the provisioning service
    /// refuses the node
    pub fn init_node(
        &self,
        master_key: &[u8],
        encrypted_seed: &[u8],
        credentials: &ProvisioningCredentials,
    ) -> EnclaveResult<()> {
        let mut inner = self.lock()?;
        require(&inner, "init_node", &[EnclaveState::Bootstrapped])?;
        let registration_key =
            inner
                .registration_key
                .clone()
                .ok_or_else(|| EnclaveError::InvalidState {
                    operation: "init_node",
                    state: "bootstrapped without a registration key".to_string(),
                })?;

        let seed = if encrypted_seed.first() == Some(&seal::SHARE_VERSION) {
            seal::open_share(&registration_key, &self.platform.measurement(), encrypted_seed)?
        } else {
            self.platform.unseal(encrypted_seed)?
        };
        if seed.len() != SEED_LEN {
            return Err(EnclaveError::IntegrityMismatch("seed has the wrong length".to_string()));
        }
        let derived = master_key_of(&seed);
        if derived.as_slice() != master_key {
            tracing::warn!("Master key does not match the sealed seed");
            return Err(EnclaveError::IntegrityMismatch(
                "master key does not match the sealed seed".to_string(),
            ));
        }

        let evidence = self.evidence(&registration_key, &derived)?;
        self.provisioning.submit(credentials, &evidence)?;

        inner.seed = Some(seed);
        inner.state = EnclaveState::NodeInitialized;
        tracing::info!(spid = %credentials.spid(), "Node initialized");
        Ok(())
    }

    /// Encrypt the network seed to a joining node
    ///
    /// `evidence` must verify, come from the same enclave code, and binds
    /// the joining node's registration key; only that key opens the blob.
    ///
    /// # Errors
    ///
    /// Returns error if this enclave holds no checked seed or the evidence
    /// does not verify
    pub fn get_encrypted_seed(&self, evidence: &Evidence) -> EnclaveResult<Vec<u8>> {
        let inner = self.lock()?;
        require(
            &inner,
            "get_encrypted_seed",
            &[EnclaveState::NodeInitialized, EnclaveState::Ready],
        )?;
        let seed = inner.seed.as_ref().ok_or_else(|| EnclaveError::InvalidState {
            operation: "get_encrypted_seed",
            state: format!("{} without a seed", inner.state),
        })?;

        let report = evidence.verify()?;
        let measurement = self.platform.measurement();
        if report.mr_enclave != measurement {
            tracing::warn!(mr_enclave = %hex::encode(report.mr_enclave), "Refused seed request");
            return Err(EnclaveError::InvalidEvidence(
                "report comes from different enclave code".to_string(),
            ));
        }
        let recipient = VerifyingKey::from_bytes(&report.owner_key())
            .map_err(|_| EnclaveError::InvalidEvidence("invalid registration key".to_string()))?;

        let blob = seal::share(&recipient, &measurement, seed)?;
        tracing::info!(recipient = %hex::encode(recipient.to_bytes()), "Issued encrypted seed");
        Ok(blob)
    }

    /// Produce attestation evidence for this node
    ///
    /// The evidence is verified before it is returned. With `dry_run` it is
    /// not submitted and the state does not change; otherwise it is
    /// submitted and a node-initialized enclave becomes ready.
    ///
    /// # Errors
    ///
    /// Returns error if the enclave has no registration key (or, outside a
    /// dry run, is not node-initialized), the self-check fails, or the
    /// provisioning service refuses the evidence
    pub fn create_attestation_report(
        &self,
        credentials: &ProvisioningCredentials,
        dry_run: bool,
    ) -> EnclaveResult<Evidence> {
        let mut inner = self.lock()?;
        let allowed: &[EnclaveState] = if dry_run {
            &[
                EnclaveState::Bootstrapped,
                EnclaveState::NodeInitialized,
                EnclaveState::Ready,
            ]
        } else {
            &[EnclaveState::NodeInitialized, EnclaveState::Ready]
        };
        require(&inner, "create_attestation_report", allowed)?;
        let registration_key =
            inner
                .registration_key
                .clone()
                .ok_or_else(|| EnclaveError::InvalidState {
                    operation: "create_attestation_report",
                    state: format!("{} without a registration key", inner.state),
                })?;
        let master = inner.seed.as_ref().map_or([0u8; 32], |seed| master_key_of(seed));

        let evidence = self.evidence(&registration_key, &master)?;
        if dry_run {
            tracing::debug!("Attestation self-test passed");
            return Ok(evidence);
        }

        self.provisioning.submit(credentials, &evidence)?;
        inner.attestations += 1;
        inner.state = EnclaveState::Ready;
        tracing::info!(attestations = inner.attestations, "Attestation accepted");
        Ok(evidence)
    }

    /// Report liveness without touching secrets
    ///
    /// # Errors
    ///
    /// Returns error if the state lock is poisoned
    pub fn get_health_check(&self) -> EnclaveResult<HealthStatus> {
        let inner = self.lock()?;
        Ok(HealthStatus {
            state: inner.state,
            measurement: hex::encode(self.platform.measurement()),
            registration_key: inner.registration_key.is_some(),
            attestations: inner.attestations,
        })
    }

    /// Signed evidence binding the registration key and master key to the
    /// measurement, checked before use
    fn evidence(&self, registration_key: &SigningKey, master_key: &[u8; 32]) -> EnclaveResult<Evidence> {
        let public_key = registration_key.verifying_key().to_bytes();
        let mut report_data = [0u8; 64];
        report_data[..32].copy_from_slice(&public_key);
        report_data[32..].copy_from_slice(master_key);

        let evidence = self.platform.attest(report_data)?;
        let report = evidence.verify()?;
        if report.mr_enclave != self.platform.measurement() || report.owner_key() != public_key {
            return Err(EnclaveError::InvalidEvidence(
                "report does not match this enclave".to_string(),
            ));
        }
        Ok(evidence)
    }

    fn lock(&self) -> EnclaveResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| EnclaveError::Internal("enclave state lock poisoned".to_string()))
    }
}

fn require(inner: &Inner, operation: &'static str, allowed: &[EnclaveState]) -> EnclaveResult<()> {
    if allowed.contains(&inner.state) {
        Ok(())
    } else {
        Err(EnclaveError::InvalidState {
            operation,
            state: inner.state.to_string(),
        })
    }
}

fn master_key_of(seed: &[u8]) -> [u8; 32] {
    let secret = Zeroizing::new(blake3::derive_key(MASTER_KEY_CONTEXT, seed));
    SigningKey::from_bytes(&secret).verifying_key().to_bytes()
}

impl<P: fmt::Debug, V> fmt::Debug for Enclave<P, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enclave")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SoftwarePlatform;
    use crate::provisioning::LocalProvisioning;
    use sealvm_core::Status;

    const ROOT: [u8; 32] = [3u8; 32];

    fn platform() -> SoftwarePlatform {
        SoftwarePlatform::from_secret(&ROOT, SoftwarePlatform::measure(b"sealvm enclave"))
    }

    fn enclave() -> Enclave<SoftwarePlatform, LocalProvisioning> {
        Enclave::new(platform(), LocalProvisioning::new("api-key"))
    }

    fn creds() -> ProvisioningCredentials {
        ProvisioningCredentials::new("0123abcd", "api-key").unwrap()
    }

    #[test]
    fn test_key_gen_and_restore() {
        let enclave = enclave();
        let pair = enclave.key_gen().unwrap();
        assert_eq!(enclave.state().unwrap(), EnclaveState::Bootstrapped);

        let restarted = Enclave::new(platform(), LocalProvisioning::new("api-key"));
        assert_eq!(restarted.restore_key(&pair.sealed_private_key).unwrap(), pair.public_key);
        assert_eq!(restarted.state().unwrap(), EnclaveState::Bootstrapped);

        let elsewhere = Enclave::new(
            SoftwarePlatform::from_secret(&[4u8; 32], SoftwarePlatform::measure(b"sealvm enclave")),
            LocalProvisioning::new("api-key"),
        );
        assert!(matches!(
            elsewhere.restore_key(&pair.sealed_private_key),
            Err(EnclaveError::Unseal(_))
        ));
        assert_eq!(elsewhere.state().unwrap(), EnclaveState::Uninitialized);
    }

    #[test]
    fn test_full_lifecycle() {
        let enclave = enclave();
        let output = enclave.init_bootstrap(&creds()).unwrap();
        assert_eq!(enclave.state().unwrap(), EnclaveState::Bootstrapped);

        enclave
            .init_node(&output.master_key, &output.encrypted_seed, &creds())
            .unwrap();
        assert_eq!(enclave.state().unwrap(), EnclaveState::NodeInitialized);

        let dry = enclave.create_attestation_report(&creds(), true).unwrap();
        assert_eq!(enclave.state().unwrap(), EnclaveState::NodeInitialized);
        let report = dry.verify().unwrap();
        assert_eq!(&report.report_data[32..], &output.master_key[..]);

        enclave.create_attestation_report(&creds(), false).unwrap();
        assert_eq!(enclave.state().unwrap(), EnclaveState::Ready);

        let health = enclave.get_health_check().unwrap();
        assert_eq!(health.state, EnclaveState::Ready);
        assert_eq!(health.attestations, 1);
        assert!(health.registration_key);
    }

    #[test]
    fn test_bootstrap_once() {
        let enclave = enclave();
        enclave.init_bootstrap(&creds()).unwrap();
        let err = enclave.init_bootstrap(&creds()).unwrap_err();
        assert_eq!(err.status(), Status::BadArgument);
    }

    #[test]
    fn test_bootstrap_with_bad_credentials_changes_nothing() {
        let enclave = enclave();
        let wrong = ProvisioningCredentials::new("0123abcd", "wrong").unwrap();
        assert!(matches!(
            enclave.init_bootstrap(&wrong),
            Err(EnclaveError::ProvisioningRejected(_))
        ));
        assert_eq!(enclave.state().unwrap(), EnclaveState::Uninitialized);
        assert!(enclave.init_bootstrap(&creds()).is_ok());
    }

    #[test]
    fn test_init_node_mismatch_fails_closed() {
        let enclave = enclave();
        let output = enclave.init_bootstrap(&creds()).unwrap();

        let other = Enclave::new(platform(), LocalProvisioning::new("api-key"))
            .init_bootstrap(&creds())
            .unwrap();
        let err = enclave
            .init_node(&output.master_key, &other.encrypted_seed, &creds())
            .unwrap_err();
        assert!(matches!(err, EnclaveError::IntegrityMismatch(_)));
        assert_eq!(enclave.state().unwrap(), EnclaveState::Bootstrapped);

        assert!(enclave.init_node(&[0u8; 32], &output.encrypted_seed, &creds()).is_err());
        assert!(enclave.init_node(&output.master_key, b"garbage", &creds()).is_err());
        assert_eq!(enclave.state().unwrap(), EnclaveState::Bootstrapped);

        enclave
            .init_node(&output.master_key, &output.encrypted_seed, &creds())
            .unwrap();
        assert_eq!(enclave.state().unwrap(), EnclaveState::NodeInitialized);
    }

    #[test]
    fn test_seed_handed_to_joining_node() {
        let bootstrap = enclave();
        let output = bootstrap.init_bootstrap(&creds()).unwrap();
        bootstrap
            .init_node(&output.master_key, &output.encrypted_seed, &creds())
            .unwrap();

        let joining = Enclave::new(
            SoftwarePlatform::from_secret(&[4u8; 32], SoftwarePlatform::measure(b"sealvm enclave")),
            LocalProvisioning::new("api-key"),
        );
        joining.key_gen().unwrap();
        let request = joining.create_attestation_report(&creds(), true).unwrap();
        let issued = bootstrap.get_encrypted_seed(&request).unwrap();

        let mut tampered = issued.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 1;
        assert!(matches!(
            joining.init_node(&output.master_key, &tampered, &creds()),
            Err(EnclaveError::Unseal(_))
        ));
        assert_eq!(joining.state().unwrap(), EnclaveState::Bootstrapped);

        joining
            .init_node(&output.master_key, &issued, &creds())
            .unwrap();
        assert_eq!(joining.state().unwrap(), EnclaveState::NodeInitialized);
        let evidence = joining.create_attestation_report(&creds(), true).unwrap();
        assert_eq!(&evidence.verify().unwrap().report_data[32..], &output.master_key[..]);
    }

    #[test]
    fn test_seed_only_issued_to_verified_evidence() {
        let bootstrap = enclave();
        let output = bootstrap.init_bootstrap(&creds()).unwrap();

        let joining = enclave();
        joining.key_gen().unwrap();
        let request = joining.create_attestation_report(&creds(), true).unwrap();
        assert!(matches!(
            bootstrap.get_encrypted_seed(&request),
            Err(EnclaveError::InvalidState { .. })
        ));

        bootstrap
            .init_node(&output.master_key, &output.encrypted_seed, &creds())
            .unwrap();
        let mut forged = request.clone();
        forged.signature[0] ^= 1;
        assert!(matches!(
            bootstrap.get_encrypted_seed(&forged),
            Err(EnclaveError::InvalidEvidence(_))
        ));

        let foreign = Enclave::new(
            SoftwarePlatform::from_secret(&ROOT, SoftwarePlatform::measure(b"other code")),
            LocalProvisioning::new("api-key"),
        );
        foreign.key_gen().unwrap();
        let foreign_request = foreign.create_attestation_report(&creds(), true).unwrap();
        assert!(matches!(
            bootstrap.get_encrypted_seed(&foreign_request),
            Err(EnclaveError::InvalidEvidence(_))
        ));

        let issued = bootstrap.get_encrypted_seed(&request).unwrap();
        let bystander = enclave();
        bystander.key_gen().unwrap();
        assert!(bystander.init_node(&output.master_key, &issued, &creds()).is_err());
        assert_eq!(bystander.state().unwrap(), EnclaveState::Bootstrapped);
    }

    #[test]
    fn test_wrong_state() {
        let enclave = enclave();
        assert!(matches!(
            enclave.init_node(&[0u8; 32], b"seed", &creds()),
            Err(EnclaveError::InvalidState { .. })
        ));
        assert!(enclave.create_attestation_report(&creds(), true).is_err());
        assert!(enclave.create_attestation_report(&creds(), false).is_err());

        enclave.key_gen().unwrap();
        assert!(enclave.create_attestation_report(&creds(), true).is_ok());
        assert!(enclave.create_attestation_report(&creds(), false).is_err());
    }

    #[test]
    fn test_health_check_json() {
        let enclave = enclave();
        let json = enclave.get_health_check().unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["state"], "uninitialized");
        assert_eq!(value["registration_key"], false);
        assert_eq!(
            value["measurement"],
            hex::encode(SoftwarePlatform::measure(b"sealvm enclave"))
        );
    }
}
