//! Local enclave identity backed by files in the data directory.

use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use rand::RngCore;
use rand::rngs::OsRng;
use sealvm_enclave::{
    Enclave, EnclaveConfig, Evidence, LocalProvisioning, ProvisioningCredentials, SoftwarePlatform,
};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

const PLATFORM_KEY: &str = "platform.key";
const REGISTRATION_KEY: &str = "registration.sealed";
const ATTESTATION: &str = "attestation.bin";
const SEED: &str = "seed.sealed";
const MASTER_KEY: &str = "master_key.hex";

/// Local enclave backed by files
pub type LocalEnclave = Enclave<SoftwarePlatform, LocalProvisioning>;

/// Outcome of [`EnclaveDir::attest`]
#[derive(Debug, Clone)]
pub struct Attestation {
    /// Registration public key
    pub registration_key: [u8; 32],
    /// Network master key
    pub master_key: [u8; 32],
    /// Whether this run registered the bootstrap node
    pub bootstrapped: bool,
    /// Verified attestation evidence
    pub evidence: Evidence,
}

/// Files of the local enclave
#[derive(Debug, Clone)]
pub struct EnclaveDir {
    dir: PathBuf,
}

impl EnclaveDir {
    /// Open `<data_dir>/enclave`, creating it if needed
    pub fn open(data_dir: &Path) -> Result<Self> {
        let dir = data_dir.join("enclave");
        std::fs::create_dir_all(&dir)
            .wrap_err_with(|| format!("Failed to create {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Path of the sealed registration key
    #[must_use]
    pub fn registration_key(&self) -> PathBuf {
        self.dir.join(REGISTRATION_KEY)
    }

    /// Path of the encrypted network seed
    #[must_use]
    pub fn seed(&self) -> PathBuf {
        self.dir.join(SEED)
    }

    /// Path of the hex network master key
    #[must_use]
    pub fn master_key(&self) -> PathBuf {
        self.dir.join(MASTER_KEY)
    }

    /// Path of the last accepted attestation
    #[must_use]
    pub fn attestation(&self) -> PathBuf {
        self.dir.join(ATTESTATION)
    }

    /// Root secret of the software platform, generated on first use
    pub fn platform_secret(&self) -> Result<Zeroizing<[u8; 32]>> {
        let path = self.dir.join(PLATFORM_KEY);
        let mut root = Zeroizing::new([0u8; 32]);
        if path.exists() {
            let bytes = Zeroizing::new(std::fs::read(&path)?);
            if bytes.len() != root.len() {
                return Err(eyre!("Corrupted platform key {}", path.display()));
            }
            root.copy_from_slice(&bytes[..]);
        } else {
            OsRng.fill_bytes(&mut root[..]);
            std::fs::write(&path, &root[..])
                .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Generated platform key");
        }
        Ok(root)
    }

    /// Platform measuring the running binary
    pub fn platform(&self, config: &EnclaveConfig) -> Result<SoftwarePlatform> {
        let exe = std::env::current_exe()?;
        let image = std::fs::read(&exe)
            .wrap_err_with(|| format!("Failed to read {}", exe.display()))?;
        let root = self.platform_secret()?;
        Ok(SoftwarePlatform::from_secret(&root, SoftwarePlatform::measure(&image))
            .with_config(config.clone()))
    }

    /// Enclave accepting attestations signed off with `api_key`
    pub fn enclave(
        &self,
        config: &EnclaveConfig,
        api_key: &str,
    ) -> Result<LocalEnclave> {
        Ok(Enclave::new(self.platform(config)?, LocalProvisioning::new(api_key)))
    }

    /// Reload the persisted registration key into `enclave`, if there is one
    pub fn restore(&self, enclave: &LocalEnclave) -> Result<Option<[u8; 32]>> {
        let path = self.registration_key();
        if !path.exists() {
            return Ok(None);
        }
        let sealed = std::fs::read(&path)?;
        let public_key = enclave
            .restore_key(&sealed)
            .wrap_err_with(|| format!("Failed to restore {}", path.display()))?;
        Ok(Some(public_key))
    }

    /// Register `enclave` and produce attestation evidence
    ///
    /// The registration key and network seed are reused when persisted;
    /// the node bootstraps only when no seed exists yet. Outside a dry run
    /// the seed is loaded with `init_node` and the evidence submitted.
    pub fn attest(
        &self,
        enclave: &LocalEnclave,
        credentials: &ProvisioningCredentials,
        dry_run: bool,
    ) -> Result<Attestation> {
        let registration_key = match self.restore(enclave)? {
            Some(public_key) => public_key,
            None => {
                let pair = enclave.key_gen()?;
                write(&self.registration_key(), &pair.sealed_private_key)?;
                pair.public_key
            }
        };

        let (encrypted_seed, master_key, bootstrapped) = match self.load_seed()? {
            Some((encrypted_seed, master_key)) => (encrypted_seed, master_key, false),
            None => {
                let output = enclave.init_bootstrap(credentials)?;
                write(&self.seed(), &output.encrypted_seed)?;
                write(&self.master_key(), hex::encode(output.master_key).as_bytes())?;
                (output.encrypted_seed, output.master_key, true)
            }
        };
        if !dry_run {
            enclave
                .init_node(&master_key, &encrypted_seed, credentials)
                .wrap_err_with(|| format!("Failed to load {}", self.seed().display()))?;
        }

        let evidence = enclave.create_attestation_report(credentials, dry_run)?;
        write(&self.attestation(), &evidence.to_bytes()?)?;
        Ok(Attestation {
            registration_key,
            master_key,
            bootstrapped,
            evidence,
        })
    }

    /// Persisted seed blob and master key, if the node has registered
    fn load_seed(&self) -> Result<Option<(Vec<u8>, [u8; 32])>> {
        let seed_path = self.seed();
        if !seed_path.exists() {
            return Ok(None);
        }
        let encrypted_seed = std::fs::read(&seed_path)
            .wrap_err_with(|| format!("Failed to read {}", seed_path.display()))?;

        let key_path = self.master_key();
        let text = std::fs::read_to_string(&key_path)
            .wrap_err_with(|| format!("Failed to read {}", key_path.display()))?;
        let mut master_key = [0u8; 32];
        hex::decode_to_slice(text.trim(), &mut master_key)
            .map_err(|e| eyre!("Corrupted master key {}: {}", key_path.display(), e))?;
        Ok(Some((encrypted_seed, master_key)))
    }
}

fn write(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents).wrap_err_with(|| format!("Failed to write {}", path.display()))
}
