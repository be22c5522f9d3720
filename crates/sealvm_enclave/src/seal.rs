//! Authenticated sealing with ChaCha20-Poly1305.
//!
//! Blob layout: version byte, 12-byte random nonce, ciphertext with tag.
//! The associated data binds a blob to the context it was sealed in.
//!
//! Shared blobs carry a secret to another node: share tag, 32-byte
//! ephemeral ed25519 public key, then a sealed blob keyed by the
//! Diffie-Hellman secret of the ephemeral key and the recipient's key on
//! the Montgomery form of the curve.

use crate::error::{EnclaveError, EnclaveResult};
use ed25519_dalek::{SigningKey, VerifyingKey};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

const SEAL_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
pub(crate) const SHARE_VERSION: u8 = 2;
const SHARE_KEY_CONTEXT: &str = "sealvm 2024-01-01 seed share key";

pub(crate) fn seal(key: &[u8; 32], aad: &[u8], secret: &[u8]) -> EnclaveResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: secret, aad })
        .map_err(|e| EnclaveError::Seal(e.to_string()))?;

    let mut blob = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    blob.push(SEAL_VERSION);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

pub(crate) fn unseal(key: &[u8; 32], aad: &[u8], blob: &[u8]) -> EnclaveResult<Zeroizing<Vec<u8>>> {
    if blob.len() < 1 + NONCE_LEN + TAG_LEN {
        return Err(EnclaveError::Unseal("sealed blob too short".to_string()));
    }
    if blob[0] != SEAL_VERSION {
        return Err(EnclaveError::Unseal(format!(
            "unsupported seal version {}",
            blob[0]
        )));
    }
    let (nonce, ciphertext) = blob[1..].split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map(Zeroizing::new)
        .map_err(|_| EnclaveError::Unseal("authentication failed".to_string()))
}

/// Encrypt `secret` so only the holder of `recipient`'s private key can
/// read it
pub(crate) fn share(recipient: &VerifyingKey, aad: &[u8], secret: &[u8]) -> EnclaveResult<Vec<u8>> {
    let mut ephemeral_secret = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(&mut ephemeral_secret[..]);
    let ephemeral = SigningKey::from_bytes(&ephemeral_secret);
    let ephemeral_public = ephemeral.verifying_key().to_bytes();

    let shared = Zeroizing::new((recipient.to_montgomery() * ephemeral.to_scalar()).to_bytes());
    let key = share_key(&shared, &ephemeral_public, &recipient.to_bytes());
    let sealed = seal(&key, aad, secret)?;

    let mut blob = Vec::with_capacity(1 + 32 + sealed.len());
    blob.push(SHARE_VERSION);
    blob.extend_from_slice(&ephemeral_public);
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

/// Open a blob made by [`share`] for `recipient`
pub(crate) fn open_share(
    recipient: &SigningKey,
    aad: &[u8],
    blob: &[u8],
) -> EnclaveResult<Zeroizing<Vec<u8>>> {
    if blob.len() < 1 + 32 || blob[0] != SHARE_VERSION {
        return Err(EnclaveError::Unseal("not a shared blob".to_string()));
    }
    let (ephemeral_public, sealed) = blob[1..].split_at(32);
    let ephemeral_public = <[u8; 32]>::try_from(ephemeral_public)
        .map_err(|_| EnclaveError::Unseal("not a shared blob".to_string()))?;
    let ephemeral = VerifyingKey::from_bytes(&ephemeral_public)
        .map_err(|_| EnclaveError::Unseal("invalid ephemeral key".to_string()))?;

    let shared = Zeroizing::new((ephemeral.to_montgomery() * recipient.to_scalar()).to_bytes());
    let key = share_key(&shared, &ephemeral_public, &recipient.verifying_key().to_bytes());
    unseal(&key, aad, sealed)
}

fn share_key(shared: &[u8; 32], ephemeral: &[u8; 32], recipient: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let mut material = Zeroizing::new([0u8; 96]);
    material[..32].copy_from_slice(shared);
    material[32..64].copy_from_slice(ephemeral);
    material[64..].copy_from_slice(recipient);
    Zeroizing::new(blake3::derive_key(SHARE_KEY_CONTEXT, &material[..]))
}
