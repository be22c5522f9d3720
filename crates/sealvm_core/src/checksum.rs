//! Content checksums identifying contract bytecode.
//!
//! A checksum is the SHA-256 digest of the raw bytecode. Identical bytes
//! always produce the identical checksum, so checksums double as cache keys
//! and on-disk file names.

use crate::error::CoreError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A SHA-256 checksum (256 bits / 32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// The number of bytes in a checksum
    pub const LEN: usize = 32;

    /// Compute the checksum of bytecode
    #[must_use]
    pub fn generate(code: &[u8]) -> Self {
        Self(Sha256::digest(code).into())
    }

    /// Create from bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get as bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lowercase hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    ///
    /// # Errors
    ///
    /// Returns error if hex is invalid or not 32 bytes
    pub fn from_hex(input: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(input).map_err(|e| CoreError::InvalidChecksum {
            reason: e.to_string(),
        })?;
        Self::try_from(bytes.as_slice())
    }

    /// Check that `code` hashes to this checksum
    ///
    /// # Errors
    ///
    /// Returns error carrying both checksums on mismatch
    pub fn verify(&self, code: &[u8]) -> Result<(), CoreError> {
        let actual = Self::generate(code);
        if actual != *self {
            return Err(CoreError::ChecksumMismatch {
                expected: self.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Checksum {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for Checksum {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Checksum {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Checksum {
    type Error = CoreError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CoreError::InvalidChecksum {
            reason: format!("expected {} bytes, got {}", Self::LEN, bytes.len()),
        })?;
        Ok(Self(arr))
    }
}

// Hex on the wire so checksums stay readable in JSON configs and reports.
impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
