//! Prefixed hex address codec.
//!
//! Human addresses are `<prefix><hex>` where the hex encodes a fixed number
//! of canonical bytes. Hex digits are accepted in either case and always
//! produced in lowercase, so canonicalization is the normalization step.

use crate::backend::AddressCodec;
use sealvm_core::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};

/// Address codec for `<prefix><hex>` addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexAddressCodec {
    prefix: String,
    canonical_len: usize,
}

impl HexAddressCodec {
    /// Create a codec
    #[must_use]
    pub fn new(prefix: impl Into<String>, canonical_len: usize) -> Self {
        Self {
            prefix: prefix.into(),
            canonical_len,
        }
    }

    /// Human readable prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Length of canonical addresses in bytes
    #[must_use]
    pub fn canonical_len(&self) -> usize {
        self.canonical_len
    }
}

impl Default for HexAddressCodec {
    fn default() -> Self {
        Self::new("seal", 20)
    }
}

impl AddressCodec for HexAddressCodec {
    fn canonicalize(&self, human: &str) -> BridgeResult<Vec<u8>> {
        let digits = human.strip_prefix(self.prefix.as_str()).ok_or_else(|| {
            BridgeError::bad_argument(format!("address must start with {:?}", self.prefix))
        })?;
        if digits.len() != self.canonical_len * 2 {
            return Err(BridgeError::bad_argument(format!(
                "address must have {} hex digits, got {}",
                self.canonical_len * 2,
                digits.len()
            )));
        }
        hex::decode(digits).map_err(|e| BridgeError::bad_argument(format!("invalid address: {}", e)))
    }

    fn humanize(&self, canonical: &[u8]) -> BridgeResult<String> {
        if canonical.len() != self.canonical_len {
            return Err(BridgeError::bad_argument(format!(
                "canonical address must be {} bytes, got {}",
                self.canonical_len,
                canonical.len()
            )));
        }
        Ok(format!("{}{}", self.prefix, hex::encode(canonical)))
    }
}
