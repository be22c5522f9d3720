//! Binary result envelope exchanged with guest code.
//!
//! Layout: one tag byte (`0` ok, `1` error) followed by the payload bytes
//! or the UTF-8 error message. Entry points return an envelope, and query
//! results are handed back to the guest in one, so domain errors travel as
//! data instead of aborting the call.

use crate::error::CoreError;

const TAG_OK: u8 = 0;
const TAG_ERR: u8 = 1;

/// Outcome reported by contract code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractResult {
    /// Success with payload
    Ok(Vec<u8>),
    /// Domain error with message
    Err(String),
}

impl ContractResult {
    /// Encode to envelope bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Ok(data) => {
                let mut out = Vec::with_capacity(data.len() + 1);
                out.push(TAG_OK);
                out.extend_from_slice(data);
                out
            }
            Self::Err(message) => {
                let mut out = Vec::with_capacity(message.len() + 1);
                out.push(TAG_ERR);
                out.extend_from_slice(message.as_bytes());
                out
            }
        }
    }

    /// Decode envelope bytes
    ///
    /// # Errors
    ///
    /// Returns error if the envelope is empty, has an unknown tag, or the
    /// error message is not UTF-8
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        let Some((&tag, rest)) = bytes.split_first() else {
            return Err(CoreError::InvalidEnvelope {
                reason: "empty envelope".to_string(),
            });
        };
        match tag {
            TAG_OK => Ok(Self::Ok(rest.to_vec())),
            TAG_ERR => {
                let message =
                    String::from_utf8(rest.to_vec()).map_err(|e| CoreError::InvalidEnvelope {
                        reason: format!("error message is not UTF-8: {}", e),
                    })?;
                Ok(Self::Err(message))
            }
            other => Err(CoreError::InvalidEnvelope {
                reason: format!("unknown tag {}", other),
            }),
        }
    }

    /// Convert into a standard result
    pub fn into_result(self) -> Result<Vec<u8>, String> {
        match self {
            Self::Ok(data) => Ok(data),
            Self::Err(message) => Err(message),
        }
    }
}

impl From<Result<Vec<u8>, String>> for ContractResult {
    fn from(value: Result<Vec<u8>, String>) -> Self {
        match value {
            Ok(data) => Self::Ok(data),
            Err(message) => Self::Err(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_layout() {
        assert_eq!(ContractResult::Ok(b"hi".to_vec()).encode(), b"\0hi");
        assert_eq!(ContractResult::Ok(Vec::new()).encode(), vec![0]);
    }

    #[test]
    fn test_err_layout() {
        let encoded = ContractResult::Err("nope".to_string()).encode();
        assert_eq!(encoded, b"\x01nope");
        assert_eq!(
            ContractResult::decode(&encoded).unwrap(),
            ContractResult::Err("nope".to_string())
        );
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(ContractResult::decode(b"").is_err());
        assert!(ContractResult::decode(b"\x07data").is_err());
        assert!(ContractResult::decode(b"\x01\xff\xfe").is_err());
    }

    #[test]
    fn test_into_result() {
        assert_eq!(
            ContractResult::decode(b"\0ok").unwrap().into_result(),
            Ok(b"ok".to_vec())
        );
        assert_eq!(
            ContractResult::from(Err::<Vec<u8>, _>("bad".to_string())).into_result(),
            Err("bad".to_string())
        );
    }
}
