//! Chain environment handed to every entry point.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Block the call executes in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block height
    pub height: u64,
    /// Block time in nanoseconds since the Unix epoch
    pub time_nanos: u64,
    /// Chain identifier
    pub chain_id: String,
}

/// The contract being called
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    /// Human readable contract address
    pub address: String,
}

/// Sender of a state-changing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    /// Human readable sender address
    pub sender: String,
}

/// Environment of one contract call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Env {
    /// Current block
    pub block: BlockInfo,
    /// Called contract
    pub contract: ContractInfo,
    /// Message sender, absent for queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageInfo>,
}

impl Env {
    /// Create an environment without sender information
    #[must_use]
    pub fn new(block: BlockInfo, contract_address: impl Into<String>) -> Self {
        Self {
            block,
            contract: ContractInfo {
                address: contract_address.into(),
            },
            message: None,
        }
    }

    /// Attach the sender of the message
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.message = Some(MessageInfo {
            sender: sender.into(),
        });
        self
    }

    /// Serialize to the JSON bytes handed to the guest
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse from JSON bytes
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a valid environment
    pub fn from_json(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> BlockInfo {
        BlockInfo {
            height: 12_345,
            time_nanos: 1_571_797_419_879_305_533,
            chain_id: "sealvm-testnet".to_string(),
        }
    }

    #[test]
    fn test_env_json_shape() {
        let env = Env::new(block(), "contract1");
        let json: serde_json::Value = serde_json::from_slice(&env.to_json().unwrap()).unwrap();
        assert_eq!(json["block"]["height"], 12_345);
        assert_eq!(json["contract"]["address"], "contract1");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_env_with_sender() {
        let env = Env::new(block(), "contract1").with_sender("alice");
        let parsed = Env::from_json(&env.to_json().unwrap()).unwrap();
        assert_eq!(parsed.message.unwrap().sender, "alice");
    }

    #[test]
    fn test_env_rejects_garbage() {
        assert!(Env::from_json(b"{").is_err());
    }
}
