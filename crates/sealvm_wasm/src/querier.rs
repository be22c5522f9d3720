//! Table-driven query router.

use crate::backend::QueryRouter;
use sealvm_core::{BridgeError, BridgeResult};
use std::collections::HashMap;

/// Query router answering from a fixed table
///
/// Every routed query reports the same gas cost. Unknown requests are a
/// user error so the querying contract can handle them.
#[derive(Debug, Clone, Default)]
pub struct MockQuerier {
    responses: HashMap<Vec<u8>, BridgeResult<Vec<u8>>>,
    gas_per_query: u64,
}

impl MockQuerier {
    /// Create an empty table
    #[must_use]
    pub fn new(gas_per_query: u64) -> Self {
        Self {
            responses: HashMap::new(),
            gas_per_query,
        }
    }

    /// Answer `request` with `response`
    #[must_use]
    pub fn with_response(mut self, request: &[u8], response: &[u8]) -> Self {
        self.responses.insert(request.to_vec(), Ok(response.to_vec()));
        self
    }

    /// Answer `request` with an error
    #[must_use]
    pub fn with_error(mut self, request: &[u8], error: BridgeError) -> Self {
        self.responses.insert(request.to_vec(), Err(error));
        self
    }
}

impl QueryRouter for MockQuerier {
    fn route(&self, request: &[u8], _gas_limit: u64) -> (BridgeResult<Vec<u8>>, u64) {
        let result = self.responses.get(request).cloned().unwrap_or_else(|| {
            Err(BridgeError::user(format!(
                "unknown query {}",
                String::from_utf8_lossy(request)
            )))
        });
        (result, self.gas_per_query)
    }
}
