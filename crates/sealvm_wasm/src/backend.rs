//! Host services a contract call is run against.
//!
//! Storage is covered by [`sealvm_storage::StoreBackend`]; this module adds
//! the address and query services and the gas-metered wrappers the engine
//! calls them through.

use sealvm_core::{BridgeError, BridgeResult, ContractResult, GasCosts, GasMeter};

/// Translates between human readable and canonical addresses
pub trait AddressCodec {
    /// Canonical bytes of a human readable address
    ///
    /// # Errors
    ///
    /// Returns bad-argument for a malformed address
    fn canonicalize(&self, human: &str) -> BridgeResult<Vec<u8>>;

    /// Human readable form of canonical bytes
    ///
    /// # Errors
    ///
    /// Returns bad-argument for malformed bytes
    fn humanize(&self, canonical: &[u8]) -> BridgeResult<String>;
}

/// Routes cross-contract queries
pub trait QueryRouter {
    /// Answer `request` using at most `gas_limit` gas
    ///
    /// Returns the outcome together with the gas the routing consumed.
    /// User errors are handed back to the querying contract as data.
    fn route(&self, request: &[u8], gas_limit: u64) -> (BridgeResult<Vec<u8>>, u64);
}

/// Bundle of host services for one call
///
/// The engine takes the bundle by value and returns it in its
/// [`crate::CallReport`], so no service outlives or escapes the call.
#[derive(Debug, Clone)]
pub struct Backend<S, A, Q> {
    /// Key/value storage
    pub storage: S,
    /// Address translation
    pub api: A,
    /// Query routing
    pub querier: Q,
}

impl<S, A, Q> Backend<S, A, Q> {
    /// Bundle services
    pub fn new(storage: S, api: A, querier: Q) -> Self {
        Self {
            storage,
            api,
            querier,
        }
    }
}

/// Canonicalize an address, charging the flat cost first
///
/// # Errors
///
/// Returns out-of-gas or the codec's error
pub fn canonicalize_address<A: AddressCodec + ?Sized>(
    api: &A,
    gas: &mut GasMeter,
    costs: &GasCosts,
    human: &str,
) -> BridgeResult<Vec<u8>> {
    gas.charge(costs.canonicalize, "addr_canonicalize")?;
    api.canonicalize(human)
}

/// Humanize an address, charging the flat cost first
///
/// # Errors
///
/// Returns out-of-gas or the codec's error
pub fn humanize_address<A: AddressCodec + ?Sized>(
    api: &A,
    gas: &mut GasMeter,
    costs: &GasCosts,
    canonical: &[u8],
) -> BridgeResult<String> {
    gas.charge(costs.humanize, "addr_humanize")?;
    api.humanize(canonical)
}

/// Run a query, charging the base cost first and the routed cost after
///
/// User-class failures become an error envelope for the contract; every
/// other failure aborts the call.
///
/// # Errors
///
/// Returns out-of-gas, or any non-user routing error
pub fn query_with_gas<Q: QueryRouter + ?Sized>(
    router: &Q,
    gas: &mut GasMeter,
    costs: &GasCosts,
    request: &[u8],
) -> BridgeResult<ContractResult> {
    gas.charge(costs.query, "query_chain")?;
    let (result, used) = router.route(request, gas.remaining());
    gas.charge(used, "query_chain")?;
    match result {
        Ok(response) => Ok(ContractResult::Ok(response)),
        Err(BridgeError::User(message)) => Ok(ContractResult::Err(message)),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::HexAddressCodec;
    use crate::querier::MockQuerier;

    #[test]
    fn test_canonicalize_charges_before_translation() {
        let codec = HexAddressCodec::new("seal", 2);
        let costs = GasCosts::new();
        let mut gas = GasMeter::new(costs.canonicalize);
        assert_eq!(
            canonicalize_address(&codec, &mut gas, &costs, "sealabcd").unwrap(),
            vec![0xab, 0xcd]
        );
        assert!(gas.is_exhausted());
        assert!(matches!(
            humanize_address(&codec, &mut gas, &costs, &[0xab, 0xcd]),
            Err(BridgeError::OutOfGas(_))
        ));
    }

    #[test]
    fn test_query_user_error_is_data() {
        let querier = MockQuerier::new(50).with_error(b"bad", BridgeError::user("no such denom"));
        let costs = GasCosts::new();
        let mut gas = GasMeter::new(1_000_000);
        let result = query_with_gas(&querier, &mut gas, &costs, b"bad").unwrap();
        assert_eq!(result, ContractResult::Err("no such denom".into()));
        assert_eq!(gas.used(), costs.query + 50);
    }

    #[test]
    fn test_query_other_error_aborts() {
        let querier = MockQuerier::new(0).with_error(b"down", BridgeError::other("node offline"));
        let mut gas = GasMeter::new(1_000_000);
        assert!(matches!(
            query_with_gas(&querier, &mut gas, &GasCosts::new(), b"down"),
            Err(BridgeError::Other(_))
        ));
    }

    #[test]
    fn test_query_reported_gas_can_exhaust() {
        let querier = MockQuerier::new(10_000).with_response(b"balance", b"100");
        let costs = GasCosts::free();
        let mut gas = GasMeter::new(5_000);
        let err = query_with_gas(&querier, &mut gas, &costs, b"balance").unwrap_err();
        assert!(matches!(err, BridgeError::OutOfGas(_)));
        assert_eq!(gas.used(), 5_000);
    }
}
