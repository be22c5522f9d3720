//! Engine and cache errors.

use crate::compile::CompileError;
use sealvm_core::{BridgeError, Checksum, CoreError, GasError, Status};
use wasmtime::Trap;

/// Result type of cache and engine operations
pub type VmResult<T> = Result<T, VmError>;

/// Cache and engine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    /// The cache was released
    #[error("Module cache has been released")]
    CacheReleased,

    /// No code stored under the checksum
    #[error("No code stored for checksum {0}")]
    ChecksumNotFound(Checksum),

    /// Bytecode rejected by validation or compilation
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Caller violated the call contract
    #[error("Bad argument: {0}")]
    BadArgument(String),

    /// Gas limit reached
    #[error("Out of gas during {operation}")]
    OutOfGas {
        /// Operation that exhausted the meter
        operation: String,
    },

    /// Contract or host callback violated its own invariants
    #[error("Panic: {0}")]
    Panic(String),

    /// Host backend failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Domain error raised by contract code
    #[error("Contract error: {0}")]
    ContractError(String),

    /// Runtime failure outside contract code
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O error on the code directory
    #[error("I/O error: {0}")]
    Io(String),
}

impl VmError {
    /// Classify this error
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::CacheReleased | Self::ChecksumNotFound(_) | Self::BadArgument(_) => {
                Status::BadArgument
            }
            Self::Compile(err) => err.status(),
            Self::OutOfGas { .. } => Status::OutOfGas,
            Self::Panic(_) => Status::Panic,
            Self::Backend(_) | Self::Runtime(_) | Self::Io(_) => Status::Other,
            Self::ContractError(_) => Status::User,
        }
    }

    pub(crate) fn runtime(err: impl std::fmt::Display) -> Self {
        Self::Runtime(err.to_string())
    }

    pub(crate) fn bad_argument(message: impl Into<String>) -> Self {
        Self::BadArgument(message.into())
    }

    /// Recover the error behind a wasmtime failure
    ///
    /// Host functions raise [`VmError`]s that travel through wasmtime as
    /// traps; those are returned unchanged. Running out of fuel becomes
    /// out-of-gas and any other trap is a contract panic.
    pub(crate) fn from_wasm(err: anyhow::Error) -> Self {
        if let Some(vm) = err.downcast_ref::<VmError>() {
            return vm.clone();
        }
        if let Some(trap) = err.downcast_ref::<Trap>() {
            if matches!(trap, Trap::OutOfFuel) {
                return Self::OutOfGas {
                    operation: "wasm execution".to_string(),
                };
            }
            return Self::Panic(format!("wasm trap: {}", trap));
        }
        Self::Runtime(format!("{:#}", err))
    }
}

impl From<GasError> for VmError {
    fn from(err: GasError) -> Self {
        match err {
            GasError::OutOfGas { operation, .. } => Self::OutOfGas { operation },
        }
    }
}

impl From<BridgeError> for VmError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Panic(msg) => Self::Panic(msg),
            BridgeError::BadArgument(msg) => Self::BadArgument(msg),
            BridgeError::OutOfGas(gas) => gas.into(),
            BridgeError::Other(msg) => Self::Backend(msg),
            BridgeError::User(msg) => Self::ContractError(msg),
        }
    }
}

impl From<CoreError> for VmError {
    fn from(err: CoreError) -> Self {
        Self::BadArgument(err.to_string())
    }
}

impl From<std::io::Error> for VmError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(VmError::CacheReleased.status(), Status::BadArgument);
        assert_eq!(
            VmError::OutOfGas {
                operation: "db_read".into()
            }
            .status(),
            Status::OutOfGas
        );
        assert_eq!(VmError::ContractError("x".into()).status(), Status::User);
        assert_eq!(VmError::Backend("x".into()).status(), Status::Other);
        assert_eq!(VmError::Panic("x".into()).status(), Status::Panic);
    }

    #[test]
    fn test_bridge_errors_keep_their_class() {
        for err in [
            BridgeError::Panic("p".into()),
            BridgeError::bad_argument("b"),
            BridgeError::other("o"),
            BridgeError::user("u"),
        ] {
            let status = err.status();
            assert_eq!(VmError::from(err).status(), status);
        }
    }

    #[test]
    fn test_from_wasm_recovers_host_error() {
        let err = anyhow::Error::from(VmError::bad_argument("write in query"))
            .context("wasm backtrace");
        assert_eq!(
            VmError::from_wasm(err),
            VmError::BadArgument("write in query".into())
        );
    }

    #[test]
    fn test_from_wasm_out_of_fuel() {
        let err = anyhow::Error::from(Trap::OutOfFuel);
        assert!(matches!(VmError::from_wasm(err), VmError::OutOfGas { .. }));

        let err = anyhow::Error::from(Trap::UnreachableCodeReached);
        assert!(matches!(VmError::from_wasm(err), VmError::Panic(_)));
    }
}
