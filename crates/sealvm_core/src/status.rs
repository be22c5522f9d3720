//! Status taxonomy shared by every callback crossing the host boundary.
//!
//! Host callbacks (storage, address translation, queries) and the engine
//! itself report failures in exactly one of five classes. Only the
//! [`Status::User`] class is ever fed back into a running contract; every
//! other class aborts the call.

use crate::gas::GasError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome class of a boundary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Operation succeeded
    Ok,
    /// The callee violated its own invariants
    Panic,
    /// The caller passed something malformed
    BadArgument,
    /// The gas limit was reached
    OutOfGas,
    /// Operational failure (I/O, unavailable backend, ...)
    Other,
    /// Domain error meaningful to the contract
    User,
}

impl Status {
    /// All statuses in code order
    pub const ALL: [Status; 6] = [
        Self::Ok,
        Self::Panic,
        Self::BadArgument,
        Self::OutOfGas,
        Self::Other,
        Self::User,
    ];

    /// Stable integer code used on the wire
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Panic => 1,
            Self::BadArgument => 2,
            Self::OutOfGas => 3,
            Self::Other => 4,
            Self::User => 5,
        }
    }

    /// Parse a wire code
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Narrow errno-style projection: 0 success, 1 other, 2 out of gas
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::OutOfGas => 2,
            _ => 1,
        }
    }

    /// Whether the outcome may be handed back to contract code
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::Ok | Self::User)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::Panic => "panic",
            Self::BadArgument => "bad_argument",
            Self::OutOfGas => "out_of_gas",
            Self::Other => "other",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

/// Result of a host callback
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error returned by a host callback
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Callback violated its own invariants
    #[error("Host callback panicked: {0}")]
    Panic(String),

    /// Malformed input
    #[error("Bad argument: {0}")]
    BadArgument(String),

    /// Gas exhausted while serving the callback
    #[error(transparent)]
    OutOfGas(#[from] GasError),

    /// Operational failure of the host
    #[error("Host failure: {0}")]
    Other(String),

    /// Domain error for the contract
    #[error("{0}")]
    User(String),
}

impl BridgeError {
    /// Shorthand for [`BridgeError::BadArgument`]
    pub fn bad_argument(message: impl Into<String>) -> Self {
        Self::BadArgument(message.into())
    }

    /// Shorthand for [`BridgeError::Other`]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Shorthand for [`BridgeError::User`]
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }

    /// Classify this error
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Panic(_) => Status::Panic,
            Self::BadArgument(_) => Status::BadArgument,
            Self::OutOfGas(_) => Status::OutOfGas,
            Self::Other(_) => Status::Other,
            Self::User(_) => Status::User,
        }
    }
}
