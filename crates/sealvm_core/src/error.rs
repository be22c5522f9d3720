//! Core error types for SealVM.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid encoding
    InvalidEncoding {
        /// Decoder message
        message: String,
    },

    /// Invalid checksum format
    InvalidChecksum {
        /// Why the checksum was rejected
        reason: String,
    },

    /// Checksum does not match the bytes it claims to describe
    ChecksumMismatch {
        /// Checksum the caller expected
        expected: String,
        /// Checksum of the actual bytes
        actual: String,
    },

    /// Invalid capability name
    InvalidCapability {
        /// Why the name was rejected
        reason: String,
    },

    /// Malformed result envelope
    InvalidEnvelope {
        /// Why the envelope was rejected
        reason: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEncoding { message } => write!(f, "Invalid encoding: {}", message),
            Self::InvalidChecksum { reason } => write!(f, "Invalid checksum: {}", reason),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "Checksum mismatch: expected {}, got {}", expected, actual)
            }
            Self::InvalidCapability { reason } => write!(f, "Invalid capability: {}", reason),
            Self::InvalidEnvelope { reason } => write!(f, "Invalid result envelope: {}", reason),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidEncoding {
            message: err.to_string(),
        }
    }
}
