//! Error types for account key management
//!
//! Every failure carries a distinct kind so callers can choose between
//! retrying, alerting an operator, or aborting.

use std::time::Duration;

/// MongoDB server error code for a unique index violation
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Main error type for key lifecycle and authorizer operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Key generation failed: {0}")]
    Generation(String),

    #[error("Key encoding failed: {0}")]
    Encoding(String),

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Key decryption failed: {0}")]
    Decryption(String),

    #[error("Chain query failed: {0}")]
    ChainQuery(String),

    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("No keys available for account {address}")]
    NoKeysAvailable { address: String },

    #[error("Key resolution failed: {0}")]
    KeyResolution(#[source] Box<KeyError>),

    #[error("Stored key at index {index} of {address} does not match the on-chain public key")]
    KeyMismatch { address: String, index: u32 },

    #[error("Key index conflict: {0}")]
    IndexConflict(String),

    #[error("No free key index for account {address} (limit {limit})")]
    IndexExhausted { address: String, limit: u32 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl KeyError {
    /// Whether the caller may retry the operation with backoff.
    ///
    /// Only transient unavailability qualifies. Decode, decrypt and
    /// provisioning failures indicate corruption or misconfiguration and
    /// retrying them would only hide the problem.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ChainQuery(_) | Self::Timeout { .. } | Self::Database(_)
        )
    }

    /// Wrap a Load-side failure raised while building an authorizer
    pub(crate) fn resolution(err: KeyError) -> Self {
        Self::KeyResolution(Box::new(err))
    }
}

impl From<mongodb::error::Error> for KeyError {
    fn from(err: mongodb::error::Error) -> Self {
        if is_duplicate_key(&err) {
            Self::IndexConflict(err.to_string())
        } else {
            Self::Database(err.to_string())
        }
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

/// Result type alias for key operations
pub type Result<T> = std::result::Result<T, KeyError>;
