// src/error.rs
//! Public error types for the entire crate
//!
//! `PlatformError` is what the external collaborators (secure item store,
//! security platform) report. It is mapped into `CoreError` at the boundary
//! so business logic only ever sees the crate taxonomy.

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// One item a sweep could not migrate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub key: String,
    pub error: String,
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("Key version `{0}` not found")]
    KeyNotFound(String),

    #[error("Authentication was canceled")]
    AuthenticationCanceled,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Biometry is locked out")]
    BiometryLockout,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Key rotation already in progress")]
    RotationAlreadyInProgress,

    #[error("Re-encryption left {} item(s) on an old key version", .0.len())]
    ReEncryptionPartialFailure(Vec<ItemError>),

    #[error("Key version `{0}` was permanently invalidated by the platform")]
    KeyInvalidated(String),

    #[error("Key version `{0}` is still referenced by stored items")]
    KeyVersionInUse(String),

    #[error("Item `{key}` references unknown key version `{version}`")]
    UnresolvableKeyVersion { key: String, version: String },

    #[error("Key rotation is disabled: {0}")]
    RotationDisabled(&'static str),

    #[error("Item `{0}` not found")]
    ItemNotFound(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CoreError {
    /// Expected outcomes of an authentication prompt, as opposed to
    /// programming or infrastructure failures
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            CoreError::AuthenticationCanceled
                | CoreError::AuthenticationFailed(_)
                | CoreError::BiometryLockout
        )
    }
}

/// Errors reported by platform collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("user canceled authentication")]
    Canceled,

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("biometry locked out")]
    Lockout,

    #[error("key permanently invalidated")]
    KeyPermanentlyInvalidated,

    #[error("entry not found")]
    NotFound,

    /// The OS refused the parameters for a protection object. Recoverable:
    /// the resolver moves on to the next tier.
    #[error("parameters rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlatformError::Rejected(_))
    }
}

impl From<PlatformError> for CoreError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Canceled => CoreError::AuthenticationCanceled,
            PlatformError::AuthenticationFailed(msg) => CoreError::AuthenticationFailed(msg),
            PlatformError::Lockout => CoreError::BiometryLockout,
            other => CoreError::Platform(other.to_string()),
        }
    }
}
