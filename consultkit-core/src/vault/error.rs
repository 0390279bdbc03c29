//! Error types for the credential vault and its platform stores.

use thiserror::Error;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors raised by the vault and the platform stores behind it.
#[derive(Debug, Error, uniffi::Error)]
pub enum VaultError {
    /// Errors coming from the secure key store.
    #[error("key store error: {0}")]
    KeyStore(String),

    /// Errors coming from the blob store.
    #[error("blob store error: {0}")]
    BlobStore(String),

    /// No vault key exists yet, so there is nothing that could be decrypted.
    #[error("vault key missing")]
    MissingKey,

    /// The stored vault key is malformed.
    #[error("invalid vault key: {0}")]
    InvalidKey(String),

    /// Serialization/deserialization failures.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// AEAD failures (tampered data, wrong key, truncated blob).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for VaultError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}
