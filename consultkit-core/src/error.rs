use thiserror::Error;

use crate::vault::VaultError;

/// Result type used across `ConsultKit`.
pub type ConsultKitResult<T, E = ConsultKitError> = std::result::Result<T, E>;

/// Error outputs from `ConsultKit`.
///
/// Errors are `Clone` because a single token-refresh failure is handed to every
/// caller that was waiting on that refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
pub enum ConsultKitError {
    /// The request never produced an HTTP response (DNS, TLS, timeout, ...).
    #[error("network_error: {url}: {error}")]
    Network {
        /// Request URL.
        url: String,
        /// Transport error description.
        error: String,
    },
    /// The server answered outside the 2xx range.
    #[error("http_error: {status}: {detail}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// `detail` field, raw body or a generic message.
        detail: String,
    },
    /// A 2xx body did not match the expected structure.
    #[error("decode_error: {expected_type} at `{path}`: {reason}")]
    Decode {
        /// Path of the offending field (`.` for the root).
        path: String,
        /// Target type name.
        expected_type: String,
        /// Underlying decoder message.
        reason: String,
    },
    /// Encrypting or decrypting stored credentials failed.
    #[error("encryption_error: {reason}")]
    Encryption {
        /// Description of the failure.
        reason: String,
    },
    /// The session could not be refreshed and was cleared. The user must log in again.
    #[error("auth_expired: {reason}")]
    AuthExpired {
        /// Why the refresh failed.
        reason: String,
    },
    /// The server reported a duplicate (HTTP 409); the caller may confirm and retry.
    #[error("conflict: {detail}")]
    Conflict {
        /// Server-provided explanation.
        detail: String,
    },
    /// An authenticated operation was attempted without an active session.
    #[error("not_authenticated")]
    NotAuthenticated,
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input: {attribute}: {reason}")]
    InvalidInput {
        /// Offending attribute.
        attribute: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Unexpected error serializing information.
    #[error("serialization_error: {error}")]
    Serialization {
        /// Serializer message.
        error: String,
    },
}

impl ConsultKitError {
    /// `true` when the app should route the user back to the login screen.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthExpired { .. } | Self::NotAuthenticated)
    }

    /// `true` when the app should show a confirm/override prompt.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub(crate) fn invalid_input(attribute: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<VaultError> for ConsultKitError {
    fn from(error: VaultError) -> Self {
        Self::Encryption {
            reason: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for ConsultKitError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            error: error.to_string(),
        }
    }
}
