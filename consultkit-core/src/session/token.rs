//! OAuth tokens and their expiry rules.

use serde::{Deserialize, Serialize};

/// Access token issued by the `oauth2/token` endpoint.
///
/// `issued_at` is recorded locally (epoch milliseconds) when the token is
/// received; expiry is derived from it and the server-provided lifetime.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct Token {
    /// Scheme used in the `Authorization` header, usually `Bearer`.
    pub token_type: String,
    /// Access token value.
    pub access_token: String,
    /// `OpenID` identity token; empty when the server omits it.
    pub id_token: String,
    /// Refresh token, absent for grants that cannot be refreshed.
    pub refresh_token: Option<String>,
    /// Lifetime in seconds from `issued_at`.
    pub expires_in_seconds: u64,
    /// Local receipt time in epoch milliseconds.
    pub issued_at: u64,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("token_type", &self.token_type)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in_seconds", &self.expires_in_seconds)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

impl Token {
    /// Last epoch millisecond at which the token is still valid.
    #[must_use]
    pub const fn expires_at(&self) -> u64 {
        self.issued_at
            .saturating_add(self.expires_in_seconds.saturating_mul(1000))
    }

    /// Whether the token is expired at `now` (epoch milliseconds).
    ///
    /// The token is valid up to and including `expires_at`, so a zero lifetime
    /// expires one millisecond after issue. An `issued_at` in the future
    /// (clock skew) counts as not expired.
    #[must_use]
    pub const fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at()
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn auth_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// Body returned by `oauth2/token` for both password and refresh grants.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub token_type: String,
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

impl TokenResponse {
    pub(crate) fn into_token(self, issued_at: u64) -> Token {
        Token {
            token_type: self.token_type,
            access_token: self.access_token,
            id_token: self.id_token.unwrap_or_default(),
            refresh_token: self.refresh_token,
            expires_in_seconds: self.expires_in,
            issued_at,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_token(access_token: &str, expires_in_seconds: u64, issued_at: u64) -> Token {
    Token {
        token_type: "Bearer".to_string(),
        access_token: access_token.to_string(),
        id_token: String::new(),
        refresh_token: Some(format!("refresh-{access_token}")),
        expires_in_seconds,
        issued_at,
    }
}
