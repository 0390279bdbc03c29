use serde::{Deserialize, Serialize};

use crate::{
    error::ConsultKitError,
    session::{Profile, Token},
    ConsultKitResult, Environment,
};

const SEPARATOR: &str = "__";

/// Storage key of a remembered account: `lower(username)__<environment tag>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountKey(String);

impl AccountKey {
    /// Builds the key for `username` on `environment`.
    #[must_use]
    pub fn new(username: &str, environment: Environment) -> Self {
        Self(format!(
            "{}{SEPARATOR}{}",
            username.trim().to_lowercase(),
            environment.storage_tag()
        ))
    }

    /// Parses a raw storage key such as `alice__prod`.
    ///
    /// # Errors
    /// Returns [`ConsultKitError::InvalidInput`] if the key does not end in a
    /// known environment tag.
    pub fn parse(raw: &str) -> ConsultKitResult<Self> {
        match raw.rsplit_once(SEPARATOR) {
            Some((user, tag)) if !user.is_empty() => match Environment::from_storage_tag(tag) {
                Some(environment) => Ok(Self::new(user, environment)),
                None => Err(ConsultKitError::invalid_input(
                    "account_key",
                    format!("unknown environment tag `{tag}`"),
                )),
            },
            _ => Err(ConsultKitError::invalid_input(
                "account_key",
                format!("`{raw}` is not of the form <username>__<environment>"),
            )),
        }
    }

    /// The key as stored.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Environment tag part.
    #[must_use]
    pub fn environment_tag(&self) -> &str {
        self.0.rsplit_once(SEPARATOR).map_or("", |(_, tag)| tag)
    }

    /// Whether the key belongs to `environment`.
    #[must_use]
    pub fn belongs_to(&self, environment: Environment) -> bool {
        self.environment_tag() == environment.storage_tag()
    }
}

impl std::fmt::Display for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A remembered account, shown in the "recent accounts" list.
///
/// The embedded token is a copy taken when the account was last persisted. It
/// is never loaded back into a live session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct AccountRecord {
    /// `lower(username)__<environment tag>`.
    pub account_key: String,
    /// Password kept for biometric re-login.
    pub password: String,
    /// Last successful login, epoch milliseconds.
    pub last_login_at: u64,
    /// Profile fetched after login.
    pub session_profile: Option<Profile>,
    /// Whether the user enabled biometric unlock for this account.
    pub biometric_enabled: bool,
    /// Last known token.
    pub token: Option<Token>,
}

impl std::fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRecord")
            .field("account_key", &self.account_key)
            .field("password", &"[REDACTED]")
            .field("last_login_at", &self.last_login_at)
            .field("session_profile", &self.session_profile)
            .field("biometric_enabled", &self.biometric_enabled)
            .field("token", &self.token)
            .finish()
    }
}

impl AccountRecord {
    fn empty(account_key: &AccountKey) -> Self {
        Self {
            account_key: account_key.as_str().to_string(),
            password: String::new(),
            last_login_at: 0,
            session_profile: None,
            biometric_enabled: false,
            token: None,
        }
    }

    /// Merges `update` into `existing` (or a blank record). Only fields present
    /// in the update overwrite.
    #[must_use]
    pub fn merged(existing: Option<Self>, update: AccountUpdate) -> Self {
        let mut record = existing.unwrap_or_else(|| Self::empty(&update.account_key));
        if let Some(password) = update.password {
            record.password = password;
        }
        if let Some(last_login_at) = update.last_login_at {
            record.last_login_at = last_login_at;
        }
        if let Some(profile) = update.session_profile {
            record.session_profile = Some(profile);
        }
        if let Some(enabled) = update.biometric_enabled {
            record.biometric_enabled = enabled;
        }
        if let Some(token) = update.token {
            record.token = Some(token);
        }
        record
    }
}

/// Partial account record used by [`super::AccountStore::upsert`].
#[derive(Debug, Clone)]
pub struct AccountUpdate {
    /// Target account.
    pub account_key: AccountKey,
    /// New password.
    pub password: Option<String>,
    /// New last-login time.
    pub last_login_at: Option<u64>,
    /// New profile.
    pub session_profile: Option<Profile>,
    /// New biometric preference.
    pub biometric_enabled: Option<bool>,
    /// New token copy.
    pub token: Option<Token>,
}

impl AccountUpdate {
    /// An update that changes nothing but the account's presence.
    #[must_use]
    pub const fn new(account_key: AccountKey) -> Self {
        Self {
            account_key,
            password: None,
            last_login_at: None,
            session_profile: None,
            biometric_enabled: None,
            token: None,
        }
    }

    /// Sets the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the last-login time.
    #[must_use]
    pub const fn last_login_at(mut self, at: u64) -> Self {
        self.last_login_at = Some(at);
        self
    }

    /// Sets the profile.
    #[must_use]
    pub fn session_profile(mut self, profile: Profile) -> Self {
        self.session_profile = Some(profile);
        self
    }

    /// Sets the biometric preference.
    #[must_use]
    pub const fn biometric_enabled(mut self, enabled: bool) -> Self {
        self.biometric_enabled = Some(enabled);
        self
    }

    /// Sets the token copy.
    #[must_use]
    pub fn token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }
}
