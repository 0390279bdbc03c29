//! The entry point used by the mobile apps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::accounts::{AccountKey, AccountRecord, AccountStore, AccountUpdate};
use crate::http::{EndpointId, Parameters, RequestPipeline, Route};
use crate::session::{
    Clock, OAuthClient, Profile, SessionManager, SessionObserver, SessionStatus, SystemClock,
    Token,
};
use crate::vault::{AtomicBlobStore, CredentialVault, SecureKeyStore};
use crate::web::{DeviceInfo, WebSurface};
use crate::{ClientConfig, ConsultKitError, ConsultKitResult, Environment};

/// Writes refreshed tokens into the remembered account.
struct RecentAccountsRecorder {
    accounts: Arc<AccountStore>,
}

impl SessionObserver for RecentAccountsRecorder {
    fn token_refreshed(&self, account: &AccountKey, token: &Token) {
        let update = AccountUpdate::new(account.clone()).token(token.clone());
        if let Err(err) = self.accounts.upsert(update) {
            log::warn!("failed to remember refreshed token: {err}");
        }
    }
}

/// Authenticated access to the consultation backend.
///
/// Owns the credential vault, the remembered accounts, the live session and
/// the request pipelines for one environment.
#[derive(uniffi::Object)]
pub struct ConsultClient {
    config: ClientConfig,
    clock: Arc<dyn Clock>,
    accounts: Arc<AccountStore>,
    oauth: Arc<OAuthClient>,
    session: Arc<SessionManager>,
    api: RequestPipeline,
    profile: Mutex<Option<Profile>>,
}

impl std::fmt::Debug for ConsultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsultClient")
            .field("environment", &self.config.environment)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[uniffi::export(async_runtime = "tokio")]
impl ConsultClient {
    /// Creates a client for `config`, persisting through the platform stores.
    ///
    /// # Errors
    /// Returns [`ConsultKitError::InvalidInput`] if the configuration does not validate.
    #[uniffi::constructor]
    pub fn new(
        config: ClientConfig,
        key_store: Arc<dyn SecureKeyStore>,
        blob_store: Arc<dyn AtomicBlobStore>,
    ) -> ConsultKitResult<Self> {
        Self::with_clock(config, key_store, blob_store, Arc::new(SystemClock))
    }

    /// Logs in with a password and remembers the account.
    ///
    /// # Errors
    /// Returns [`ConsultKitError::Http`] when the credentials are rejected, or
    /// a transport error.
    pub async fn login(&self, username: &str, password: &str) -> ConsultKitResult<Token> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ConsultKitError::invalid_input("username", "must not be empty"));
        }
        let password = SecretString::from(password.to_string());

        let token = self.oauth.login(username, &password).await?;
        let account = AccountKey::new(username, self.config.environment);
        self.session.start(account.clone(), token.clone())?;
        self.clear_profile();

        let update = AccountUpdate::new(account)
            .password(password.expose_secret())
            .last_login_at(self.clock.now_millis())
            .token(token.clone());
        if let Err(err) = self.accounts.upsert(update) {
            log::warn!("failed to remember account: {err}");
        }
        Ok(token)
    }

    /// Ends the session. The remembered account is kept.
    pub fn logout(&self) {
        self.session.end();
        self.clear_profile();
    }

    /// `Authorization` header for a token that is valid now, refreshing first
    /// if needed.
    ///
    /// # Errors
    /// - [`ConsultKitError::NotAuthenticated`] without a session.
    /// - [`ConsultKitError::AuthExpired`] if the refresh failed.
    pub async fn valid_auth_header(&self) -> ConsultKitResult<String> {
        self.session.valid_auth_header().await
    }

    /// Storage key of the logged-in account.
    #[must_use]
    pub fn current_account(&self) -> Option<String> {
        self.session
            .current_account()
            .map(|account| account.as_str().to_string())
    }

    /// State of the live session.
    #[must_use]
    pub fn session_status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Fetches the practitioner profile and stores it with the account.
    ///
    /// The profile is only cached and stored if the same account is still
    /// logged in when the response arrives.
    ///
    /// # Errors
    /// Session, transport, HTTP or decode errors from the profile request.
    pub async fn fetch_profile(&self) -> ConsultKitResult<Profile> {
        let account = self.session.current_account();
        let profile: Profile = self
            .api
            .execute(&Route::new(EndpointId::UserProfile), &Parameters::new())
            .await?;

        self.remember_profile(account.as_ref(), &profile);
        Ok(profile)
    }

    /// Remembered accounts, most recent first.
    #[must_use]
    pub fn recent_accounts(&self, environment: Option<Environment>) -> Vec<AccountRecord> {
        self.accounts.list_recent(environment)
    }

    /// Forgets a remembered account.
    ///
    /// # Errors
    /// Returns [`ConsultKitError::InvalidInput`] for a malformed key, or
    /// [`ConsultKitError::Encryption`] if the change cannot be persisted.
    pub fn forget_account(&self, account_key: &str) -> ConsultKitResult<()> {
        let account = AccountKey::parse(account_key)?;
        self.accounts.delete(&account)?;
        Ok(())
    }

    /// Turns biometric unlock on or off for a remembered account.
    ///
    /// # Errors
    /// Returns [`ConsultKitError::InvalidInput`] for a malformed key, or
    /// [`ConsultKitError::Encryption`] if the change cannot be persisted.
    pub fn set_biometric_enabled(
        &self,
        account_key: &str,
        enabled: bool,
    ) -> ConsultKitResult<AccountRecord> {
        let account = AccountKey::parse(account_key)?;
        Ok(self
            .accounts
            .upsert(AccountUpdate::new(account).biometric_enabled(enabled))?)
    }

    /// Calls any catalog endpoint. `parameters_json` is a JSON object (or
    /// empty); the response body is returned as JSON text.
    ///
    /// # Errors
    /// [`ConsultKitError::InvalidInput`] for malformed parameters or missing
    /// path arguments, otherwise the pipeline's errors.
    pub async fn request_json(
        &self,
        endpoint: EndpointId,
        path_args: HashMap<String, String>,
        parameters_json: &str,
    ) -> ConsultKitResult<String> {
        let params = parse_parameters(parameters_json)?;
        let route = path_args
            .into_iter()
            .fold(Route::new(endpoint), |route, (name, value)| route.arg(name, value));
        let response = self.api.execute_json(&route, &params).await?;
        Ok(response.to_string())
    }

    /// URL of a hosted web surface carrying the session handoff parameters.
    /// The token is refreshed first if needed.
    ///
    /// # Errors
    /// Session errors from [`ConsultClient::valid_auth_header`].
    pub async fn web_surface_url(
        &self,
        surface: WebSurface,
        device: DeviceInfo,
    ) -> ConsultKitResult<String> {
        let token = self.session.valid_token().await?;
        let profile = self.cached_profile();
        surface.url(
            &self.config.web_base_url(),
            &token,
            profile.as_ref(),
            &device,
            self.clock.now_millis(),
        )
    }
}

impl ConsultClient {
    /// Same as [`ConsultClient::new`] with an explicit time source.
    ///
    /// # Errors
    /// Returns [`ConsultKitError::InvalidInput`] if the configuration does not validate.
    pub fn with_clock(
        config: ClientConfig,
        key_store: Arc<dyn SecureKeyStore>,
        blob_store: Arc<dyn AtomicBlobStore>,
        clock: Arc<dyn Clock>,
    ) -> ConsultKitResult<Self> {
        config.validate()?;

        let vault = Arc::new(CredentialVault::new(key_store));
        let accounts = Arc::new(AccountStore::new(vault, blob_store));
        let oauth = Arc::new(OAuthClient::new(
            RequestPipeline::from_config(&config),
            config.client_id.clone(),
            clock.clone(),
        ));
        let recorder: Arc<dyn SessionObserver> = Arc::new(RecentAccountsRecorder {
            accounts: accounts.clone(),
        });
        let session = Arc::new(SessionManager::new(
            oauth.clone(),
            clock.clone(),
            Some(recorder),
        ));
        let api = RequestPipeline::from_config(&config).with_auth(session.clone());

        log::info!("consult client ready for {}", config.environment);
        Ok(Self {
            config,
            clock,
            accounts,
            oauth,
            session,
            api,
            profile: Mutex::new(None),
        })
    }

    fn remember_profile(&self, requested_for: Option<&AccountKey>, profile: &Profile) {
        let Some(account) = requested_for else {
            return;
        };
        if self.session.current_account().as_ref() != Some(account) {
            log::debug!("discarding profile fetched for {account}, the session changed");
            return;
        }

        if let Ok(mut cached) = self.profile.lock() {
            *cached = Some(profile.clone());
        }
        let update = AccountUpdate::new(account.clone()).session_profile(profile.clone());
        if let Err(err) = self.accounts.upsert(update) {
            log::warn!("failed to store profile: {err}");
        }
    }

    fn cached_profile(&self) -> Option<Profile> {
        self.profile.lock().ok().and_then(|profile| profile.clone())
    }

    fn clear_profile(&self) {
        if let Ok(mut profile) = self.profile.lock() {
            *profile = None;
        }
    }
}

fn parse_parameters(json: &str) -> ConsultKitResult<Parameters> {
    if json.trim().is_empty() {
        return Ok(Parameters::new());
    }
    match serde_json::from_str(json) {
        Ok(Value::Object(params)) => Ok(params),
        Ok(_) => Err(ConsultKitError::invalid_input(
            "parameters_json",
            "must be a JSON object",
        )),
        Err(err) => Err(ConsultKitError::invalid_input(
            "parameters_json",
            err.to_string(),
        )),
    }
}
