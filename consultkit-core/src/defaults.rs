use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::{error::ConsultKitError, ConsultKitResult, Environment};

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MAX_RETRIES: u32 = 2; // total attempts = 3, idempotent requests only

/// Client configuration supplied by the host app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct ClientConfig {
    /// Backend environment.
    pub environment: Environment,
    /// OAuth client identifier registered for the app.
    pub client_id: String,
    /// Overrides the environment's API base URL.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Overrides the environment's web-surface base URL.
    #[serde(default)]
    pub web_base_url: Option<String>,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for idempotent requests on transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl ClientConfig {
    /// Builds the default configuration for `environment`.
    #[must_use]
    pub fn from_environment(environment: Environment, client_id: &str) -> Self {
        Self {
            environment,
            client_id: client_id.to_string(),
            api_base_url: None,
            web_base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Parses a configuration handed over by the host app as JSON.
    ///
    /// # Errors
    /// Returns [`ConsultKitError::InvalidInput`] if the JSON is malformed or the
    /// resulting configuration does not validate.
    pub fn from_json(json: &str) -> ConsultKitResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConsultKitError::invalid_input("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration is usable.
    ///
    /// Base URLs must be HTTPS; plain HTTP is accepted for loopback hosts only.
    ///
    /// # Errors
    /// Returns [`ConsultKitError::InvalidInput`] naming the offending attribute.
    pub fn validate(&self) -> ConsultKitResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(ConsultKitError::invalid_input("client_id", "must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(ConsultKitError::invalid_input("timeout_secs", "must be positive"));
        }
        check_base_url("api_base_url", &self.api_base_url())?;
        check_base_url("web_base_url", &self.web_base_url())?;
        Ok(())
    }

    /// API base URL, always ending with `/`.
    #[must_use]
    pub fn api_base_url(&self) -> String {
        with_trailing_slash(self.api_base_url.as_deref().unwrap_or(
            match self.environment {
                Environment::Development => "https://api.dev.consultkit.app/",
                Environment::Staging => "https://api.staging.consultkit.app/",
                Environment::Production => "https://api.consultkit.app/",
            },
        ))
    }

    /// Base URL of the hosted web surfaces, always ending with `/`.
    #[must_use]
    pub fn web_base_url(&self) -> String {
        with_trailing_slash(self.web_base_url.as_deref().unwrap_or(
            match self.environment {
                Environment::Development => "https://app.dev.consultkit.app/",
                Environment::Staging => "https://app.staging.consultkit.app/",
                Environment::Production => "https://app.consultkit.app/",
            },
        ))
    }
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

fn check_base_url(attribute: &str, url: &str) -> ConsultKitResult<()> {
    let parsed =
        Url::parse(url).map_err(|e| ConsultKitError::invalid_input(attribute, e.to_string()))?;
    match parsed.scheme() {
        "https" => Ok(()),
        "http"
            if matches!(
                parsed.host_str(),
                Some("localhost" | "127.0.0.1" | "[::1]")
            ) =>
        {
            Ok(())
        }
        scheme => Err(ConsultKitError::invalid_input(
            attribute,
            format!("unsupported scheme `{scheme}`"),
        )),
    }
}
