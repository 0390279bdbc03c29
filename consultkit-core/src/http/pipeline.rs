use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{ClientConfig, ConsultKitError, ConsultKitResult};

use super::encoding::{encode_form, encode_json, encode_query, Parameters};
use super::endpoint::{ContentType, Route};
use super::request::Request;

/// Supplies the `Authorization` header for endpoints that require one.
#[async_trait]
pub trait AuthHeaderSource: Send + Sync {
    /// Header value for a token that is valid now.
    ///
    /// # Errors
    /// Returns the session error that prevents an authenticated call.
    async fn valid_auth_header(&self) -> ConsultKitResult<String>;
}

/// Turns a [`Route`] and [`Parameters`] into an HTTP exchange and its result.
pub struct RequestPipeline {
    base_url: String,
    request: Request,
    auth: Option<Arc<dyn AuthHeaderSource>>,
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.auth.is_some())
            .finish_non_exhaustive()
    }
}

impl RequestPipeline {
    /// Pipeline for `base_url` without an auth source. Endpoints that require
    /// auth fail with [`ConsultKitError::NotAuthenticated`].
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration, max_retries: u32) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            request: Request::new(timeout, max_retries),
            auth: None,
        }
    }

    /// Pipeline against the configured API base URL.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.api_base_url(),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
    }

    /// Attaches the source of `Authorization` headers.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthHeaderSource>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Executes `route` and decodes the 2xx body into `T`.
    ///
    /// An empty body decodes as JSON `null`, so `Option<_>` and `()` targets
    /// accept it.
    ///
    /// # Errors
    /// - [`ConsultKitError::Conflict`] on 409, [`ConsultKitError::Http`] on
    ///   any other non-2xx status.
    /// - [`ConsultKitError::Decode`] when the body does not match `T`.
    /// - Session errors for authenticated endpoints, and transport errors.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        route: &Route,
        params: &Parameters,
    ) -> ConsultKitResult<T> {
        let body = self.send(route, params).await?;
        decode(if body.trim().is_empty() { "null" } else { body.as_str() })
    }

    /// Executes `route` and returns the 2xx body as untyped JSON. An empty
    /// body is returned as an empty object.
    ///
    /// # Errors
    /// See [`RequestPipeline::execute`].
    pub async fn execute_json(&self, route: &Route, params: &Parameters) -> ConsultKitResult<Value> {
        let body = self.send(route, params).await?;
        decode(if body.trim().is_empty() { "{}" } else { body.as_str() })
    }

    async fn send(&self, route: &Route, params: &Parameters) -> ConsultKitResult<String> {
        let descriptor = route.descriptor();
        let path = route.path()?;
        let mut url = format!("{}{path}", self.base_url);

        let mut builder = if descriptor.method == Method::GET {
            let query = encode_query(params);
            if !query.is_empty() {
                url.push('?');
                url.push_str(&query);
            }
            self.request.req(Method::GET, &url)
        } else {
            let body = match descriptor.content_type {
                ContentType::Form => encode_form(params),
                ContentType::Json => {
                    serde_json::to_string(&encode_json(params, descriptor.explicit_null_fields))?
                }
            };
            self.request
                .req(descriptor.method.clone(), &url)
                .header(CONTENT_TYPE, descriptor.content_type.mime())
                .body(body)
        };
        for (name, value) in descriptor.headers {
            builder = builder.header(*name, *value);
        }
        if descriptor.requires_auth {
            let auth = self.auth.as_ref().ok_or(ConsultKitError::NotAuthenticated)?;
            builder = builder.header(AUTHORIZATION, auth.valid_auth_header().await?);
        }

        let response = self
            .request
            .handle(builder, descriptor.is_idempotent())
            .await?;
        let status = response.status();
        let body = response.text().await.map_err(|err| ConsultKitError::Network {
            url: format!("{}{path}", self.base_url),
            error: format!("failed to read response body: {err}"),
        })?;
        log::debug!("{} {path} -> {}", descriptor.method, status.as_u16());

        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_failure(status, &body))
        }
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> ConsultKitResult<T> {
    let deserializer = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(deserializer).map_err(|err| ConsultKitError::Decode {
        path: err.path().to_string(),
        expected_type: std::any::type_name::<T>().to_string(),
        reason: err.into_inner().to_string(),
    })
}

/// Maps a non-2xx response to an error. The message is the body's `detail`
/// field, else the raw body, else a generic description of the status.
fn classify_failure(status: StatusCode, body: &str) -> ConsultKitError {
    let detail = failure_detail(status, body);
    if status == StatusCode::CONFLICT {
        ConsultKitError::Conflict { detail }
    } else {
        ConsultKitError::Http {
            status: status.as_u16(),
            detail,
        }
    }
}

fn failure_detail(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) {
        match fields.get("detail") {
            Some(Value::String(detail)) => return detail.clone(),
            Some(detail) => return detail.to_string(),
            None => {}
        }
    }
    let raw = body.trim();
    if raw.is_empty() {
        format!(
            "request failed with status {} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        )
        .trim_end()
        .to_string()
    } else {
        raw.to_string()
    }
}
