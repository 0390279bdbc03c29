use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{header::USER_AGENT, Method, RequestBuilder, Response};

use crate::ConsultKitError;

const UNKNOWN_URL: &str = "<unknown>";

/// Thin wrapper over a `reqwest` client that applies the per-request timeout
/// and user agent, and retries idempotent requests on transient failures.
///
/// Transient failures are timeouts, connection errors, 429 and 5xx. When the
/// retries are exhausted on a bad status, the last response is returned so the
/// caller can classify it.
pub(crate) struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl Request {
    pub(crate) fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            max_retries,
        }
    }

    /// Creates a request builder with defaults applied.
    pub(crate) fn req(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header(
                USER_AGENT,
                format!("consultkit-core/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    /// Sends a request built by [`Request::req`]. Only `idempotent` requests are retried.
    pub(crate) async fn handle(
        &self,
        request_builder: RequestBuilder,
        idempotent: bool,
    ) -> Result<Response, ConsultKitError> {
        let template = match request_builder.try_clone() {
            Some(template) if idempotent && self.max_retries > 0 => template,
            _ => {
                return execute_request_builder(request_builder)
                    .await
                    .or_else(AttemptError::into_outcome)
            }
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        (|| async {
            let request_builder = template.try_clone().ok_or_else(|| AttemptError::Permanent {
                url: UNKNOWN_URL.to_string(),
                error: "request cannot be retried because it is not cloneable".to_string(),
            })?;
            execute_request_builder(request_builder).await
        })
        .retry(backoff)
        .when(AttemptError::is_retryable)
        .notify(|err: &AttemptError, after: Duration| {
            log::debug!("retrying request in {after:?}: {err}");
        })
        .await
        .or_else(AttemptError::into_outcome)
    }
}

#[derive(Debug)]
enum AttemptError {
    Transport { url: String, error: String },
    Status(Response),
    Permanent { url: String, error: String },
}

impl AttemptError {
    const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent { .. })
    }

    fn into_outcome(self) -> Result<Response, ConsultKitError> {
        match self {
            Self::Status(response) => Ok(response),
            Self::Transport { url, error } | Self::Permanent { url, error } => {
                Err(ConsultKitError::Network { url, error })
            }
        }
    }
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport { error, .. } | Self::Permanent { error, .. } => f.write_str(error),
            Self::Status(response) => write!(f, "bad status code {}", response.status().as_u16()),
        }
    }
}

async fn execute_request_builder(request_builder: RequestBuilder) -> Result<Response, AttemptError> {
    let (client, request) = request_builder.build_split();
    let request = request.map_err(|err| AttemptError::Permanent {
        url: err
            .url()
            .map_or_else(|| UNKNOWN_URL.to_string(), ToString::to_string),
        error: format!("request build failed: {err}"),
    })?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(AttemptError::Status(resp));
            }
            Ok(resp)
        }
        Err(err) if err.is_timeout() || err.is_connect() => Err(AttemptError::Transport {
            url,
            error: format!("request timeout/connect error: {err}"),
        }),
        Err(err) => Err(AttemptError::Permanent {
            url,
            error: format!("request failed: {err}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::new(Duration::from_secs(5), 2)
    }

    #[tokio::test]
    async fn test_idempotent_request_is_retried_on_server_error() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let request = request();
        let url = format!("{}/flaky", server.url());
        let response = request
            .handle(request.req(Method::GET, &url), true)
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 503);
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_idempotent_request_is_sent_once() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", "/once")
            .with_status(502)
            .expect(1)
            .create_async()
            .await;

        let request = request();
        let url = format!("{}/once", server.url());
        let response = request
            .handle(request.req(Method::POST, &url).body("x=1"), false)
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 502);
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_sets_user_agent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ua")
            .match_header(
                "user-agent",
                format!("consultkit-core/{}", env!("CARGO_PKG_VERSION")).as_str(),
            )
            .with_status(200)
            .create_async()
            .await;

        let request = request();
        let url = format!("{}/ua", server.url());
        request
            .handle(request.req(Method::GET, &url), true)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_failure_is_network_error() {
        let request = Request::new(Duration::from_secs(1), 0);
        let err = request
            .handle(request.req(Method::GET, "http://127.0.0.1:9/unreachable"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsultKitError::Network { .. }));
    }
}
