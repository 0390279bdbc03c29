use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::http::{EndpointId, Parameters, RequestPipeline, Route};
use crate::{ConsultKitError, ConsultKitResult};

use super::{Clock, Token, TokenRefresher, TokenResponse};

/// Password and refresh-token grants against `oauth2/token`.
pub struct OAuthClient {
    pipeline: RequestPipeline,
    client_id: String,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl OAuthClient {
    /// `pipeline` must not carry an auth source: token requests are
    /// authenticated by their grant alone.
    #[must_use]
    pub fn new(pipeline: RequestPipeline, client_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            pipeline,
            client_id: client_id.into(),
            clock,
        }
    }

    /// Exchanges credentials for a token.
    ///
    /// # Errors
    /// Returns [`ConsultKitError::Http`] when the server rejects the
    /// credentials, or a transport or decode error.
    pub async fn login(&self, username: &str, password: &SecretString) -> ConsultKitResult<Token> {
        let mut params = self.grant("password");
        params.insert("username".to_string(), Value::from(username));
        params.insert("password".to_string(), Value::from(password.expose_secret()));
        self.exchange(EndpointId::Login, &params).await
    }

    fn grant(&self, grant_type: &str) -> Parameters {
        let mut params = Parameters::new();
        params.insert("grant_type".to_string(), Value::from(grant_type));
        params.insert("client_id".to_string(), Value::from(self.client_id.as_str()));
        params
    }

    async fn exchange(&self, endpoint: EndpointId, params: &Parameters) -> ConsultKitResult<Token> {
        let response: TokenResponse = self.pipeline.execute(&Route::new(endpoint), params).await?;
        Ok(response.into_token(self.clock.now_millis()))
    }
}

#[async_trait]
impl TokenRefresher for OAuthClient {
    async fn refresh(&self, expired: &Token) -> ConsultKitResult<Token> {
        let Some(refresh_token) = expired.refresh_token.as_deref() else {
            return Err(ConsultKitError::AuthExpired {
                reason: "no refresh token".to_string(),
            });
        };
        let mut params = self.grant("refresh_token");
        params.insert("refresh_token".to_string(), Value::from(refresh_token));

        let mut token = self.exchange(EndpointId::RefreshToken, &params).await?;
        if token.refresh_token.is_none() {
            token.refresh_token.clone_from(&expired.refresh_token);
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockito::Matcher;

    use super::*;
    use crate::session::{test_token, ManualClock};

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn client(server: &mockito::ServerGuard) -> OAuthClient {
        let pipeline = RequestPipeline::new(server.url(), Duration::from_secs(5), 0);
        OAuthClient::new(pipeline, "mobile-app", Arc::new(ManualClock::new(5_000)))
    }

    #[tokio::test]
    async fn test_password_grant() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "password".into()),
                Matcher::UrlEncoded("username".into(), "alice".into()),
                Matcher::UrlEncoded("password".into(), "p@ss word&more".into()),
                Matcher::UrlEncoded("client_id".into(), "mobile-app".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"token_type":"Bearer","access_token":"a1","refresh_token":"r1","expires_in":3600}"#)
            .create_async()
            .await;

        let token = client(&server)
            .login("alice", &secret("p@ss word&more"))
            .await
            .unwrap();

        assert_eq!(token.access_token, "a1");
        assert_eq!(token.refresh_token.as_deref(), Some("r1"));
        assert_eq!(token.issued_at, 5_000);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let err = client(&server)
            .login("alice", &secret("wrong"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ConsultKitError::Http {
                status: 400,
                detail: r#"{"error":"invalid_grant"}"#.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_omitted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "refresh-old".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"token_type":"Bearer","access_token":"new","expires_in":60}"#)
            .expect(1)
            .create_async()
            .await;

        let token = client(&server)
            .refresh(&test_token("old", 0, 0))
            .await
            .unwrap();

        assert_eq!(token.access_token, "new");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-old"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let server = mockito::Server::new_async().await;
        let mut expired = test_token("old", 0, 0);
        expired.refresh_token = None;

        let err = client(&server).refresh(&expired).await.unwrap_err();
        assert!(matches!(err, ConsultKitError::AuthExpired { .. }));
    }
}
