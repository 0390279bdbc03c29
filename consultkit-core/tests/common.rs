#![allow(dead_code, missing_docs)]

//! Common test utilities shared across integration tests.

use std::sync::Arc;

use consultkit_core::session::ManualClock;
use consultkit_core::vault::memory::{InMemoryBlobStore, InMemorySecureKeyStore};
use consultkit_core::{ClientConfig, ConsultClient, Environment};

pub const NOW: u64 = 1_700_000_000_000;
pub const CLIENT_ID: &str = "consult-mobile";

pub struct Harness {
    pub client: ConsultClient,
    pub clock: Arc<ManualClock>,
    pub key_store: Arc<InMemorySecureKeyStore>,
    pub blob_store: Arc<InMemoryBlobStore>,
}

pub fn config(server: &mockito::ServerGuard) -> ClientConfig {
    let mut config = ClientConfig::from_environment(Environment::Staging, CLIENT_ID);
    config.api_base_url = Some(server.url());
    config.web_base_url = Some("https://app.test.consultkit.app".to_string());
    config.max_retries = 0;
    config
}

pub fn harness(server: &mockito::ServerGuard) -> Harness {
    let clock = Arc::new(ManualClock::new(NOW));
    let key_store = Arc::new(InMemorySecureKeyStore::new());
    let blob_store = Arc::new(InMemoryBlobStore::new());
    let client = ConsultClient::with_clock(
        config(server),
        key_store.clone(),
        blob_store.clone(),
        clock.clone(),
    )
    .expect("client");
    Harness {
        client,
        clock,
        key_store,
        blob_store,
    }
}

/// Reopens the stores of `harness` with a fresh client, as after an app restart.
pub fn reopen(server: &mockito::ServerGuard, harness: &Harness) -> ConsultClient {
    ConsultClient::with_clock(
        config(server),
        harness.key_store.clone(),
        harness.blob_store.clone(),
        harness.clock.clone(),
    )
    .expect("client")
}

pub fn token_body(access_token: &str, refresh_token: Option<&str>, expires_in: u64) -> String {
    let mut body = serde_json::json!({
        "token_type": "Bearer",
        "access_token": access_token,
        "expires_in": expires_in,
        "scope": "read write",
    });
    if let Some(refresh_token) = refresh_token {
        body["refresh_token"] = refresh_token.into();
    }
    body.to_string()
}

pub async fn mock_login(
    server: &mut mockito::ServerGuard,
    access_token: &str,
    expires_in: u64,
) -> mockito::Mock {
    server
        .mock("POST", "/oauth2/token")
        .match_body(mockito::Matcher::UrlEncoded(
            "grant_type".into(),
            "password".into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(token_body(access_token, Some("refresh-1"), expires_in))
        .create_async()
        .await
}
