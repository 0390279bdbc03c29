//! Pipeline integration tests.
mod common;

use std::collections::HashMap;

use mockito::Matcher;
use serde_json::json;

use common::{harness, mock_login};
use consultkit_core::http::EndpointId;
use consultkit_core::web::{DeviceInfo, WebSurface};
use consultkit_core::ConsultKitError;

#[tokio::test]
async fn test_array_parameters_expand_in_query() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, "access-1", 3600).await;
    let list = server
        .mock("GET", "/patient/consultations")
        .match_query(Matcher::Exact("status=1&status=2".to_string()))
        .with_status(200)
        .with_body(r#"{"count":1,"results":[{"id":3}]}"#)
        .create_async()
        .await;
    let h = harness(&server);
    h.client.login("alice", "secret").await.unwrap();

    let body = h
        .client
        .request_json(
            EndpointId::ListConsultations,
            HashMap::new(),
            r#"{"status":[1,2]}"#,
        )
        .await
        .unwrap();

    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["results"][0]["id"], json!(3));
    list.assert_async().await;
}

#[tokio::test]
async fn test_duplicate_patient_is_a_conflict() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, "access-1", 3600).await;
    server
        .mock("POST", "/patient/patients")
        .match_body(Matcher::Json(json!({"first_name": "Ana", "last_name": "Lopez"})))
        .with_status(409)
        .with_body(r#"{"detail":"duplicate patient"}"#)
        .create_async()
        .await;
    let h = harness(&server);
    h.client.login("alice", "secret").await.unwrap();

    let err = h
        .client
        .request_json(
            EndpointId::CreatePatient,
            HashMap::new(),
            r#"{"first_name":"Ana","last_name":"Lopez","notes":null}"#,
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ConsultKitError::Conflict {
            detail: "duplicate patient".to_string()
        }
    );
}

#[tokio::test]
async fn test_missing_path_argument() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, "access-1", 3600).await;
    let h = harness(&server);
    h.client.login("alice", "secret").await.unwrap();

    let err = h
        .client
        .request_json(EndpointId::UpdatePatient, HashMap::new(), "{}")
        .await
        .unwrap_err();
    assert!(matches!(err, ConsultKitError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_unauthenticated_request() {
    let server = mockito::Server::new_async().await;
    let h = harness(&server);

    let err = h
        .client
        .request_json(EndpointId::ListPatients, HashMap::new(), "")
        .await
        .unwrap_err();
    assert_eq!(err, ConsultKitError::NotAuthenticated);
}

#[tokio::test]
async fn test_web_surface_url_carries_session() {
    let mut server = mockito::Server::new_async().await;
    mock_login(&mut server, "access-1", 3600).await;
    let h = harness(&server);
    h.client.login("alice", "secret").await.unwrap();

    let url = h
        .client
        .web_surface_url(
            WebSurface::ConsultationSummary { consultation_id: 8 },
            DeviceInfo {
                platform: "android".to_string(),
                os_version: "14".to_string(),
                idiom: "phone".to_string(),
            },
        )
        .await
        .unwrap();

    assert!(url.starts_with(
        "https://app.test.consultkit.app/consultations/8/summary?access_token=access-1&expires_in=3600"
    ));
    assert!(url.contains("&platform=android&os_version=14&idiom=phone&"));
}
