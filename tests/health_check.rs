//! Integration tests for the health endpoint

use std::net::TcpListener;
use std::sync::Arc;

use session_keeper::auth::{InMemoryRefreshTokenStore, InMemorySubjectDirectory, RefreshTokenService};
use session_keeper::clock::SystemClock;
use session_keeper::configuration::{JwtSettings, RefreshPolicy};
use session_keeper::startup::run;

fn spawn_app() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let jwt = JwtSettings {
        secret: "test-secret-key-at-least-32-characters-long".to_string(),
        issuer: "test".to_string(),
        access_token_ttl_ms: 900_000,
        refresh_token_ttl_seconds: 3600,
        refresh_policy: RefreshPolicy::Reuse,
    };
    let service = RefreshTokenService::from_settings(
        &jwt,
        Arc::new(InMemoryRefreshTokenStore::new()),
        Arc::new(InMemorySubjectDirectory::new()),
        Arc::new(SystemClock),
    );

    let server = run(listener, service).expect("Failed to create server");
    let _ = tokio::spawn(server);

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn request_id_is_echoed() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .header("x-request-id", "trace-me-123")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "trace-me-123"
    );
}
