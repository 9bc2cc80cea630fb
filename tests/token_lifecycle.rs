//! Integration tests for the UAA token lifecycle using wiremock
//!
//! These verify that login happens once per session, that refresh triggers
//! only after the (margin-adjusted) expiry, and that auth failures surface
//! without a silent re-login.

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cfvault::cf::http::build_client;
use cfvault::{Error, UaaCredentials};

fn token_body(access: &str, refresh: &str, expires_in: u64) -> serde_json::Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "expires_in": expires_in,
    })
}

fn credentials(server: &MockServer) -> UaaCredentials {
    UaaCredentials::new(&server.uri(), "tester", "hunter2", build_client().unwrap())
}

/// Two calls inside the token lifetime issue exactly one login and no refresh
#[tokio::test]
async fn test_login_once_within_lifetime() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=tester"))
        .and(header("authorization", "Basic Y2Y6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t1", "r1", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t2", "r2", 3600)))
        .expect(0)
        .mount(&server)
        .await;

    let creds = credentials(&server);
    assert_eq!(creds.ensure_valid().await.unwrap(), "t1");
    assert_eq!(creds.ensure_valid().await.unwrap(), "t1");
}

/// A lifetime inside the 60s margin leaves the session already stale, so the
/// next call refreshes exactly once and keeps the new token
#[tokio::test]
async fn test_refresh_after_expiry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t1", "r1", 60)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t2", "r2", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let creds = credentials(&server);
    assert_eq!(creds.ensure_valid().await.unwrap(), "t1");
    // Past expiry: one refresh, then the renewed token is served from cache.
    assert_eq!(creds.ensure_valid().await.unwrap(), "t2");
    assert_eq!(creds.ensure_valid().await.unwrap(), "t2");
}

/// Rejected credentials surface as an authentication error
#[tokio::test]
async fn test_rejected_login() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "unauthorized",
            "error_description": "Bad credentials"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let creds = credentials(&server);
    match creds.ensure_valid().await {
        Err(Error::Authentication { status, .. }) => assert_eq!(status.as_u16(), 401),
        other => panic!("expected authentication error, got {:?}", other.map(|_| ())),
    }
}

/// A revoked refresh token fails the call; there is no fallback re-login
#[tokio::test]
async fn test_failed_refresh_does_not_relogin() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t1", "r1", 60)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_token",
            "error_description": "refresh token revoked"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let creds = credentials(&server);
    assert_eq!(creds.ensure_valid().await.unwrap(), "t1");
    assert!(matches!(
        creds.ensure_valid().await,
        Err(Error::Authentication { .. })
    ));
}

/// Invalidation drops the session and the next call performs a fresh login
#[tokio::test]
async fn test_invalidate_forces_login() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t1", "r1", 3600)))
        .expect(2)
        .mount(&server)
        .await;

    let creds = credentials(&server);
    assert_eq!(creds.ensure_valid().await.unwrap(), "t1");
    creds.invalidate().await;
    assert_eq!(creds.ensure_valid().await.unwrap(), "t1");
}
