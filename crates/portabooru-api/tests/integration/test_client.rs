//! Integration tests for the authenticated client
//!
//! - Credential verification against `/profile.json`
//! - Basic auth on every request
//! - Status classification (401, 429 with Retry-After, 5xx, malformed JSON)

use std::sync::Arc;
use std::time::Duration;

use portabooru_api::client::BooruClient;
use portabooru_api::rate_limit::{RateLimitConfig, RateLimiter};
use portabooru_api::ApiError;
use wiremock::matchers::{basic_auth, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_verify_credentials_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile.json"))
        .and(basic_auth(common::LOGIN, common::API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 42,
            "name": common::LOGIN,
            "level_string": "Member"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = BooruClient::with_base_url(common::credentials(), server.uri());
    let profile = client
        .verify_credentials()
        .await
        .expect("credentials should be accepted");

    assert_eq!(profile.id, 42);
    assert_eq!(profile.name, common::LOGIN);
}

#[tokio::test]
async fn test_verify_credentials_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile.json"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({
                    "success": false,
                    "message": "SessionLoader::AuthenticationFailure"
                })),
        )
        .mount(&server)
        .await;

    let client = BooruClient::with_base_url(common::credentials(), server.uri());
    let err = client.verify_credentials().await.unwrap_err();

    match err {
        ApiError::Unauthorized(message) => assert!(message.contains("AuthenticationFailure")),
        other => panic!("expected Unauthorized, got {other:?}"),
    }
}

#[tokio::test]
async fn test_429_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile.json"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "3"))
        .mount(&server)
        .await;

    let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        burst: 8,
        requests_per_second: 100.0,
    }));
    let client = BooruClient::with_base_url(common::credentials(), server.uri())
        .with_rate_limiter(limiter.clone());

    let err = client.verify_credentials().await.unwrap_err();
    match err {
        ApiError::TooManyRequests { retry_after } => {
            assert_eq!(retry_after, Some(Duration::from_secs(3)))
        }
        other => panic!("expected TooManyRequests, got {other:?}"),
    }
    // The shared limiter backs off after a throttle
    assert_eq!(limiter.effective_capacity(), 4);
}

#[tokio::test]
async fn test_server_error_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile.json"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = BooruClient::with_base_url(common::credentials(), server.uri());
    let err = client.verify_credentials().await.unwrap_err();
    assert!(matches!(err, ApiError::ServerError { status: 503, .. }));
}

#[tokio::test]
async fn test_malformed_json_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>captcha</html>"))
        .mount(&server)
        .await;

    let client = BooruClient::with_base_url(common::credentials(), server.uri());
    let err = client.verify_credentials().await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Nothing listens on this server once it is dropped
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };

    let client = BooruClient::with_base_url(common::credentials(), uri);
    let err = client.verify_credentials().await.unwrap_err();
    assert!(matches!(err, ApiError::NetworkError(_)));
}
