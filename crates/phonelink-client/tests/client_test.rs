//! Retry and classification behavior of the API client against a mock server.
//!
//! All waits go through a `TestClock`, so elapsed virtual time is asserted
//! exactly while the tests run without real sleeps.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use phonelink_client::{ApiClient, ClientConfig, RequestOptions, RetryPolicy};
use phonelink_core::{ApiError, ErrorKind, TestClock};
use serde_json::{json, Value};
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn client(server: &MockServer, clock: &TestClock) -> Result<ApiClient> {
    Ok(ApiClient::new(ClientConfig::with_base_url(server.uri()), Arc::new(clock.clone()))?)
}

/// A request that keeps failing with 503 is attempted maxRetries + 1 times.
#[tokio::test]
async fn persistent_503_exhausts_retries() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/phone/users/me/call_logs"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "message": "unavailable" })))
        .expect(4)
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let client = client(&server, &clock)?;

    let err = client
        .get::<Value>("/phone/users/me/call_logs", &RequestOptions::default())
        .await
        .expect_err("should fail");

    assert_eq!(err, ApiError::server("unavailable", 503));
    // 1s + 2s + 4s of backoff
    assert_eq!(clock.total_slept(), Duration::from_secs(7));

    Ok(())
}

/// Retry-After replaces exponential backoff for a 429.
#[tokio::test]
async fn rate_limit_waits_retry_after() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let client = client(&server, &clock)?;

    let body: Value = client.get("/limited", &RequestOptions::default()).await?;

    assert_eq!(body, json!({ "ok": true }));
    assert_eq!(clock.total_slept(), Duration::from_secs(2));

    Ok(())
}

/// A zero Retry-After does not retry immediately; backoff applies instead.
#[tokio::test]
async fn zero_retry_after_uses_backoff() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let client = client(&server, &clock)?;

    let body: Value = client.get("/limited", &RequestOptions::default()).await?;

    assert_eq!(body, json!({ "ok": true }));
    assert_eq!(clock.total_slept(), Duration::from_secs(1));

    Ok(())
}

/// Exhausted 429s classify as RateLimited with the header value.
#[tokio::test]
async fn exhausted_rate_limit_is_classified() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "5")
                .set_body_json(json!({ "message": "Too many requests" })),
        )
        .expect(4)
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let client = client(&server, &clock)?;

    let err = client.get::<Value>("/busy", &RequestOptions::default()).await.expect_err("should fail");

    assert_eq!(err, ApiError::rate_limited("Too many requests", 5));
    assert_eq!(clock.total_slept(), Duration::from_secs(15));

    Ok(())
}

/// Non-retryable statuses return on the first attempt.
#[tokio::test]
async fn client_errors_are_not_retried() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/phone/users/me/call_logs/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not found" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/forbidden"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "Insufficient scopes",
            "required_scopes": ["phone:read:list_recordings"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let client = client(&server, &clock)?;

    let not_found = client
        .get::<Value>("/phone/users/me/call_logs/missing", &RequestOptions::default())
        .await
        .expect_err("should fail");
    assert_eq!(not_found.kind(), ErrorKind::NotFound);

    let forbidden = client.get::<Value>("/forbidden", &RequestOptions::default()).await.expect_err("should fail");
    assert_eq!(
        forbidden,
        ApiError::permission("Insufficient scopes", Some(vec!["phone:read:list_recordings".into()]))
    );

    assert_eq!(clock.total_slept(), Duration::ZERO);

    Ok(())
}

/// A zero-retry policy surfaces the first 503 directly.
#[tokio::test]
async fn no_retry_policy_fails_fast() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(503)).expect(1).mount(&server).await;

    let clock = TestClock::new();
    let config = ClientConfig { retry_policy: RetryPolicy::no_retry(), ..ClientConfig::with_base_url(server.uri()) };
    let client = ApiClient::new(config, Arc::new(clock.clone()))?;

    let err = client.get::<Value>("/x", &RequestOptions::default()).await.expect_err("should fail");

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.status_code(), Some(503));

    Ok(())
}

/// Bearer token, query parameters and JSON body reach the server.
#[tokio::test]
async fn sends_bearer_query_and_body() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(header("authorization", "Bearer AT1"))
        .and(query_param("page_size", "50"))
        .and(body_json(json!({ "name": "test" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "new" })))
        .expect(1)
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let client = client(&server, &clock)?;
    client.set_auth_token("AT1");

    let created: Value = client
        .post("/echo", &json!({ "name": "test" }), &RequestOptions::default().query("page_size", 50))
        .await?;

    assert_eq!(created["id"], "new");

    Ok(())
}

/// A 2xx body that does not decode is a server error carrying the status.
#[tokio::test]
async fn undecodable_success_body_is_server_error() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let client = client(&server, &clock)?;

    let err = client.get::<Value>("/bad", &RequestOptions::default()).await.expect_err("should fail");

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.status_code(), Some(200));

    Ok(())
}

/// A refused connection is a network error and is not retried.
#[tokio::test]
async fn connection_failure_is_network_error() -> Result<()> {
    let clock = TestClock::new();
    let client = ApiClient::new(ClientConfig::with_base_url("http://127.0.0.1:1"), Arc::new(clock.clone()))?;

    let err = client.get::<Value>("/x", &RequestOptions::default()).await.expect_err("should fail");

    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(clock.total_slept(), Duration::ZERO);

    Ok(())
}

/// Downloads return raw bytes and the content type.
#[tokio::test]
async fn download_returns_bytes() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/phone/recording/download/rec1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8, 2, 3], "audio/mpeg"))
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let client = client(&server, &clock)?;

    let download = client.download("/phone/recording/download/rec1", &RequestOptions::default()).await?;

    assert_eq!(download.bytes.to_vec(), vec![1u8, 2, 3]);
    assert_eq!(download.content_type.as_deref(), Some("audio/mpeg"));

    Ok(())
}
