//! Request and response bytes pass through the interceptor unchanged.

use crate::helpers::*;
use http_observer::config::InterceptorConfig;
use http_observer::observability::keys;
use reqwest::StatusCode;

#[tokio::test]
async fn test_json_body_round_trip() {
    let server = TestServer::start().await;
    let body = r#"{"name":"Ada","tags":["a","b"],"nested":{"n":1}}"#;
    let resp = server.post("/echo", "application/json", body).await;

    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "content-type", "application/json");
    assert_eq!(resp.text().await.unwrap(), body);
}

#[tokio::test]
async fn test_binary_body_round_trip() {
    let server = TestServer::start().await;
    let body: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();
    let resp = server
        .post("/echo", "application/octet-stream", body.clone())
        .await;

    assert_status(&resp, StatusCode::OK);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), body.as_slice());
}

#[tokio::test]
async fn test_card_numbers_reach_client_unredacted() {
    let server = TestServer::start().await;
    let resp = server.get("/cards").await;

    let text = resp.text().await.unwrap();
    assert!(text.contains("4111 1111 1111 1111"));

    let span = server.only_span();
    let snapshot = span.str_attribute(keys::HTTP_RESPONSE).unwrap();
    assert!(snapshot.contains("4111-XXXX-XXXX-1111"), "{}", snapshot);
    assert!(!snapshot.contains("4111 1111 1111 1111"));
}

#[tokio::test]
async fn test_request_snapshot_redacted() {
    let server = TestServer::start().await;
    let body = r#"{"card":"4111111111111111"}"#;
    let resp = server.post("/echo", "application/json", body).await;
    assert_eq!(resp.text().await.unwrap(), body);

    let span = server.only_span();
    let snapshot = span.str_attribute(keys::HTTP_REQUEST).unwrap();
    assert!(snapshot.starts_with("Method: POST, Path: /echo, Headers: "), "{}", snapshot);
    assert!(snapshot.contains("Body: {\"card\":\"4111-XXXX-XXXX-1111\"}"), "{}", snapshot);
}

#[tokio::test]
async fn test_large_body_truncated_in_snapshot_only() {
    let mut config = InterceptorConfig::new(SERVICE);
    config.max_inspect_bytes = 16;
    let server = TestServer::start_with(config).await;

    let body = "x".repeat(1000);
    let resp = server.post("/echo", "text/plain", body.clone()).await;
    assert_eq!(resp.text().await.unwrap(), body);

    let span = server.only_span();
    let snapshot = span.str_attribute(keys::HTTP_REQUEST).unwrap();
    assert!(snapshot.ends_with("Body: xxxxxxxxxxxxxxxx...[truncated]"), "{}", snapshot);
}
