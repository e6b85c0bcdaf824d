//! Correlation ID propagation: echo, generation, uniqueness.

use crate::helpers::*;
use http_observer::observability::keys;
use reqwest::StatusCode;
use std::collections::HashSet;

#[tokio::test]
async fn test_inbound_id_is_echoed() {
    let server = TestServer::start().await;
    let resp = server
        .get_with_headers("/", &[("X-Correlation-ID", "abc-123")])
        .await;

    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "x-correlation-id", "abc-123");

    let span = server.only_span();
    assert_eq!(span.str_attribute(keys::CORRELATION_ID), Some("abc-123"));
}

#[tokio::test]
async fn test_missing_id_is_generated() {
    let server = TestServer::start().await;
    let resp = server.get("/").await;

    let id = header(&resp, "x-correlation-id");
    assert_generated_id(&id);
    assert_eq!(server.only_span().str_attribute(keys::CORRELATION_ID), Some(id.as_str()));
}

#[tokio::test]
async fn test_handler_sees_same_id() {
    let server = TestServer::start().await;
    let resp = server
        .get_with_headers("/span", &[("x-correlation-id", "order-42")])
        .await;

    assert_header(&resp, "x-correlation-id", "order-42");
    let view: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(view["correlation_id"], "order-42");
}

#[tokio::test]
async fn test_generated_ids_are_unique() {
    let server = TestServer::start().await;
    let responses = futures_util::future::join_all((0..20).map(|_| server.get("/"))).await;

    let ids: HashSet<String> = responses
        .iter()
        .map(|r| header(r, "x-correlation-id"))
        .collect();
    assert_eq!(ids.len(), 20);
    assert_eq!(server.backend.finished().len(), 20);
}

#[tokio::test]
async fn test_id_present_on_error_responses() {
    let server = TestServer::start().await;

    let resp = server
        .get_with_headers("/fail", &[("x-correlation-id", "fail-1")])
        .await;
    assert_status(&resp, StatusCode::INTERNAL_SERVER_ERROR);
    assert_header(&resp, "x-correlation-id", "fail-1");

    let resp = server.get("/panic").await;
    assert_status(&resp, StatusCode::INTERNAL_SERVER_ERROR);
    assert_generated_id(&header(&resp, "x-correlation-id"));
}
