//! Span ownership: one span per request, parented by an inbound traceparent.

use crate::helpers::*;
use http_observer::observability::{keys, AttributeValue};

#[tokio::test]
async fn test_one_span_per_request() {
    let server = TestServer::start().await;
    let resp = server.get("/orders?page=2").await;
    let traceparent = header(&resp, "traceparent");
    let _ = resp.text().await.unwrap();

    let span = server.only_span();
    assert_eq!(span.name, "GET /orders");
    assert!(span.is_ended());
    assert_eq!(traceparent, span.context.to_traceparent());
    assert_eq!(
        span.attribute(keys::HTTP_STATUS_CODE),
        Some(&AttributeValue::Int(200))
    );
    let request = span.str_attribute(keys::HTTP_REQUEST).unwrap();
    assert!(request.contains("Query: ?page=2"), "{}", request);
    assert!(server.backend.live().is_empty());
}

#[tokio::test]
async fn test_handler_sees_owned_span() {
    let server = TestServer::start().await;
    let resp = server.get("/span").await;
    let view: serde_json::Value = resp.json().await.unwrap();

    let span = server.only_span();
    assert_eq!(view["span_id"], span.context.span_id.as_str());
    assert_eq!(view["trace_id"], span.context.trace_id.as_str());
}

#[tokio::test]
async fn test_inbound_traceparent_is_parent() {
    let server = TestServer::start().await;
    let parent = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";
    let resp = server.get_with_headers("/", &[("traceparent", parent)]).await;
    assert_eq!(resp.text().await.unwrap(), "ok");

    let span = server.only_span();
    assert_eq!(span.context.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
    assert_eq!(span.context.parent_span_id.as_deref(), Some("00f067aa0ba902b7"));
    assert_ne!(span.context.span_id, "00f067aa0ba902b7");
}

#[tokio::test]
async fn test_failed_request_span_tagged() {
    let server = TestServer::start().await;
    let resp = server.get("/fail").await;
    assert_eq!(resp.text().await.unwrap(), "partial");

    let span = server.only_span();
    assert!(span.is_ended());
    assert_eq!(span.attribute(keys::ERROR), Some(&AttributeValue::Bool(true)));
    assert_eq!(span.str_attribute(keys::ERROR_MESSAGE), Some("ledger unavailable"));
}

#[tokio::test]
async fn test_backend_outage_does_not_fail_requests() {
    let server = TestServer::start().await;
    server.backend.set_available(false);

    let resp = server
        .get_with_headers("/", &[("x-correlation-id", "outage-1")])
        .await;
    assert_header(&resp, "x-correlation-id", "outage-1");
    assert!(resp.headers().get("traceparent").is_none());
    assert_eq!(resp.text().await.unwrap(), "ok");
    assert!(server.backend.finished().is_empty());
}
