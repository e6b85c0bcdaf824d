//! Handler failures surface as 500s carrying what the handler wrote.

use crate::helpers::*;
use reqwest::StatusCode;

#[tokio::test]
async fn test_handler_error_keeps_partial_body() {
    let server = TestServer::start().await;
    let resp = server.get("/fail").await;

    assert_status(&resp, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.text().await.unwrap(), "partial");
}

#[tokio::test]
async fn test_panic_keeps_partial_body() {
    let server = TestServer::start().await;
    let resp = server.get("/panic").await;

    assert_status(&resp, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.text().await.unwrap(), "before panic");

    let span = server.only_span();
    assert!(span.is_ended());
    assert!(server.backend.live().is_empty());
}

#[tokio::test]
async fn test_server_keeps_serving_after_failures() {
    let server = TestServer::start().await;
    let _ = server.get("/panic").await;
    let _ = server.get("/fail").await;

    let resp = server.get("/").await;
    assert_status(&resp, StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");
    assert_eq!(server.backend.finished().len(), 3);
}
