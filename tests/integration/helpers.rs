//! Test helpers and utilities

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http_observer::config::{InterceptorConfig, ServerConfig};
use http_observer::core::BoxError;
use http_observer::observability::{RecordedSpan, RecordingBackend};
use http_observer::{Context, Handler, Interceptor, Request, ResponseWriter, Server};
use reqwest::{Client, Response, StatusCode};
use tokio::net::TcpListener;

/// Service name used for generated correlation IDs.
pub const SERVICE: &str = "customer";

/// Routes used across the tests:
///
/// - `/echo`: body and content type back as sent
/// - `/cards`: JSON containing a card number
/// - `/fail`: partial body, then an error
/// - `/panic`: partial body, then a panic
/// - `/span`: the handler's view of the active span, as JSON
/// - anything else: `ok`
pub struct TestHandler;

#[async_trait]
impl Handler for TestHandler {
    async fn handle(
        &self,
        req: Request,
        ctx: &mut Context,
        res: &mut ResponseWriter,
    ) -> Result<(), BoxError> {
        match req.path() {
            "/echo" => {
                if let Some(ct) = req.content_type() {
                    res.set_header("content-type", ct);
                }
                res.write(req.body());
                Ok(())
            }
            "/cards" => {
                res.set_header("content-type", "application/json");
                res.write(r#"{"card":"4111 1111 1111 1111","status":"charged"}"#);
                Ok(())
            }
            "/fail" => {
                res.write("partial");
                Err("ledger unavailable".into())
            }
            "/panic" => {
                res.write("before panic");
                panic!("handler exploded");
            }
            "/span" => {
                let view = serde_json::json!({
                    "trace_id": ctx.active_span().map(|s| s.trace_id.clone()),
                    "span_id": ctx.active_span().map(|s| s.span_id.clone()),
                    "correlation_id": ctx.correlation_id().map(|c| c.to_string()),
                });
                res.set_header("content-type", "application/json");
                res.write(serde_json::to_vec(&view)?);
                Ok(())
            }
            _ => {
                res.write("ok");
                Ok(())
            }
        }
    }
}

/// In-process server on 127.0.0.1 with an ephemeral port.
pub struct TestServer {
    pub base_url: String,
    pub client: Client,
    pub backend: Arc<RecordingBackend>,
    server: Arc<Server<TestHandler>>,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(InterceptorConfig::new(SERVICE)).await
    }

    pub async fn start_with(config: InterceptorConfig) -> Self {
        let backend = Arc::new(RecordingBackend::new());
        let interceptor = Interceptor::new(TestHandler, &config, backend.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr: SocketAddr = listener.local_addr().expect("No local address");

        let server = Arc::new(Server::new(
            ServerConfig {
                listen_addr: addr,
                header_timeout: Some(Duration::from_secs(5)),
            },
            interceptor,
        ));
        let runner = Arc::clone(&server);
        tokio::spawn(async move { runner.serve(listener).await });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: format!("http://{}", addr),
            client,
            backend,
            server,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> Response {
        let mut req = self.client.get(self.url(path));
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        req.send().await.expect("GET request failed")
    }

    pub async fn post(&self, path: &str, content_type: &str, body: impl Into<reqwest::Body>) -> Response {
        self.client
            .post(self.url(path))
            .header("content-type", content_type)
            .body(body)
            .send()
            .await
            .expect("POST request failed")
    }

    /// The one finished span for this test's requests.
    pub fn only_span(&self) -> RecordedSpan {
        let finished = self.backend.finished();
        assert_eq!(finished.len(), 1, "expected exactly one finished span, got {:?}", finished);
        finished.into_iter().next().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.trigger_shutdown();
    }
}

/// Assert that response has expected status
pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status()
    );
}

/// Assert that response contains header
pub fn assert_header(response: &Response, name: &str, expected: &str) {
    assert_eq!(header(response, name), expected, "Header '{}' mismatch", name);
}

/// Header value, panicking when absent.
pub fn header(response: &Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("Header '{}' not found", name))
        .to_str()
        .unwrap()
        .to_string()
}

/// Assert the generated correlation ID shape: `{service}-{14 digits}-{8 hex}`.
pub fn assert_generated_id(id: &str) {
    let rest = id
        .strip_prefix(&format!("{}-", SERVICE))
        .unwrap_or_else(|| panic!("'{}' lacks the service prefix", id));
    let (stamp, random) = rest
        .split_once('-')
        .unwrap_or_else(|| panic!("'{}' lacks a random suffix", id));
    assert_eq!(stamp.len(), 14, "timestamp part of '{}'", id);
    assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(random.len(), 8, "random part of '{}'", id);
    assert!(random.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
}
