//! Request/response body capture.
//!
//! Requests are buffered once into immutable [`Bytes`]; inspection reads a
//! copy of the text and the handler still reads the full body from byte 0.
//!
//! Responses are written by the handler into an owned in-memory
//! [`ResponseWriter`]. After the handler returns (or fails), the buffered
//! status, headers and bytes are copied verbatim to the real output, a
//! [`ResponseSink`]. If the capture is dropped without flushing (cancelled
//! request), the buffer is simply freed.

use std::fmt;
use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Body;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::core::{BoxError, Request, ResponseWriter};
use crate::redact::Redactor;

/// Appended to inspected text cut at the inspection limit.
pub const TRUNCATED_MARKER: &str = "...[truncated]";

/// Stands in for a body excluded from snapshots.
pub const OMITTED_BODY: &str = "[omitted]";

/// Default inspection limit (64 KiB).
pub const DEFAULT_MAX_INSPECT_BYTES: usize = 64 * 1024;

/// Inspection settings for one direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Inspection {
    pub enabled: bool,
    pub max_bytes: usize,
}

impl Inspection {
    /// Text form of `body` for snapshots.
    ///
    /// Lossy UTF-8 of about `max_bytes` bytes, plus [`TRUNCATED_MARKER`]
    /// when cut. A cut inside a run of digits, spaces and hyphens moves
    /// forward (at most [`CUT_SLACK`] bytes) so a card number is never split
    /// below the length the redactor recognizes. Never touches the body itself.
    pub fn text(&self, body: &[u8]) -> String {
        if !self.enabled {
            return OMITTED_BODY.to_string();
        }
        let cut = extend_cut(body, self.max_bytes);
        if cut >= body.len() {
            return String::from_utf8_lossy(body).into_owned();
        }
        let mut text = String::from_utf8_lossy(&body[..cut]).into_owned();
        text.push_str(TRUNCATED_MARKER);
        text
    }
}

/// Longest card number (16 digits, 3 separators) minus one.
pub const CUT_SLACK: usize = 18;

#[inline]
fn is_card_byte(b: u8) -> bool {
    b.is_ascii_digit() || b == b' ' || b == b'-'
}

/// Move a cut at `at` past the digit/separator run it falls in.
fn extend_cut(body: &[u8], at: usize) -> usize {
    if at == 0 || at >= body.len() || !is_card_byte(body[at - 1]) {
        return at;
    }
    let limit = (at + CUT_SLACK).min(body.len());
    let mut cut = at;
    while cut < limit && is_card_byte(body[cut]) {
        cut += 1;
    }
    cut
}

impl Default for Inspection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: DEFAULT_MAX_INSPECT_BYTES,
        }
    }
}

/// Captures request and response bodies for inspection.
#[derive(Clone, Copy, Debug, Default)]
pub struct BodyCapture {
    request: Inspection,
    response: Inspection,
}

impl BodyCapture {
    pub fn new(request: Inspection, response: Inspection) -> Self {
        Self { request, response }
    }

    /// Same limit in both directions.
    pub fn with_limit(max_bytes: usize) -> Self {
        let inspection = Inspection {
            enabled: true,
            max_bytes,
        };
        Self::new(inspection, inspection)
    }

    #[inline]
    pub fn request_inspection(&self) -> Inspection {
        self.request
    }

    #[inline]
    pub fn response_inspection(&self) -> Inspection {
        self.response
    }

    /// Read a streaming body to completion.
    ///
    /// The full body is kept regardless of the inspection limit.
    pub async fn buffer_request<B>(req: http::Request<B>) -> Result<Request, BoxError>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let collected = match body.collect().await {
            Ok(collected) => collected,
            Err(e) => return Err(e.into()),
        };
        Ok(Request::from(http::Request::from_parts(
            parts,
            collected.to_bytes(),
        )))
    }

    /// Text for inspection plus the request, untouched.
    ///
    /// The body is shared, immutable bytes: inspecting it does not advance
    /// any cursor the handler will use.
    pub fn capture_request(&self, req: Request) -> (String, Request) {
        let text = self.request.text(req.body());
        (text, req)
    }

    /// Start buffering a response.
    pub fn capture_response(&self) -> ResponseCapture {
        ResponseCapture {
            writer: ResponseWriter::new(),
            inspection: self.response,
        }
    }
}

/// Owned response buffer the handler writes into.
#[derive(Debug)]
pub struct ResponseCapture {
    writer: ResponseWriter,
    inspection: Inspection,
}

impl ResponseCapture {
    /// The buffer handed to the handler.
    #[inline]
    pub fn writer(&mut self) -> &mut ResponseWriter {
        &mut self.writer
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.writer.status()
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        self.writer.headers()
    }

    /// Bytes the handler has written so far.
    #[inline]
    pub fn body(&self) -> &[u8] {
        self.writer.body()
    }

    /// Text form of the buffered body for snapshots.
    pub fn inspect_body(&self) -> String {
        self.inspection.text(self.writer.body())
    }

    /// Copy everything buffered to `sink` and release the buffer.
    ///
    /// Status is copied, each buffered header name replaces the sink's values
    /// for that name, then the body goes out verbatim. An empty body performs
    /// no write at all. Returns the number of body bytes written.
    pub async fn flush<S>(self, sink: &mut S) -> io::Result<u64>
    where
        S: ResponseSink + ?Sized,
    {
        let (status, headers, body) = self.writer.into_parts();

        sink.set_status(status);
        let target = sink.headers_mut();
        for name in headers.keys() {
            target.remove(name);
            for value in headers.get_all(name) {
                target.append(name.clone(), value.clone());
            }
        }

        if body.is_empty() {
            return Ok(0);
        }
        let len = body.len() as u64;
        sink.write_body(body).await?;
        Ok(len)
    }
}

/// The real output a buffered response is flushed to.
#[async_trait]
pub trait ResponseSink: Send {
    fn set_status(&mut self, status: StatusCode);

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Write body bytes in order.
    async fn write_body(&mut self, chunk: Bytes) -> io::Result<()>;
}

#[async_trait]
impl ResponseSink for ResponseWriter {
    fn set_status(&mut self, status: StatusCode) {
        ResponseWriter::set_status(self, status);
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        ResponseWriter::headers_mut(self)
    }

    async fn write_body(&mut self, chunk: Bytes) -> io::Result<()> {
        self.write(&chunk);
        Ok(())
    }
}

/// Sink over raw async I/O.
///
/// Only body bytes reach the writer; status and headers are kept for the
/// caller to frame however the transport needs.
pub struct StreamSink<W> {
    status: StatusCode,
    headers: HeaderMap,
    inner: W,
}

impl<W> StreamSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(inner: W) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            inner,
        }
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W> ResponseSink for StreamSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    async fn write_body(&mut self, chunk: Bytes) -> io::Result<()> {
        self.inner.write_all(&chunk).await?;
        self.inner.flush().await
    }
}

// =============================================================================
// Snapshots
// =============================================================================

/// Redacted rendering of a request, attached to the span as `http.request`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSnapshot(String);

impl RequestSnapshot {
    /// `Method: {m}, Path: {p}, Headers: {h}, Query: {?q}, Body: {b}`
    pub fn new(req: &Request, body_text: &str, redactor: &Redactor) -> Self {
        let query = match req.query() {
            Some(q) => format!("?{}", redactor.scan(q)),
            None => String::new(),
        };
        Self(format!(
            "Method: {}, Path: {}, Headers: {}, Query: {}, Body: {}",
            req.method(),
            redactor.scan(req.path()),
            redactor.scan_headers(req.headers()),
            query,
            redactor.scan(body_text),
        ))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RequestSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Redacted rendering of a response, attached to the span as `http.response`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseSnapshot(String);

impl ResponseSnapshot {
    /// `Status: {code}, Headers: {h}, Body: {b}`
    pub fn new(status: StatusCode, headers: &HeaderMap, body_text: &str, redactor: &Redactor) -> Self {
        Self(format!(
            "Status: {}, Headers: {}, Body: {}",
            status.as_u16(),
            redactor.scan_headers(headers),
            redactor.scan(body_text),
        ))
    }

    /// Snapshot of whatever `capture` has buffered.
    pub fn of(capture: &ResponseCapture, redactor: &Redactor) -> Self {
        Self::new(
            capture.status(),
            capture.headers(),
            &capture.inspect_body(),
            redactor,
        )
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResponseSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, Method};
    use http_body_util::{Full, StreamBody};
    use hyper::body::Frame;
    use tokio::io::AsyncReadExt;

    fn request(uri: &str, body: &'static [u8]) -> Request {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        Request::new(
            Method::POST,
            uri.parse().unwrap(),
            headers,
            Bytes::from_static(body),
        )
    }

    #[test]
    fn test_capture_request_keeps_body() {
        let capture = BodyCapture::default();
        let (text, req) = capture.capture_request(request("/pay", b"{\"amount\":10}"));
        assert_eq!(text, "{\"amount\":10}");
        assert_eq!(req.body().as_ref(), b"{\"amount\":10}");
    }

    #[test]
    fn test_capture_empty_request() {
        let (text, req) = BodyCapture::default().capture_request(request("/", b""));
        assert_eq!(text, "");
        assert!(req.body().is_empty());
    }

    #[tokio::test]
    async fn test_truncated_inspection_leaves_body_whole() {
        let body: &'static [u8] = b"abcdefghijklmnop";
        let capture = BodyCapture::with_limit(4);
        let (text, req) = capture.capture_request(request("/big", body));

        assert_eq!(text, format!("abcd{TRUNCATED_MARKER}"));

        let mut read = Vec::new();
        req.body_reader().read_to_end(&mut read).await.unwrap();
        assert_eq!(read, body);
    }

    #[test]
    fn test_cut_inside_card_number_keeps_it_whole() {
        let redactor = Redactor::card_numbers();
        let limited = Inspection {
            enabled: true,
            max_bytes: 10,
        };

        let text = limited.text(b"card=4532 1234 5678 9012&cvv=123");
        assert_eq!(text, format!("card=4532 1234 5678 9012{TRUNCATED_MARKER}"));
        assert_eq!(
            redactor.scan(&text),
            format!("card=4532-XXXX-XXXX-9012{TRUNCATED_MARKER}")
        );

        // The whole body fits once the cut moves: no marker.
        let text = limited.text(b"4532123456789012");
        assert_eq!(redactor.scan(&text), "4532-XXXX-XXXX-9012");
    }

    #[test]
    fn test_cut_slack_is_bounded() {
        let body = vec![b'7'; 100];
        let text = Inspection {
            enabled: true,
            max_bytes: 10,
        }
        .text(&body);
        assert_eq!(text.len(), 10 + CUT_SLACK + TRUNCATED_MARKER.len());
    }

    #[test]
    fn test_disabled_inspection_omits_body() {
        let capture = BodyCapture::new(
            Inspection {
                enabled: false,
                max_bytes: 1024,
            },
            Inspection::default(),
        );
        let (text, req) = capture.capture_request(request("/", b"secret"));
        assert_eq!(text, OMITTED_BODY);
        assert_eq!(req.body().as_ref(), b"secret");
    }

    #[test]
    fn test_inspection_non_utf8_is_lossy() {
        let text = Inspection::default().text(&[b'o', b'k', 0xff]);
        assert_eq!(text, "ok\u{fffd}");
    }

    #[tokio::test]
    async fn test_buffer_request_from_stream() {
        let chunks: Vec<Result<Frame<Bytes>, std::io::Error>> = vec![
            Ok(Frame::data(Bytes::from_static(b"hello "))),
            Ok(Frame::data(Bytes::from_static(b"world"))),
        ];
        let body = StreamBody::new(futures_util::stream::iter(chunks));
        let http_req = http::Request::post("/stream").body(body).unwrap();

        let req = BodyCapture::buffer_request(http_req).await.unwrap();
        assert_eq!(req.path(), "/stream");
        assert_eq!(req.body().as_ref(), b"hello world");
    }

    #[tokio::test]
    async fn test_buffer_request_error() {
        let chunks: Vec<Result<Frame<Bytes>, std::io::Error>> = vec![
            Ok(Frame::data(Bytes::from_static(b"partial"))),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let body = StreamBody::new(futures_util::stream::iter(chunks));
        let http_req = http::Request::post("/stream").body(body).unwrap();

        let err = BodyCapture::buffer_request(http_req).await.unwrap_err();
        assert!(err.to_string().contains("reset"));
    }

    #[tokio::test]
    async fn test_buffer_full_body() {
        let http_req = http::Request::get("/")
            .body(Full::new(Bytes::from_static(b"abc")))
            .unwrap();
        let req = BodyCapture::buffer_request(http_req).await.unwrap();
        assert_eq!(req.body().as_ref(), b"abc");
    }

    #[tokio::test]
    async fn test_flush_is_byte_exact() {
        let mut capture = BodyCapture::default().capture_response();
        capture.writer().write("part one, ");
        capture.writer().write("part two");

        let mock = tokio_test::io::Builder::new()
            .write(b"part one, part two")
            .build();
        let mut sink = StreamSink::new(mock);

        let written = capture.flush(&mut sink).await.unwrap();
        assert_eq!(written, 18);
    }

    #[tokio::test]
    async fn test_flush_empty_body_writes_nothing() {
        let mut capture = BodyCapture::default().capture_response();
        capture.writer().set_status(StatusCode::NO_CONTENT);

        // Any write would fail the mock.
        let mock = tokio_test::io::Builder::new().build();
        let mut sink = StreamSink::new(mock);

        assert_eq!(capture.flush(&mut sink).await.unwrap(), 0);
        assert_eq!(sink.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_flush_write_failure_propagates() {
        let mut capture = BodyCapture::default().capture_response();
        capture.writer().write("lost");

        let mock = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone"))
            .build();
        let mut sink = StreamSink::new(mock);

        let err = capture.flush(&mut sink).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_flush_copies_status_and_replaces_headers() {
        let mut capture = BodyCapture::default().capture_response();
        {
            let w = capture.writer();
            w.set_status(StatusCode::CREATED);
            w.headers_mut()
                .append("x-multi", HeaderValue::from_static("a"));
            w.headers_mut()
                .append("x-multi", HeaderValue::from_static("b"));
            w.write("body");
        }

        let mut sink = ResponseWriter::new();
        sink.set_header("x-multi", "stale");
        sink.set_header("x-keep", "kept");
        sink.write("prefix:");

        capture.flush(&mut sink).await.unwrap();

        assert_eq!(sink.status(), StatusCode::CREATED);
        let multi: Vec<_> = sink.headers().get_all("x-multi").iter().collect();
        assert_eq!(multi, vec!["a", "b"]);
        assert_eq!(sink.header("x-keep"), Some("kept"));
        assert_eq!(sink.body(), b"prefix:body");
    }

    #[test]
    fn test_request_snapshot_format() {
        let redactor = Redactor::card_numbers();
        let req = request("/pay/4532123456789012?card=4532-1234-5678-9012", b"{\"card\":\"4532 1234 5678 9012\"}");
        let (text, req) = BodyCapture::default().capture_request(req);

        let snapshot = RequestSnapshot::new(&req, &text, &redactor);
        assert_eq!(
            snapshot.as_str(),
            "Method: POST, Path: /pay/4532-XXXX-XXXX-9012, \
             Headers: content-type: application/json, \
             Query: ?card=4532-XXXX-XXXX-9012, \
             Body: {\"card\":\"4532-XXXX-XXXX-9012\"}"
        );
    }

    #[test]
    fn test_request_snapshot_without_query() {
        let redactor = Redactor::passthrough();
        let req = request("/health", b"");
        let snapshot = RequestSnapshot::new(&req, "", &redactor);
        assert_eq!(
            snapshot.to_string(),
            "Method: POST, Path: /health, Headers: content-type: application/json, Query: , Body: "
        );
    }

    #[test]
    fn test_response_snapshot_format() {
        let redactor = Redactor::card_numbers();
        let mut capture = BodyCapture::default().capture_response();
        capture.writer().set_status(StatusCode::NOT_FOUND);
        capture.writer().set_header("x-card", "4111111111111111");
        capture.writer().write("no such card 5500000000000004");

        let snapshot = ResponseSnapshot::of(&capture, &redactor);
        assert_eq!(
            snapshot.as_str(),
            "Status: 404, Headers: x-card: 4111-XXXX-XXXX-1111, Body: no such card 5500-XXXX-XXXX-0004"
        );
        // Snapshot never alters what the client gets.
        assert_eq!(capture.body(), b"no such card 5500000000000004");
    }
}
