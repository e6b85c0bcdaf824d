//! HTTP server running every request through an [`Interceptor`].
//!
//! HTTP/1.1 and HTTP/2 are served on the same port (protocol detected per
//! connection). Each request gets a fresh [`Context`] and an in-memory
//! [`ResponseWriter`]; the interceptor flushes into that writer and the
//! result becomes the hyper response.
//!
//! Failures map to status codes here, after the span is closed:
//!
//! | Outcome                | Status | Body                          |
//! |------------------------|--------|-------------------------------|
//! | handler error or panic | 500    | whatever the handler wrote    |
//! | request body read fails| 400    | empty                         |
//! | flush fails            | 500    | empty                         |
//!
//! The correlation header is on every response, including the error ones.
//!
//! # Example
//!
//! ```rust,ignore
//! let interceptor = Interceptor::new(MyHandler, &config.interceptor, backend);
//! let server = Arc::new(Server::new(config.server.clone(), interceptor));
//!
//! let runner = Arc::clone(&server);
//! tokio::spawn(async move { runner.run().await });
//!
//! tokio::signal::ctrl_c().await?;
//! server.trigger_shutdown();
//! server.wait_for_drain(Duration::from_secs(30)).await;
//! ```

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::FutureExt;
use http::StatusCode;
use http_body_util::Full;
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::core::{BoxError, Context, Error, HttpVersion, ResponseWriter};
use crate::pipeline::{Handler, Interceptor};

/// Connection resets and timeouts are routine; anything else is logged.
#[inline]
fn is_connection_error(err_str: &str) -> bool {
    err_str.contains("connection reset")
        || err_str.contains("Connection reset")
        || err_str.contains("broken pipe")
        || err_str.contains("os error 104")
        || err_str.contains("os error 32")
        || err_str.contains("timed out")
        || err_str.contains("HeaderTimeout")
}

/// Accept loop plus per-connection hyper setup.
pub struct Server<H> {
    config: ServerConfig,
    interceptor: Arc<Interceptor<H>>,
    active_connections: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    shutdown_initiated: AtomicBool,
}

impl<H: Handler + 'static> Server<H> {
    pub fn new(config: ServerConfig, interceptor: Interceptor<H>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            interceptor: Arc::new(interceptor),
            active_connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            shutdown_rx,
            shutdown_initiated: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[inline]
    pub fn interceptor(&self) -> &Interceptor<H> {
        &self.interceptor
    }

    /// Connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind `listen_addr` and serve until shutdown.
    pub async fn run(&self) -> io::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown.
    ///
    /// Returns once the accept loop has stopped; connections still in flight
    /// keep running (see [`Server::wait_for_drain`]).
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            service = %self.interceptor.service(),
            "Server listening"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, remote_addr) = match result {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Accept error: {}", e);
                            continue;
                        }
                    };
                    let _ = stream.set_nodelay(true);

                    let interceptor = Arc::clone(&self.interceptor);
                    let active = Arc::clone(&self.active_connections);
                    let header_timeout = self.config.header_timeout;
                    active.fetch_add(1, Ordering::Relaxed);
                    tokio::spawn(async move {
                        handle_connection(interceptor, stream, remote_addr, header_timeout).await;
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                _ = shutdown_rx.changed() => {
                    debug!("Received shutdown signal, stopping accept loop");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Stop accepting new connections. Idempotent.
    pub fn trigger_shutdown(&self) {
        if self.shutdown_initiated.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for in-flight connections to finish.
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let check_interval = Duration::from_millis(50);

        loop {
            let active = self.active_connections();
            if active == 0 {
                return true;
            }
            if start.elapsed() >= timeout {
                warn!("Drain timeout reached with {} active connections", active);
                return false;
            }
            debug!("Waiting for {} connections to drain...", active);
            tokio::time::sleep(check_interval).await;
        }
    }
}

async fn handle_connection<H: Handler + 'static>(
    interceptor: Arc<Interceptor<H>>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    header_timeout: Option<Duration>,
) {
    let service = service_fn(move |req| {
        let interceptor = Arc::clone(&interceptor);
        async move { Ok::<_, Infallible>(respond(&interceptor, req, remote_addr).await) }
    });

    let io = TokioIo::new(stream);
    if let Err(err) = auto::Builder::new(TokioExecutor::new())
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(header_timeout)
        .keep_alive(true)
        .http2()
        .max_concurrent_streams(250)
        .serve_connection(io, service)
        .await
    {
        let err_str = format!("{:?}", err);
        if !is_connection_error(&err_str) {
            debug!("Connection error: {:?}", err);
        }
    }
}

/// Run one request through the interceptor and build the HTTP response.
pub async fn respond<H, B>(
    interceptor: &Interceptor<H>,
    req: http::Request<B>,
    remote_addr: SocketAddr,
) -> http::Response<Full<Bytes>>
where
    H: Handler,
    B: Body + Send,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    let mut ctx = Context::builder(remote_addr.ip())
        .http_version(HttpVersion::from_http(req.version()))
        .build();
    let mut writer = ResponseWriter::new();

    let outcome = AssertUnwindSafe(interceptor.serve_http(req, &mut ctx, &mut writer))
        .catch_unwind()
        .await;

    let correlation_id = ctx
        .correlation_id()
        .map(|id| id.to_string())
        .unwrap_or_default();

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(Error::RequestBody(e))) => {
            debug!(correlation_id = %correlation_id, error = %e, "bad request body");
            writer = ResponseWriter::new();
            writer.set_status(StatusCode::BAD_REQUEST);
        }
        Ok(Err(Error::Handler(e))) => {
            warn!(correlation_id = %correlation_id, error = %e, "handler failed");
            writer.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        }
        Ok(Err(e)) => {
            error!(correlation_id = %correlation_id, error = %e, "response not delivered");
            writer = ResponseWriter::new();
            writer.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        }
        Err(_) => {
            error!(correlation_id = %correlation_id, "handler panicked");
            writer.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    ctx.apply_response_headers(writer.headers_mut());
    writer.into_http()
}
