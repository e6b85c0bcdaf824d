use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use http_observer::config::Config;
use http_observer::core::BoxError;
use http_observer::observability::{RecordingBackend, TraceBackend};
use http_observer::{logging, Context, Handler, Interceptor, Request, ResponseWriter, Server};

/// Grace period for in-flight connections after Ctrl-C.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Demo handler: echoes the request body, or describes the request when
/// there is no body.
struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(
        &self,
        req: Request,
        ctx: &mut Context,
        res: &mut ResponseWriter,
    ) -> Result<(), BoxError> {
        if !req.body().is_empty() {
            let content_type = req.content_type().unwrap_or("application/octet-stream");
            res.set_header("content-type", content_type);
            res.write(req.body());
            return Ok(());
        }

        let description = serde_json::json!({
            "method": req.method().as_str(),
            "path": req.path(),
            "query": req.query(),
            "correlation_id": ctx.correlation_id().map(|id| id.as_str()),
            "client_ip": ctx.client_ip.to_string(),
        });
        res.set_header("content-type", "application/json");
        res.write(serde_json::to_vec(&description)?);
        Ok(())
    }
}

fn main() -> Result<(), BoxError> {
    let config = Config::from_env()?;
    logging::init(&config.logging)?;

    info!("Starting http_observer {}", http_observer::VERSION);
    config.log_summary();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> Result<(), BoxError> {
    let (backend, exporting) = trace_backend(&config);

    let interceptor = Interceptor::new(EchoHandler, &config.interceptor, backend);
    let server = Arc::new(Server::new(config.server.clone(), interceptor));

    let runner = Arc::clone(&server);
    let mut serving = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        result = &mut serving => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task failed: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            server.trigger_shutdown();
            let _ = serving.await;
            server.wait_for_drain(DRAIN_TIMEOUT).await;
        }
    }

    if exporting {
        shutdown_export();
    }
    Ok(())
}

/// OpenTelemetry when enabled and available, otherwise in-memory recording.
fn trace_backend(config: &Config) -> (Arc<dyn TraceBackend>, bool) {
    #[cfg(feature = "otel")]
    {
        match http_observer::observability::init_tracing(&config.tracing) {
            Ok(true) => {
                let backend: Arc<dyn TraceBackend> =
                    Arc::new(http_observer::observability::OtelBackend::new());
                return (backend, true);
            }
            Ok(false) => {}
            Err(e) => warn!("OpenTelemetry init failed, recording spans in memory: {}", e),
        }
    }

    #[cfg(not(feature = "otel"))]
    if config.tracing.enabled {
        warn!("OTEL_ENABLED=1 but built without the `otel` feature, recording spans in memory");
    }

    let backend: Arc<dyn TraceBackend> = Arc::new(RecordingBackend::new());
    (backend, false)
}

#[cfg(feature = "otel")]
fn shutdown_export() {
    http_observer::observability::shutdown_tracing();
}

#[cfg(not(feature = "otel"))]
fn shutdown_export() {}
