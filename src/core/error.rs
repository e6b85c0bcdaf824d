//! Pipeline error types.

use thiserror::Error;

/// Boxed error returned by downstream handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the interception pipeline.
///
/// Instrumentation faults (tracing backend down, attribute rejected) never
/// appear here; they are logged and swallowed.
#[derive(Debug, Error)]
pub enum Error {
    /// The inbound request body could not be read.
    #[error("failed to read request body: {0}")]
    RequestBody(#[source] BoxError),

    /// The downstream handler failed. Carries the handler's error unchanged.
    #[error("{0}")]
    Handler(#[source] BoxError),

    /// Buffered response bytes could not be written to the real output.
    #[error("failed to flush response: {0}")]
    Flush(#[from] std::io::Error),
}

impl Error {
    /// Whether the downstream handler produced this error.
    #[inline]
    pub fn is_handler(&self) -> bool {
        matches!(self, Error::Handler(_))
    }

    /// Take back the handler's original error, if this is one.
    pub fn into_handler_error(self) -> Option<BoxError> {
        match self {
            Error::Handler(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
