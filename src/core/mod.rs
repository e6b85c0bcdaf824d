//! Core types for intercepted request handling.
//!
//! - [`Request`] - buffered HTTP request, re-readable from byte 0
//! - [`ResponseWriter`] - in-memory response a handler writes into
//! - [`Context`] - per-request correlation id, active span and remote parent
//! - [`Error`] - pipeline error types
//!
//! # Example
//!
//! ```rust,ignore
//! use http_observer::core::{Context, Request, ResponseWriter};
//!
//! fn handle(req: &Request, ctx: &mut Context, res: &mut ResponseWriter) {
//!     if let Some(id) = ctx.correlation_id() {
//!         res.set_header("x-handled-for", id.as_str());
//!     }
//!     res.write(req.body());
//! }
//! ```

mod context;
mod error;
mod request;
mod response;

pub use context::{ActiveSpanScope, Context, ContextBuilder, HttpVersion};
pub use error::{BoxError, Error, Result};
pub use request::Request;
pub use response::ResponseWriter;
