//! Integration tests for http_observer
//!
//! Each test starts the real hyper server in-process on an ephemeral port
//! with an in-memory span backend, then drives it over HTTP with reqwest.
//!
//! Run with: cargo test --test integration

mod helpers;

mod correlation;
mod errors;
mod passthrough;
mod spans;
