//! Transport layer for parkwatch.
//!
//! Exposes the engine to the UI layer over HTTP/JSON via axum.

pub mod http;

pub use http::{ServerConfig, serve};
