//! # Galley Server
//!
//! Library half of the `galley-server` binary: configuration, the API error
//! type and the application router. `main.rs` only wires them together.

pub mod config;
pub mod error;
pub mod routes;

pub use config::{ConfigError, ServerConfig, ServerSettings};
pub use error::{ApiError, ErrorCode};
pub use routes::{build_app, serve};
