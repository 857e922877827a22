//! Shared utilities for deskgate: logging, error types, environment helpers.
//!
//! This crate provides common infrastructure used across all deskgate components.

#![forbid(unsafe_code)]

pub mod error;
pub mod helpers;

pub use error::{Error, Result};

/// Initialize tracing with a specific default level.
///
/// `RUST_LOG` still wins when it is set.
pub fn init_tracing_with_default(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
