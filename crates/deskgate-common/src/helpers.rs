//! Common helper functions for deskgate.

use std::net::SocketAddr;

use crate::{Error, Result};

/// Read a boolean flag from the environment. Accepts `1`, `true`, `yes`
/// and `on` (case-insensitive); anything else set is `false`.
pub fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => parse_bool(&value),
        Err(_) => default,
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Refuse to listen on a non-loopback address unless `allow_env` is set.
pub fn check_public_bind_allowed(addr: SocketAddr, allow_env: &str) -> Result<()> {
    if addr.ip().is_loopback() || env_bool(allow_env, false) {
        return Ok(());
    }
    Err(Error::config(format!(
        "refusing non-loopback bind to {addr} without {allow_env}=1"
    )))
}
