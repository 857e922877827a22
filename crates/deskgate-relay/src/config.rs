//! Relay runtime configuration.

use std::net::SocketAddr;
use std::time::Duration;

use rfb_crypto::DEFAULT_CREDENTIAL_LABEL;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:5900";
pub const DEFAULT_BACKLOG: u32 = 128;
pub const DEFAULT_MAX_SESSIONS: usize = 1024;
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RELAY_CHUNK_SIZE: usize = 8192;

/// How long `RelayServer::run` waits for live sessions after shutdown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    pub backlog: u32,
    pub max_sessions: usize,
    /// Domain-separation label for credential derivation. Must match the
    /// label used when the backends were provisioned.
    pub credential_label: String,
    /// Bound on each individual handshake read or write.
    pub step_timeout: Duration,
    /// Bound on the whole authentication phase, both legs included.
    pub handshake_timeout: Duration,
    pub connect_timeout: Duration,
    pub relay_chunk_size: usize,
    pub drain_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 5900)),
            backlog: DEFAULT_BACKLOG,
            max_sessions: DEFAULT_MAX_SESSIONS,
            credential_label: DEFAULT_CREDENTIAL_LABEL.to_string(),
            step_timeout: Duration::from_millis(DEFAULT_STEP_TIMEOUT_MS),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            relay_chunk_size: DEFAULT_RELAY_CHUNK_SIZE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl RelayConfig {
    /// Reject values that would make sessions unbounded or impossible.
    pub fn validate(&self) -> deskgate_common::Result<()> {
        use deskgate_common::Error;

        if self.max_sessions == 0 {
            return Err(Error::config("max_sessions must be at least 1"));
        }
        if self.max_sessions > u32::MAX as usize {
            return Err(Error::config("max_sessions is too large"));
        }
        if self.step_timeout.is_zero() || self.handshake_timeout.is_zero() {
            return Err(Error::config("handshake timeouts must be non-zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect timeout must be non-zero"));
        }
        if self.relay_chunk_size == 0 {
            return Err(Error::config("relay chunk size must be non-zero"));
        }
        if self.credential_label.is_empty() {
            return Err(Error::config("credential label must not be empty"));
        }
        Ok(())
    }
}
