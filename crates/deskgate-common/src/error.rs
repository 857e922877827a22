//! Common error types for deskgate.

use thiserror::Error;

/// Result type alias using deskgate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for deskgate operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Identity roster could not be read
    #[error("roster error: {0}")]
    Roster(String),
}

impl Error {
    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create a roster error from any displayable type.
    pub fn roster(msg: impl std::fmt::Display) -> Self {
        Self::Roster(msg.to_string())
    }
}
