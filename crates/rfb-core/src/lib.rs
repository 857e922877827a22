//! Core RFB handshake types, framing, and constants.
//!
//! This crate provides:
//! - The 12-byte ProtocolVersion banner
//! - Security-type negotiation lists
//! - The 4-byte SecurityResult
//!
//! Only the handshake is modelled. After authentication the relay treats the
//! stream as opaque bytes, so framebuffer messages never appear here.

#![forbid(unsafe_code)]

pub mod handshake;

pub use handshake::{ProtocolVersion, SecurityResult, SecurityType, SecurityTypes};

/// Length of the ProtocolVersion banner (`"RFB xxx.yyy\n"`).
pub const VERSION_BANNER_SIZE: usize = 12;

/// Length of the VNC authentication challenge and of the client response.
pub const CHALLENGE_SIZE: usize = 16;

/// Length of the SecurityResult message.
pub const SECURITY_RESULT_SIZE: usize = 4;

/// The banner this relay sends on both legs.
pub const RFB_VERSION_BANNER: &[u8; VERSION_BANNER_SIZE] = b"RFB 003.008\n";

/// SecurityResult value for success.
pub const SECURITY_RESULT_OK: u32 = 0;

/// SecurityResult value the relay sends on any authentication failure.
pub const SECURITY_RESULT_FAILED: u32 = 1;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RfbError {
    #[error("buffer too short: {0} bytes, need {1}")]
    TooShort(usize, usize),
    #[error("malformed version banner: {0:?}")]
    BadBanner([u8; VERSION_BANNER_SIZE]),
    #[error("unsupported protocol version {0}.{1}")]
    UnsupportedVersion(u16, u16),
    #[error("server offered no security types")]
    NoSecurityTypes,
    #[error("unexpected security type {0}")]
    UnexpectedSecurityType(u8),
}
