//! Cryptographic primitives for deskgate.
//!
//! This crate provides:
//! - The VNC authentication transform (DES-ECB with a bit-reversed key)
//! - Per-identity session credentials derived from an identity secret
//! - Fresh authentication challenges and constant-time response comparison
//!
//! # Design
//!
//! VNC authentication is a legacy scheme. It is implemented exactly as the
//! wrapped protocol requires so that stock viewers and stock servers both
//! interoperate with the relay. Nothing here provides confidentiality for
//! the session that follows.

#![forbid(unsafe_code)]

pub mod challenge;
pub mod credential;
pub mod vnc_des;

pub use challenge::{expected_response, responses_match, Challenge};
pub use credential::{
    derive_credential, derive_credential_with_label, DerivedCredential, DEFAULT_CREDENTIAL_LABEL,
};
pub use vnc_des::{derive_key, encrypt_challenge, reverse_bits, DesKey};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid MAC key: {0}")]
    InvalidMacKey(String),
}
