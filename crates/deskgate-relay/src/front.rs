//! Viewer-facing handshake (the relay as RFB server).
//!
//! The relay only ever offers VNC authentication, so a viewer has no way to
//! negotiate around the challenge. Each function is one step of the state
//! machine; the session drives them in order and tracks the state.

use std::time::Duration;

use rfb_core::{
    ProtocolVersion, RfbError, SecurityResult, SecurityType, SecurityTypes, CHALLENGE_SIZE,
    RFB_VERSION_BANNER, VERSION_BANNER_SIZE,
};
use rfb_crypto::Challenge;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::wire::{read_exact_timed, read_u8_timed, write_all_timed, HandshakeError};

/// Send our banner and read the viewer's. Viewers older than 3.7 cannot do
/// list-based security negotiation and are refused.
pub async fn exchange_version<S>(stream: &mut S, step: Duration) -> Result<ProtocolVersion, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_all_timed(stream, RFB_VERSION_BANNER, step, "version banner").await?;

    let mut banner = [0u8; VERSION_BANNER_SIZE];
    read_exact_timed(stream, &mut banner, step, "viewer version").await?;
    let version = ProtocolVersion::parse(&banner)?;
    if !version.supports_security_list() {
        return Err(RfbError::UnsupportedVersion(version.major, version.minor).into());
    }
    Ok(version)
}

/// Offer VNC authentication as the only security type and check the
/// viewer picked it.
pub async fn negotiate_security<S>(stream: &mut S, step: Duration) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let offer = SecurityTypes::vnc_auth_only().encode();
    write_all_timed(stream, &offer, step, "security types").await?;

    let selected = read_u8_timed(stream, step, "security selection").await?;
    if SecurityType::from(selected) != SecurityType::VncAuth {
        return Err(RfbError::UnexpectedSecurityType(selected).into());
    }
    Ok(())
}

/// Generate a fresh challenge and send it.
pub async fn issue_challenge<S>(stream: &mut S, step: Duration) -> Result<Challenge, HandshakeError>
where
    S: AsyncWrite + Unpin,
{
    let challenge = Challenge::generate();
    write_all_timed(stream, challenge.as_bytes(), step, "challenge").await?;
    Ok(challenge)
}

/// Read exactly 16 response bytes. Anything shorter is a protocol failure.
pub async fn read_response<S>(stream: &mut S, step: Duration) -> Result<[u8; CHALLENGE_SIZE], HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let mut response = [0u8; CHALLENGE_SIZE];
    read_exact_timed(stream, &mut response, step, "challenge response").await?;
    Ok(response)
}

/// Send the SecurityResult that ends the viewer handshake.
pub async fn send_result<S>(stream: &mut S, result: SecurityResult, step: Duration) -> Result<(), HandshakeError>
where
    S: AsyncWrite + Unpin,
{
    write_all_timed(stream, &result.encode(), step, "security result").await
}
