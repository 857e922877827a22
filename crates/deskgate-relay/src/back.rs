//! Backend-facing handshake (the relay as RFB client).
//!
//! Once a viewer is matched to an identity, the relay opens its own
//! connection to that identity's backend and authenticates with the same
//! derived credential. A rejection here is never retried with anything else.

use std::net::SocketAddr;
use std::time::Duration;

use rfb_core::{
    ProtocolVersion, RfbError, SecurityResult, SecurityType, SecurityTypes, CHALLENGE_SIZE,
    SECURITY_RESULT_SIZE, VERSION_BANNER_SIZE,
};
use rfb_crypto::{encrypt_challenge, DerivedCredential};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::wire::{read_exact_timed, read_u8_timed, write_all_timed, HandshakeError};

/// Open a TCP connection to a backend within `limit`.
pub async fn connect_backend(addr: SocketAddr, limit: Duration) -> Result<TcpStream, HandshakeError> {
    let stream = match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(HandshakeError::Connect { addr, source }),
        Err(_) => return Err(HandshakeError::ConnectTimeout(addr)),
    };
    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay on backend stream failed: {}", e);
    }
    Ok(stream)
}

/// Run the client side of the handshake against a backend.
///
/// Returns the negotiated protocol version once the backend has accepted
/// the credential.
pub async fn authenticate_backend<S>(
    stream: &mut S,
    credential: &DerivedCredential,
    step: Duration,
) -> Result<ProtocolVersion, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut banner = [0u8; VERSION_BANNER_SIZE];
    read_exact_timed(stream, &mut banner, step, "backend version").await?;
    let offered = ProtocolVersion::parse(&banner)?;
    if !offered.supports_security_list() {
        return Err(RfbError::UnsupportedVersion(offered.major, offered.minor).into());
    }

    // Never claim a newer version than the backend speaks.
    let version = offered.min(ProtocolVersion::V3_8);
    write_all_timed(stream, &version.encode(), step, "relay version").await?;

    let count = read_u8_timed(stream, step, "backend security count").await?;
    let mut body = vec![0u8; count as usize];
    if count > 0 {
        read_exact_timed(stream, &mut body, step, "backend security types").await?;
    }
    let types = SecurityTypes::decode(count, &body)?;
    if !types.contains(SecurityType::VncAuth) {
        return Err(HandshakeError::VncAuthNotOffered);
    }
    write_all_timed(
        stream,
        &[SecurityType::VncAuth.code()],
        step,
        "security selection",
    )
    .await?;

    let mut challenge = [0u8; CHALLENGE_SIZE];
    read_exact_timed(stream, &mut challenge, step, "backend challenge").await?;
    let response = encrypt_challenge(&credential.des_key(), &challenge);
    write_all_timed(stream, &response, step, "challenge response").await?;

    let mut result = [0u8; SECURITY_RESULT_SIZE];
    read_exact_timed(stream, &mut result, step, "backend security result").await?;
    match SecurityResult::decode(&result)? {
        SecurityResult::Ok => Ok(version),
        SecurityResult::Failed(code) => Err(HandshakeError::Rejected(code)),
    }
}
