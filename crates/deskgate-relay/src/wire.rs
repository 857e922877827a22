//! Timed reads and writes for the handshake phase.
//!
//! Every handshake I/O goes through these helpers so that no single step can
//! stall a session. Expiry is reported like any other failure.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rfb_core::RfbError;
use rfb_crypto::CryptoError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("timed out during {0}")]
    Timeout(&'static str),

    #[error("I/O error during {step}: {source}")]
    Io {
        step: &'static str,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] RfbError),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("connect to {0} timed out")]
    ConnectTimeout(SocketAddr),

    #[error("backend does not offer VNC authentication")]
    VncAuthNotOffered,

    #[error("backend rejected credential (result {0})")]
    Rejected(u32),

    #[error(transparent)]
    Credential(#[from] CryptoError),
}

impl HandshakeError {
    /// True when the peer simply went away mid-handshake.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Io { source, .. } if matches!(
                source.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            )
        )
    }
}

pub(crate) async fn read_exact_timed<S>(
    stream: &mut S,
    buf: &mut [u8],
    limit: Duration,
    step: &'static str,
) -> Result<(), HandshakeError>
where
    S: AsyncRead + Unpin,
{
    match timeout(limit, stream.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(source)) => Err(HandshakeError::Io { step, source }),
        Err(_) => Err(HandshakeError::Timeout(step)),
    }
}

pub(crate) async fn read_u8_timed<S>(
    stream: &mut S,
    limit: Duration,
    step: &'static str,
) -> Result<u8, HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let mut byte = [0u8; 1];
    read_exact_timed(stream, &mut byte, limit, step).await?;
    Ok(byte[0])
}

pub(crate) async fn write_all_timed<S>(
    stream: &mut S,
    buf: &[u8],
    limit: Duration,
    step: &'static str,
) -> Result<(), HandshakeError>
where
    S: AsyncWrite + Unpin,
{
    let write = async {
        stream.write_all(buf).await?;
        stream.flush().await
    };
    match timeout(limit, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(HandshakeError::Io { step, source }),
        Err(_) => Err(HandshakeError::Timeout(step)),
    }
}
