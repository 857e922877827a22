//! Bidirectional byte relay once both legs are authenticated.
//!
//! Bytes are forwarded verbatim in both directions. When either direction
//! sees EOF or an error, or shutdown fires, both directions stop and both
//! sockets are shut down.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::shutdown::stopped;

/// Bytes forwarded in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
}

/// Relay between `front` (viewer) and `back` (backend) until either side
/// closes or `shutdown` fires.
pub async fn pump<A, B>(
    front: A,
    back: B,
    chunk_size: usize,
    shutdown: watch::Receiver<bool>,
) -> PumpStats
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (front_read, front_write) = tokio::io::split(front);
    let (back_read, back_write) = tokio::io::split(back);
    let (stop_tx, _) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);

    let upstream = tokio::spawn(copy_direction(
        front_read,
        back_write,
        chunk_size,
        stop_tx.clone(),
        shutdown.clone(),
        "viewer->backend",
    ));
    let downstream = tokio::spawn(copy_direction(
        back_read,
        front_write,
        chunk_size,
        stop_tx,
        shutdown,
        "backend->viewer",
    ));

    let (up, down) = tokio::join!(upstream, downstream);
    PumpStats {
        client_to_backend: up.unwrap_or_else(|e| {
            warn!("viewer->backend task failed: {}", e);
            0
        }),
        backend_to_client: down.unwrap_or_else(|e| {
            warn!("backend->viewer task failed: {}", e);
            0
        }),
    }
}

async fn copy_direction<R, W>(
    mut reader: ReadHalf<R>,
    mut writer: WriteHalf<W>,
    chunk_size: usize,
    stop_tx: Arc<watch::Sender<bool>>,
    mut shutdown: watch::Receiver<bool>,
    direction: &'static str,
) -> u64
where
    R: AsyncRead,
    W: AsyncWrite,
{
    let mut stop_rx = stop_tx.subscribe();
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = tokio::select! {
            _ = stopped(&mut stop_rx) => break,
            _ = stopped(&mut shutdown) => {
                debug!(direction, "shutdown requested");
                break;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    debug!(direction, "peer closed");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    debug!(direction, "read failed: {}", e);
                    break;
                }
            },
        };

        let write = async {
            writer.write_all(&buf[..n]).await?;
            writer.flush().await
        };
        tokio::select! {
            _ = stopped(&mut stop_rx) => break,
            _ = stopped(&mut shutdown) => {
                debug!(direction, "shutdown requested while writing");
                break;
            }
            written = write => {
                if let Err(e) = written {
                    debug!(direction, "write failed: {}", e);
                    break;
                }
                total += n as u64;
            }
        }
    }

    stop_tx.send_replace(true);
    let _ = writer.shutdown().await;
    total
}
