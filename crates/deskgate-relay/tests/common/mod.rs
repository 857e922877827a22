//! Shared fixtures: a fake RFB backend, a scripted viewer and a relay
//! running on loopback.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use deskgate_relay::{
    BackendLocator, Identity, RelayConfig, RelayServer, ShutdownHandle, StaticRoster,
};
use rfb_crypto::{derive_credential, derive_key, encrypt_challenge, Challenge};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(5);

/// Bound every wait so a broken relay fails the test instead of hanging it.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(WAIT, fut)
        .await
        .expect("operation timed out")
}

/// Maps identity ids to loopback backends; unknown ids go to a closed port.
#[derive(Default)]
pub struct LoopbackLocator {
    pub backends: HashMap<i64, SocketAddr>,
}

impl LoopbackLocator {
    pub fn with(id: i64, addr: SocketAddr) -> Self {
        let mut backends = HashMap::new();
        backends.insert(id, addr);
        Self { backends }
    }
}

impl BackendLocator for LoopbackLocator {
    fn locate(&self, identity_id: i64) -> SocketAddr {
        self.backends
            .get(&identity_id)
            .copied()
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 1)))
    }
}

/// A port with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Accept one connection, run the server side of VNC auth against the
/// credential derived from `secret`, then echo everything back until EOF.
/// The task yields whether the relay authenticated.
pub async fn spawn_backend(secret: &'static [u8]) -> (SocketAddr, JoinHandle<bool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"RFB 003.008\n").await.unwrap();
        let mut banner = [0u8; 12];
        stream.read_exact(&mut banner).await.unwrap();
        assert_eq!(&banner, b"RFB 003.008\n");

        stream.write_all(&[1, 2]).await.unwrap();
        let mut selected = [0u8; 1];
        stream.read_exact(&mut selected).await.unwrap();
        assert_eq!(selected[0], 2);

        let challenge = Challenge::generate();
        stream.write_all(challenge.as_bytes()).await.unwrap();
        let mut response = [0u8; 16];
        stream.read_exact(&mut response).await.unwrap();

        let credential = derive_credential(secret).unwrap();
        let expected = encrypt_challenge(&derive_key(credential.as_bytes()), challenge.as_bytes());
        if response != expected {
            stream.write_all(&1u32.to_be_bytes()).await.unwrap();
            return false;
        }
        stream.write_all(&0u32.to_be_bytes()).await.unwrap();

        let mut buf = [0u8; 1024];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if stream.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
        true
    });
    (addr, task)
}

pub fn test_config() -> RelayConfig {
    RelayConfig {
        listen: SocketAddr::from(([127, 0, 0, 1], 0)),
        step_timeout: Duration::from_secs(2),
        handshake_timeout: Duration::from_secs(4),
        connect_timeout: Duration::from_secs(1),
        drain_timeout: Duration::from_secs(2),
        ..RelayConfig::default()
    }
}

pub struct RunningRelay {
    pub addr: SocketAddr,
    pub shutdown: ShutdownHandle,
    pub task: JoinHandle<deskgate_common::Result<()>>,
}

pub async fn start_relay_with(
    config: RelayConfig,
    identities: Vec<Identity>,
    locator: LoopbackLocator,
) -> RunningRelay {
    let server = RelayServer::bind(config, Arc::new(StaticRoster::new(identities)), Arc::new(locator))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_handle();
    let task = tokio::spawn(server.run());
    RunningRelay {
        addr,
        shutdown,
        task,
    }
}

pub async fn start_relay(identities: Vec<Identity>, locator: LoopbackLocator) -> RunningRelay {
    start_relay_with(test_config(), identities, locator).await
}

/// Run the viewer side up to the challenge and return it.
pub async fn viewer_until_challenge(stream: &mut TcpStream) -> [u8; 16] {
    let mut banner = [0u8; 12];
    stream.read_exact(&mut banner).await.unwrap();
    assert_eq!(&banner, b"RFB 003.008\n");
    stream.write_all(b"RFB 003.008\n").await.unwrap();

    let mut offer = [0u8; 2];
    stream.read_exact(&mut offer).await.unwrap();
    assert_eq!(offer, [1, 2], "relay must offer only VNC auth");
    stream.write_all(&[2]).await.unwrap();

    let mut challenge = [0u8; 16];
    stream.read_exact(&mut challenge).await.unwrap();
    challenge
}

/// Full viewer handshake answering with `secret`'s credential. Returns the
/// SecurityResult code.
pub async fn viewer_login(stream: &mut TcpStream, secret: &[u8]) -> u32 {
    let challenge = viewer_until_challenge(stream).await;
    let credential = derive_credential(secret).unwrap();
    let response = encrypt_challenge(&derive_key(credential.as_bytes()), &challenge);
    stream.write_all(&response).await.unwrap();

    let mut result = [0u8; 4];
    stream.read_exact(&mut result).await.unwrap();
    u32::from_be_bytes(result)
}

/// Read until EOF and return whatever arrived.
pub async fn drain(stream: &mut TcpStream) -> Vec<u8> {
    let mut rest = Vec::new();
    let _ = stream.read_to_end(&mut rest).await;
    rest
}
