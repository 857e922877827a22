//! End-to-end tests: real loopback sockets, a fake backend, a scripted viewer.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use deskgate_relay::{FileRoster, Identity, RelayServer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_authenticated_viewer_is_relayed_both_ways() {
    let (backend_addr, backend) = spawn_backend(b"s7").await;
    let relay = start_relay(
        vec![Identity::new(7, "seven", "s7")],
        LoopbackLocator::with(7, backend_addr),
    )
    .await;

    let mut viewer = TcpStream::connect(relay.addr).await.unwrap();
    assert_eq!(within(viewer_login(&mut viewer, b"s7")).await, 0);

    viewer.write_all(b"key event").await.unwrap();
    let mut echoed = [0u8; 9];
    within(viewer.read_exact(&mut echoed)).await.unwrap();
    assert_eq!(&echoed, b"key event");

    drop(viewer);
    assert!(within(backend).await.unwrap(), "backend saw a valid credential");
}

#[tokio::test]
async fn test_viewer_is_routed_to_its_own_backend() {
    let (backend_addr, backend) = spawn_backend(b"bob-secret").await;
    let relay = start_relay(
        vec![
            Identity::new(1, "alice", "alice-secret"),
            Identity::unprovisioned(2, "dave"),
            Identity::new(3, "bob", "bob-secret"),
        ],
        LoopbackLocator::with(3, backend_addr),
    )
    .await;

    let mut viewer = TcpStream::connect(relay.addr).await.unwrap();
    assert_eq!(within(viewer_login(&mut viewer, b"bob-secret")).await, 0);
    drop(viewer);
    assert!(within(backend).await.unwrap());
}

#[tokio::test]
async fn test_unknown_credential_gets_failure_then_close() {
    let relay = start_relay(
        vec![Identity::new(7, "seven", "s7")],
        LoopbackLocator::default(),
    )
    .await;

    let mut viewer = TcpStream::connect(relay.addr).await.unwrap();
    assert_eq!(within(viewer_login(&mut viewer, b"wrong")).await, 1);
    assert!(within(drain(&mut viewer)).await.is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_looks_like_bad_credential() {
    let relay = start_relay(
        vec![Identity::new(7, "seven", "s7")],
        LoopbackLocator::with(7, closed_port().await),
    )
    .await;

    let mut viewer = TcpStream::connect(relay.addr).await.unwrap();
    assert_eq!(within(viewer_login(&mut viewer, b"s7")).await, 1);
    assert!(within(drain(&mut viewer)).await.is_empty());
}

#[tokio::test]
async fn test_silent_backend_times_out_as_failure() {
    // Accepts the TCP connection but never sends a version banner.
    let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let silent_addr = silent.local_addr().unwrap();
    let holder = tokio::spawn(async move {
        let (stream, _) = silent.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let mut config = test_config();
    config.step_timeout = Duration::from_millis(200);
    let relay = start_relay_with(
        config,
        vec![Identity::new(7, "seven", "s7")],
        LoopbackLocator::with(7, silent_addr),
    )
    .await;

    let mut viewer = TcpStream::connect(relay.addr).await.unwrap();
    assert_eq!(within(viewer_login(&mut viewer, b"s7")).await, 1);
    assert!(within(drain(&mut viewer)).await.is_empty());
    holder.abort();
}

#[tokio::test]
async fn test_backend_rejecting_credential_fails_viewer() {
    // Backend was provisioned with a different secret than the roster holds.
    let (backend_addr, backend) = spawn_backend(b"rotated").await;
    let relay = start_relay(
        vec![Identity::new(7, "seven", "s7")],
        LoopbackLocator::with(7, backend_addr),
    )
    .await;

    let mut viewer = TcpStream::connect(relay.addr).await.unwrap();
    assert_eq!(within(viewer_login(&mut viewer, b"s7")).await, 1);
    assert!(!within(backend).await.unwrap());
    assert!(within(drain(&mut viewer)).await.is_empty());
}

#[tokio::test]
async fn test_non_rfb_client_is_closed_silently() {
    let relay = start_relay(vec![], LoopbackLocator::default()).await;

    let mut viewer = TcpStream::connect(relay.addr).await.unwrap();
    let mut banner = [0u8; 12];
    within(viewer.read_exact(&mut banner)).await.unwrap();
    viewer.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
    assert!(within(drain(&mut viewer)).await.is_empty());
}

#[tokio::test]
async fn test_wrong_security_type_is_closed_silently() {
    let relay = start_relay(vec![], LoopbackLocator::default()).await;

    let mut viewer = TcpStream::connect(relay.addr).await.unwrap();
    let mut banner = [0u8; 12];
    within(viewer.read_exact(&mut banner)).await.unwrap();
    viewer.write_all(b"RFB 003.008\n").await.unwrap();
    let mut offer = [0u8; 2];
    within(viewer.read_exact(&mut offer)).await.unwrap();
    viewer.write_all(&[1]).await.unwrap();

    assert!(within(drain(&mut viewer)).await.is_empty());
}

#[tokio::test]
async fn test_short_response_is_closed_silently() {
    let relay = start_relay(
        vec![Identity::new(7, "seven", "s7")],
        LoopbackLocator::default(),
    )
    .await;

    let mut viewer = TcpStream::connect(relay.addr).await.unwrap();
    within(viewer_until_challenge(&mut viewer)).await;
    viewer.write_all(&[0u8; 10]).await.unwrap();
    viewer.shutdown().await.unwrap();

    assert!(within(drain(&mut viewer)).await.is_empty());
}

#[tokio::test]
async fn test_stalled_viewer_times_out() {
    let mut config = test_config();
    config.step_timeout = Duration::from_millis(100);
    let relay = start_relay_with(config, vec![], LoopbackLocator::default()).await;

    let mut viewer = TcpStream::connect(relay.addr).await.unwrap();
    let mut banner = [0u8; 12];
    within(viewer.read_exact(&mut banner)).await.unwrap();
    // Say nothing; the relay must give up on its own.
    assert!(within(drain(&mut viewer)).await.is_empty());
}

#[tokio::test]
async fn test_shutdown_closes_relaying_session() {
    let (backend_addr, _backend) = spawn_backend(b"s7").await;
    let relay = start_relay(
        vec![Identity::new(7, "seven", "s7")],
        LoopbackLocator::with(7, backend_addr),
    )
    .await;

    let mut viewer = TcpStream::connect(relay.addr).await.unwrap();
    assert_eq!(within(viewer_login(&mut viewer, b"s7")).await, 0);

    relay.shutdown.shutdown();
    assert!(within(drain(&mut viewer)).await.is_empty());
    within(relay.task).await.unwrap().unwrap();
    assert!(TcpStream::connect(relay.addr).await.is_err(), "listener closed");
}

#[tokio::test]
async fn test_connections_over_limit_are_dropped() {
    let mut config = test_config();
    config.max_sessions = 1;
    let relay = start_relay_with(config, vec![], LoopbackLocator::default()).await;

    let mut first = TcpStream::connect(relay.addr).await.unwrap();
    let mut banner = [0u8; 12];
    within(first.read_exact(&mut banner)).await.unwrap();

    let mut second = TcpStream::connect(relay.addr).await.unwrap();
    assert!(within(drain(&mut second)).await.is_empty(), "no banner for the overflow");

    drop(first);
    // Once the first session is gone its slot is usable again.
    let mut third = loop {
        let mut candidate = TcpStream::connect(relay.addr).await.unwrap();
        let mut byte = [0u8; 1];
        match within(candidate.read(&mut byte)).await {
            Ok(1) => break candidate,
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    };
    let mut rest = [0u8; 11];
    within(third.read_exact(&mut rest)).await.unwrap();
    assert_eq!(&rest, b"FB 003.008\n");
}

#[tokio::test]
async fn test_unreachable_roster_aborts_startup() {
    let roster = Arc::new(FileRoster::new("/nonexistent/deskgate/roster.json"));
    let result = RelayServer::bind(test_config(), roster, Arc::new(LoopbackLocator::default())).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = test_config();
    config.max_sessions = 0;
    let result = RelayServer::bind(
        config,
        Arc::new(deskgate_relay::StaticRoster::default()),
        Arc::new(LoopbackLocator::default()),
    )
    .await;
    assert!(matches!(result, Err(deskgate_common::Error::Config(_))));
}

#[tokio::test]
async fn test_fresh_server_has_no_sessions() {
    let server = RelayServer::bind(
        test_config(),
        Arc::new(deskgate_relay::StaticRoster::default()),
        Arc::new(LoopbackLocator::default()),
    )
    .await
    .unwrap();
    assert_eq!(server.active_sessions(), 0);
    assert!(server.local_addr().unwrap().port() != 0);
}
