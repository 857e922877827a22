//! Accept loop and session supervision.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::locator::BackendLocator;
use crate::roster::RosterProvider;
use crate::session::{RelayContext, Session};
use crate::shutdown::{stopped, ShutdownHandle};

/// Back-off after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct RelayServer {
    listener: TcpListener,
    ctx: Arc<RelayContext>,
    sessions: Arc<Semaphore>,
    max_sessions: u32,
    shutdown: ShutdownHandle,
}

impl RelayServer {
    /// Validate the config, probe the roster once and bind the listener.
    pub async fn bind(
        config: RelayConfig,
        roster: Arc<dyn RosterProvider>,
        locator: Arc<dyn BackendLocator>,
    ) -> deskgate_common::Result<Self> {
        config.validate()?;

        let probe = roster.list().await?;
        info!(
            identities = probe.len(),
            provisioned = probe.iter().filter(|i| i.secret.is_some()).count(),
            "roster reachable: {}",
            roster.describe()
        );
        drop(probe);

        let socket = if config.listen.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(config.listen)?;
        let listener = socket.listen(config.backlog)?;

        // validate() caps max_sessions at u32::MAX.
        let max_sessions = config.max_sessions as u32;
        let sessions = Arc::new(Semaphore::new(config.max_sessions));

        Ok(Self {
            listener,
            ctx: Arc::new(RelayContext {
                config,
                roster,
                locator,
            }),
            sessions,
            max_sessions,
            shutdown: ShutdownHandle::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn active_sessions(&self) -> usize {
        self.max_sessions as usize - self.sessions.available_permits()
    }

    /// Accept connections until shutdown, then wait a bounded time for live
    /// sessions to finish.
    pub async fn run(self) -> deskgate_common::Result<()> {
        let addr = self.listener.local_addr()?;
        info!("relay listening on {}", addr);

        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.dispatch(stream, peer),
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        let live = self.active_sessions();
        let RelayServer {
            listener,
            ctx,
            sessions,
            max_sessions,
            ..
        } = self;
        drop(listener);

        info!(live, "shutting down, draining sessions");
        match timeout(ctx.config.drain_timeout, sessions.acquire_many(max_sessions)).await {
            Ok(_) => info!("all sessions closed"),
            Err(_) => warn!(
                remaining = max_sessions as usize - sessions.available_permits(),
                "drain timed out"
            ),
        }
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let permit = match self.sessions.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(%peer, "session limit reached, dropping connection");
                return;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, "set_nodelay failed: {}", e);
        }

        let session = Session::new(peer, self.ctx.clone(), self.shutdown.subscribe());
        tokio::spawn(async move {
            let _ = session.run(stream).await;
            drop(permit);
        });
    }
}
