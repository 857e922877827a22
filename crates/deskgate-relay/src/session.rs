//! Per-connection pipeline.
//!
//! A session owns the viewer socket from accept to close and, once matched,
//! the backend socket too. Both are released by drop on every exit path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rfb_core::SecurityResult;
use rfb_crypto::derive_credential_with_label;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::back::{authenticate_backend, connect_backend};
use crate::config::RelayConfig;
use crate::front;
use crate::locator::BackendLocator;
use crate::matcher::match_identity;
use crate::pump::{pump, PumpStats};
use crate::roster::{Identity, RosterProvider};
use crate::shutdown::stopped;
use crate::wire::HandshakeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingVersion,
    AwaitingSecurityChoice,
    AwaitingChallengeResponse,
    Matching,
    BackHandshaking,
    Relaying,
    Closed,
}

impl SessionState {
    /// Whether the viewer has sent its full challenge response. From here on
    /// the viewer is owed a SecurityResult, even on failure.
    pub fn response_collected(self) -> bool {
        matches!(self, Self::Matching | Self::BackHandshaking | Self::Relaying)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("viewer handshake failed: {0}")]
    Front(HandshakeError),

    #[error("roster unavailable: {0}")]
    Roster(#[from] deskgate_common::Error),

    #[error("no identity matched the challenge response")]
    NoMatch,

    #[error("backend {addr} for identity {identity_id} failed: {source}")]
    Backend {
        identity_id: i64,
        addr: SocketAddr,
        #[source]
        source: HandshakeError,
    },

    #[error("authentication did not finish within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("relay is shutting down")]
    Shutdown,
}

/// Everything a session needs that outlives it.
pub struct RelayContext {
    pub config: RelayConfig,
    pub roster: Arc<dyn RosterProvider>,
    pub locator: Arc<dyn BackendLocator>,
}

pub struct Session {
    id: Uuid,
    peer: SocketAddr,
    state: SessionState,
    ctx: Arc<RelayContext>,
    shutdown: watch::Receiver<bool>,
}

impl Session {
    pub fn new(peer: SocketAddr, ctx: Arc<RelayContext>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            state: SessionState::AwaitingVersion,
            ctx,
            shutdown,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the connection to completion: authenticate both legs, relay,
    /// close. Returns the relay byte counts, or the error that ended it.
    pub async fn run<S>(self, front: S) -> Result<PumpStats, SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let span = info_span!("session", id = %self.id, peer = %self.peer);
        self.drive(front).instrument(span).await
    }

    async fn drive<S>(mut self, mut front: S) -> Result<PumpStats, SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        info!("viewer connected");
        let step = self.ctx.config.step_timeout;
        let limit = self.ctx.config.handshake_timeout;

        let mut shutdown = self.shutdown.clone();
        let authenticated = tokio::select! {
            _ = stopped(&mut shutdown) => Err(SessionError::Shutdown),
            res = timeout(limit, self.authenticate(&mut front)) => match res {
                Ok(res) => res,
                Err(_) => Err(SessionError::HandshakeTimeout(limit)),
            },
        };

        let (identity, back) = match authenticated {
            Ok(pair) => pair,
            Err(e) => {
                if self.state.response_collected() {
                    if let Err(send_err) =
                        front::send_result(&mut front, SecurityResult::failed(), step).await
                    {
                        debug!("could not deliver failure result: {}", send_err);
                    }
                }
                log_failure(&e);
                self.set_state(SessionState::Closed);
                return Err(e);
            }
        };

        if let Err(e) = front::send_result(&mut front, SecurityResult::Ok, step).await {
            warn!(identity_id = identity.id, "viewer left before relay started: {}", e);
            self.set_state(SessionState::Closed);
            return Err(SessionError::Front(e));
        }

        self.set_state(SessionState::Relaying);
        info!(identity_id = identity.id, "relaying");
        let stats = pump(
            front,
            back,
            self.ctx.config.relay_chunk_size,
            self.shutdown.clone(),
        )
        .await;
        self.set_state(SessionState::Closed);
        info!(
            identity_id = identity.id,
            client_to_backend = stats.client_to_backend,
            backend_to_client = stats.backend_to_client,
            "session closed"
        );
        Ok(stats)
    }

    async fn authenticate<S>(&mut self, front: &mut S) -> Result<(Identity, TcpStream), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let step = self.ctx.config.step_timeout;

        self.set_state(SessionState::AwaitingVersion);
        let version = front::exchange_version(front, step)
            .await
            .map_err(SessionError::Front)?;
        debug!(%version, "viewer version accepted");

        self.set_state(SessionState::AwaitingSecurityChoice);
        front::negotiate_security(front, step)
            .await
            .map_err(SessionError::Front)?;

        let challenge = front::issue_challenge(front, step)
            .await
            .map_err(SessionError::Front)?;

        self.set_state(SessionState::AwaitingChallengeResponse);
        let response = front::read_response(front, step)
            .await
            .map_err(SessionError::Front)?;

        self.set_state(SessionState::Matching);
        let roster = self.ctx.roster.list().await?;
        let identity = match_identity(
            &challenge,
            &response,
            &roster,
            &self.ctx.config.credential_label,
        )
        .cloned()
        .ok_or(SessionError::NoMatch)?;
        drop(roster);
        info!(
            identity_id = identity.id,
            display_name = %identity.display_name,
            "viewer matched"
        );

        self.set_state(SessionState::BackHandshaking);
        let identity_id = identity.id;
        let addr = self.ctx.locator.locate(identity_id);
        let backend_err = move |source: HandshakeError| SessionError::Backend {
            identity_id,
            addr,
            source,
        };

        // The matcher never returns an identity without a secret.
        let secret = identity.secret.as_ref().ok_or(SessionError::NoMatch)?;
        let credential =
            derive_credential_with_label(secret.as_bytes(), &self.ctx.config.credential_label)
                .map_err(|e| backend_err(e.into()))?;

        let mut back = connect_backend(addr, self.ctx.config.connect_timeout)
            .await
            .map_err(backend_err)?;
        let backend_version = authenticate_backend(&mut back, &credential, step)
            .await
            .map_err(backend_err)?;
        debug!(%backend_version, %addr, "backend authenticated");

        Ok((identity, back))
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "session state");
            self.state = next;
        }
    }
}

fn log_failure(err: &SessionError) {
    match err {
        SessionError::Front(e) if e.is_disconnect() => debug!("viewer disconnected: {}", e),
        SessionError::Front(e) => warn!("viewer handshake failed: {}", e),
        SessionError::NoMatch => info!("authentication failed: no matching identity"),
        SessionError::Roster(e) => warn!("roster unavailable: {}", e),
        SessionError::Backend { identity_id, addr, source } => {
            warn!(identity_id, %addr, "backend handshake failed: {}", source)
        }
        SessionError::HandshakeTimeout(limit) => warn!("authentication timed out after {:?}", limit),
        SessionError::Shutdown => debug!("closed by shutdown"),
    }
}
