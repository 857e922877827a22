#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use deskgate_common::helpers::check_public_bind_allowed;
use deskgate_relay::config::{
    DEFAULT_BACKLOG, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DRAIN_TIMEOUT,
    DEFAULT_HANDSHAKE_TIMEOUT_MS, DEFAULT_LISTEN, DEFAULT_MAX_SESSIONS, DEFAULT_RELAY_CHUNK_SIZE,
    DEFAULT_STEP_TIMEOUT_MS,
};
use deskgate_relay::locator::{DEFAULT_BACKEND_PORT, DEFAULT_SERVICE_ID_OFFSET, MAX_NODE_ID};
use deskgate_relay::roster::DEFAULT_ROSTER_QUERY;
use deskgate_relay::{
    BackendAddressing, CachedRoster, FileRoster, PgRoster, RelayConfig, RelayServer,
    RosterProvider, ShutdownHandle,
};
use rfb_crypto::DEFAULT_CREDENTIAL_LABEL;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "deskgate-relay")]
#[command(about = "Authenticating VNC relay - matches viewers to identities and pipes them to per-identity desktops")]
struct Args {
    /// TCP listen address
    #[arg(long, env = "DESKGATE_LISTEN", default_value = DEFAULT_LISTEN)]
    listen: SocketAddr,

    /// Listen backlog
    #[arg(long, env = "DESKGATE_BACKLOG", default_value_t = DEFAULT_BACKLOG)]
    backlog: u32,

    /// Maximum concurrent sessions
    #[arg(long, env = "DESKGATE_MAX_SESSIONS", default_value_t = DEFAULT_MAX_SESSIONS)]
    max_sessions: usize,

    /// Port every backend desktop listens on
    #[arg(long, env = "DESKGATE_BACKEND_PORT", default_value_t = DEFAULT_BACKEND_PORT)]
    backend_port: u16,

    /// Node id encoded in backend addresses (0-15)
    #[arg(
        long,
        env = "DESKGATE_NODE_ID",
        default_value_t = 0,
        value_parser = clap::value_parser!(u8).range(0..=MAX_NODE_ID as i64)
    )]
    node_id: u8,

    #[arg(long, env = "DESKGATE_SERVICE_ID_OFFSET", default_value_t = DEFAULT_SERVICE_ID_OFFSET)]
    service_id_offset: i64,

    /// Label the backend credentials were provisioned with
    #[arg(long, env = "DESKGATE_CREDENTIAL_LABEL", default_value = DEFAULT_CREDENTIAL_LABEL)]
    credential_label: String,

    /// Timeout for each handshake read/write
    #[arg(long, env = "DESKGATE_STEP_TIMEOUT_MS", default_value_t = DEFAULT_STEP_TIMEOUT_MS)]
    step_timeout_ms: u64,

    /// Timeout for the whole authentication phase
    #[arg(long, env = "DESKGATE_HANDSHAKE_TIMEOUT_MS", default_value_t = DEFAULT_HANDSHAKE_TIMEOUT_MS)]
    handshake_timeout_ms: u64,

    /// Backend connect timeout
    #[arg(long, env = "DESKGATE_CONNECT_TIMEOUT_MS", default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    connect_timeout_ms: u64,

    /// Read size for the relay pump
    #[arg(long, env = "DESKGATE_RELAY_CHUNK_SIZE", default_value_t = DEFAULT_RELAY_CHUNK_SIZE)]
    relay_chunk_size: usize,

    /// Postgres URL of the identity roster
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Roster query (must return id, display_name, secret)
    #[arg(long, env = "DESKGATE_ROSTER_QUERY", default_value = DEFAULT_ROSTER_QUERY)]
    roster_query: String,

    /// JSON roster file, instead of a database
    #[arg(long, env = "DESKGATE_ROSTER_FILE")]
    roster_file: Option<PathBuf>,

    /// How long a roster snapshot may be reused (0 = query every connection)
    #[arg(long, env = "DESKGATE_ROSTER_TTL_MS", default_value_t = 0)]
    roster_ttl_ms: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            listen: self.listen,
            backlog: self.backlog,
            max_sessions: self.max_sessions,
            credential_label: self.credential_label.clone(),
            step_timeout: Duration::from_millis(self.step_timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            relay_chunk_size: self.relay_chunk_size,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    async fn roster(&self) -> Result<Arc<dyn RosterProvider>> {
        let inner: Arc<dyn RosterProvider> = match (&self.database_url, &self.roster_file) {
            (Some(url), None) => Arc::new(
                PgRoster::connect(url, self.roster_query.clone())
                    .await
                    .context("roster database")?,
            ),
            (None, Some(path)) => Arc::new(FileRoster::new(path)),
            (Some(_), Some(_)) => bail!("--database-url and --roster-file are mutually exclusive"),
            (None, None) => bail!("one of --database-url or --roster-file is required"),
        };
        Ok(Arc::new(CachedRoster::new(
            inner,
            Duration::from_millis(self.roster_ttl_ms),
        )))
    }
}

async fn wait_for_signal(shutdown: ShutdownHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received Ctrl-C"),
                    _ = term.recv() => info!("received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("received Ctrl-C");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl-C");
    }
    shutdown.shutdown();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    deskgate_common::init_tracing_with_default(&format!("{},sqlx=warn", args.log_level));

    check_public_bind_allowed(args.listen, "DESKGATE_ALLOW_PUBLIC_BIND")?;

    info!("Starting deskgate-relay v{}", env!("CARGO_PKG_VERSION"));

    let roster = args.roster().await?;
    let locator = Arc::new(BackendAddressing::new(
        args.node_id,
        args.service_id_offset,
        args.backend_port,
    )?);

    let server = RelayServer::bind(args.relay_config(), roster, locator)
        .await
        .context("failed to start relay")?;
    tokio::spawn(wait_for_signal(server.shutdown_handle()));

    server.run().await?;
    info!("relay stopped");
    Ok(())
}
