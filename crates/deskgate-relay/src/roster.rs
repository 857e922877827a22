//! Identity roster access.
//!
//! The roster is owned by the web application; the relay only ever reads a
//! snapshot of it, once per connection attempt. Providers must tolerate
//! concurrent `list` calls from any number of sessions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use deskgate_common::{Error, Result};
use serde::Deserialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::RwLock;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Query used when none is configured. Must yield `id BIGINT`,
/// `display_name TEXT` and a nullable `secret TEXT`.
pub const DEFAULT_ROSTER_QUERY: &str =
    "SELECT id::BIGINT AS id, display_name, secret FROM desktop_roster";

/// Opaque per-identity secret. Zeroized on drop, never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct IdentitySecret(Vec<u8>);

impl IdentitySecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for IdentitySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdentitySecret(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub display_name: String,
    /// `None` when the identity has no provisioned backend credential yet.
    pub secret: Option<IdentitySecret>,
}

impl Identity {
    pub fn new(id: i64, display_name: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            secret: Some(IdentitySecret::new(secret)),
        }
    }

    /// An identity that exists but has no backend credential.
    pub fn unprovisioned(id: i64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            secret: None,
        }
    }
}

/// Row shape shared by the JSON file format and the SQL query.
#[derive(Debug, Deserialize, sqlx::FromRow)]
struct IdentityRecord {
    id: i64,
    display_name: String,
    secret: Option<String>,
}

impl From<IdentityRecord> for Identity {
    fn from(record: IdentityRecord) -> Self {
        Self {
            id: record.id,
            display_name: record.display_name,
            secret: record
                .secret
                .filter(|s| !s.is_empty())
                .map(|s| IdentitySecret::new(s.into_bytes())),
        }
    }
}

/// Read-only source of identities.
#[async_trait]
pub trait RosterProvider: Send + Sync {
    /// Current snapshot of all known identities, in no particular order.
    async fn list(&self) -> Result<Vec<Identity>>;

    /// Human-readable description of the source, for logs.
    fn describe(&self) -> String;
}

/// Fixed in-memory roster.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    identities: Vec<Identity>,
}

impl StaticRoster {
    pub fn new(identities: Vec<Identity>) -> Self {
        Self { identities }
    }
}

#[async_trait]
impl RosterProvider for StaticRoster {
    async fn list(&self) -> Result<Vec<Identity>> {
        Ok(self.identities.clone())
    }

    fn describe(&self) -> String {
        format!("static roster ({} identities)", self.identities.len())
    }
}

/// JSON array of `{id, display_name, secret}` objects, re-read on every
/// `list` so edits take effect without a restart.
#[derive(Debug, Clone)]
pub struct FileRoster {
    path: PathBuf,
}

impl FileRoster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RosterProvider for FileRoster {
    async fn list(&self) -> Result<Vec<Identity>> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            Error::roster(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let records: Vec<IdentityRecord> = serde_json::from_slice(&raw).map_err(|e| {
            Error::roster(format!("failed to parse {}: {}", self.path.display(), e))
        })?;
        Ok(records.into_iter().map(Identity::from).collect())
    }

    fn describe(&self) -> String {
        format!("roster file {}", self.path.display())
    }
}

/// Postgres-backed roster. Each `list` is an independent query.
#[derive(Debug, Clone)]
pub struct PgRoster {
    pool: PgPool,
    query: String,
}

impl PgRoster {
    pub async fn connect(database_url: &str, query: impl Into<String>) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| Error::roster(format!("failed to connect to roster database: {e}")))?;
        Ok(Self::from_pool(pool, query))
    }

    pub fn from_pool(pool: PgPool, query: impl Into<String>) -> Self {
        Self {
            pool,
            query: query.into(),
        }
    }
}

#[async_trait]
impl RosterProvider for PgRoster {
    async fn list(&self) -> Result<Vec<Identity>> {
        let rows = sqlx::query_as::<_, IdentityRecord>(&self.query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::roster(format!("roster query failed: {e}")))?;
        Ok(rows.into_iter().map(Identity::from).collect())
    }

    fn describe(&self) -> String {
        "postgres roster".to_string()
    }
}

/// Caches snapshots of another provider for at most `ttl`. Roster changes
/// become visible within `ttl`; a zero ttl disables caching. Only identity
/// snapshots are cached, never anything derived from their secrets.
pub struct CachedRoster {
    inner: Arc<dyn RosterProvider>,
    ttl: Duration,
    snapshot: RwLock<Option<(Instant, Arc<Vec<Identity>>)>>,
}

impl CachedRoster {
    pub fn new(inner: Arc<dyn RosterProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    fn fresh(&self, entry: &Option<(Instant, Arc<Vec<Identity>>)>) -> Option<Arc<Vec<Identity>>> {
        match entry {
            Some((fetched_at, identities)) if fetched_at.elapsed() < self.ttl => {
                Some(identities.clone())
            }
            _ => None,
        }
    }
}

#[async_trait]
impl RosterProvider for CachedRoster {
    async fn list(&self) -> Result<Vec<Identity>> {
        if self.ttl.is_zero() {
            return self.inner.list().await;
        }

        if let Some(identities) = self.fresh(&*self.snapshot.read().await) {
            return Ok(identities.as_ref().clone());
        }

        // Query with no lock held; concurrent misses may each query.
        let identities = Arc::new(self.inner.list().await?);
        debug!(count = identities.len(), "refreshed roster snapshot");
        *self.snapshot.write().await = Some((Instant::now(), identities.clone()));
        Ok(identities.as_ref().clone())
    }

    fn describe(&self) -> String {
        format!("{} (cached {:?})", self.inner.describe(), self.ttl)
    }
}
