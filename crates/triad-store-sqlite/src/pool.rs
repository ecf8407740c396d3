//! Lazily created connection pool and one-shot schema migration.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::{Mutex, RwLock};
use triad_storage::StoreError;

use crate::retry::map_sqlx;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Runs the embedded migrations at most once.
///
/// Shared between stores that point at the same database so the schema is
/// checked a single time per process, and never through global state.
#[derive(Debug, Default)]
pub struct SchemaGuard {
    done: Mutex<bool>,
}

impl SchemaGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ensure(&self, pool: &SqlitePool) -> Result<(), StoreError> {
        let mut done = self.done.lock().await;
        if *done {
            return Ok(());
        }
        MIGRATOR
            .run(pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        tracing::debug!("schema migrations applied");
        *done = true;
        Ok(())
    }

    pub async fn is_done(&self) -> bool {
        *self.done.lock().await
    }
}

/// Owns the pool. Creation is lazy and mutex-guarded; a pool that produced a
/// transient error can be invalidated and is rebuilt on next use.
pub struct ConnectionManager {
    options: SqliteConnectOptions,
    max_connections: u32,
    acquire_timeout: Duration,
    in_memory: bool,
    pool: RwLock<Option<SqlitePool>>,
    create: Mutex<()>,
    schema: Arc<SchemaGuard>,
}

impl ConnectionManager {
    pub fn new(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
        schema: Arc<SchemaGuard>,
    ) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(acquire_timeout);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        Ok(Self {
            options,
            // Each in-memory connection is its own database.
            max_connections: if in_memory { 1 } else { max_connections.max(1) },
            acquire_timeout,
            in_memory,
            pool: RwLock::new(None),
            create: Mutex::new(()),
            schema,
        })
    }

    pub fn is_in_memory(&self) -> bool {
        self.in_memory
    }

    pub fn schema(&self) -> &Arc<SchemaGuard> {
        &self.schema
    }

    /// Current pool, creating it (and applying migrations) on first use.
    pub async fn pool(&self) -> Result<SqlitePool, StoreError> {
        if let Some(pool) = self.pool.read().await.as_ref() {
            return Ok(pool.clone());
        }

        let _creating = self.create.lock().await;
        if let Some(pool) = self.pool.read().await.as_ref() {
            return Ok(pool.clone());
        }

        let mut builder = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout);
        if self.in_memory {
            builder = builder.idle_timeout(None).max_lifetime(None);
        }
        let pool = builder
            .connect_with(self.options.clone())
            .await
            .map_err(map_sqlx)?;
        self.schema.ensure(&pool).await?;

        tracing::debug!(max_connections = self.max_connections, "sqlite pool created");
        *self.pool.write().await = Some(pool.clone());
        Ok(pool)
    }

    /// Drop the current pool so the next call to [`pool`](Self::pool) rebuilds it.
    /// In-memory databases are kept: recreating them would discard their contents.
    pub async fn invalidate(&self) {
        if self.in_memory {
            return;
        }
        if let Some(old) = self.pool.write().await.take() {
            tracing::warn!("invalidating sqlite pool after transient error");
            // Closing waits for checked-out connections; don't block the caller on it.
            tokio::spawn(async move { old.close().await });
        }
    }

    pub async fn close(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
    }
}
