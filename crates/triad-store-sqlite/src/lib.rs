//! SQLite backend for triad: implements `triad_storage::Store` and
//! `triad_audit::EventLog` on one database.
//!
//! Every operation goes through [`SqliteStore::run`], which applies a per-attempt
//! deadline and retries transient failures with linear backoff, rebuilding the
//! connection pool in between.

use std::future::Future;
use std::sync::Arc;

use sqlx::SqlitePool;
use triad_storage::StoreError;

#[macro_use]
mod rows;
mod events;
mod pool;
mod retry;
mod store;

pub use pool::{ConnectionManager, SchemaGuard};
pub use retry::RetryPolicy;

/// Knobs for opening a store.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    pub max_connections: u32,
    pub retry: RetryPolicy,
    /// Share one guard between stores on the same database to migrate once.
    pub schema: Option<Arc<SchemaGuard>>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            retry: RetryPolicy::default(),
            schema: None,
        }
    }
}

pub struct SqliteStore {
    conn: ConnectionManager,
    retry: RetryPolicy,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        Self::open_with(url, StoreOptions::default()).await
    }

    /// Open a store and eagerly create the pool so configuration errors surface here.
    pub async fn open_with(url: &str, options: StoreOptions) -> Result<Self, StoreError> {
        let schema = options
            .schema
            .unwrap_or_else(|| Arc::new(SchemaGuard::new()));
        let conn = ConnectionManager::new(
            url,
            options.max_connections,
            options.retry.statement_timeout,
            schema,
        )?;
        let store = Self {
            conn,
            retry: options.retry,
        };
        store.run("open", |_pool| async { Ok(()) }).await?;
        Ok(store)
    }

    pub async fn close(&self) {
        self.conn.close().await;
    }

    /// Run `op` against the current pool under the retry policy.
    ///
    /// `op` is invoked once per attempt and must be safe to repeat: inserts use
    /// caller-chosen ids and status changes are compare-and-set.
    pub(crate) async fn run<T, F, Fut>(&self, name: &'static str, op: F) -> Result<T, StoreError>
    where
        F: Fn(SqlitePool) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            let result = match self.conn.pool().await {
                Ok(pool) => match tokio::time::timeout(self.retry.statement_timeout, op(pool)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::Transient(format!(
                        "deadline of {:?} elapsed",
                        self.retry.statement_timeout
                    ))),
                },
                Err(e) => Err(e),
            };

            match result {
                Err(e) if e.is_transient() => {
                    self.conn.invalidate().await;
                    if attempt >= self.retry.max_attempts {
                        tracing::error!(op = name, attempts = attempt, error = %e, "store retries exhausted");
                        return Err(e);
                    }
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        op = name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient store error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
