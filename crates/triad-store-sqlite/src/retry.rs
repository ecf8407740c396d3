//! Error classification and the retry policy for store operations.

use std::time::Duration;

use triad_storage::StoreError;

// SQLite primary result codes (extended codes carry them in the low byte).
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

/// How store operations are retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `backoff_step * n`.
    pub backoff_step: Duration,
    /// Deadline for a single attempt.
    pub statement_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_millis(100),
            statement_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

/// Map a sqlx error onto the storage error space.
///
/// Connection-level failures and lock contention are `Transient` and will be
/// retried; unique violations become `AlreadyExists`; everything else is a
/// permanent `Backend` error.
pub(crate) fn map_sqlx(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Transient(e.to_string()),
        sqlx::Error::Database(db) => {
            if db.is_unique_violation() {
                return StoreError::AlreadyExists;
            }
            let primary = db
                .code()
                .and_then(|code| code.parse::<i64>().ok())
                .map(|code| code & 0xff);
            match primary {
                Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => StoreError::Transient(e.to_string()),
                _ => StoreError::Backend(e.to_string()),
            }
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff_step: Duration::from_millis(50),
            statement_timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(50));
        assert_eq!(policy.delay_after(3), Duration::from_millis(150));
    }

    #[test]
    fn pool_errors_are_transient() {
        assert!(map_sqlx(sqlx::Error::PoolTimedOut).is_transient());
        assert!(map_sqlx(sqlx::Error::PoolClosed).is_transient());
        assert!(map_sqlx(sqlx::Error::WorkerCrashed).is_transient());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(map_sqlx(sqlx::Error::Io(io)).is_transient());
    }

    #[test]
    fn row_not_found_and_protocol_errors() {
        assert!(matches!(
            map_sqlx(sqlx::Error::RowNotFound),
            StoreError::NotFound
        ));
        assert!(matches!(
            map_sqlx(sqlx::Error::Protocol("bad".into())),
            StoreError::Backend(_)
        ));
    }

    #[tokio::test]
    async fn constraint_errors_are_classified() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT NOT NULL UNIQUE)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO t (v) VALUES ('a')")
            .execute(&pool)
            .await
            .unwrap();

        let dup = sqlx::query("INSERT INTO t (v) VALUES ('a')")
            .execute(&pool)
            .await
            .unwrap_err();
        assert!(matches!(map_sqlx(dup), StoreError::AlreadyExists));

        let not_null = sqlx::query("INSERT INTO t (v) VALUES (NULL)")
            .execute(&pool)
            .await
            .unwrap_err();
        assert!(matches!(map_sqlx(not_null), StoreError::Backend(_)));
    }
}
