use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::Clock;
use exam_core::model::SessionRecord;
use sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{SESSION_KEY, SessionStore, StorageError, StoredSession};

mod migrate;

/// `SQLite`-backed session store; the durable backend for the runner.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
    clock: Clock,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    let message = e.to_string();
    if message.contains("database or disk is full") {
        return StorageError::QuotaExceeded;
    }
    StorageError::Connection(message)
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

impl SqliteSessionStore {
    /// Connect to `SQLite` using the given URL.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self {
            pool,
            clock: Clock::default(),
        })
    }

    /// Connect, creating the database file if needed, and run migrations.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations fail.
    pub async fn open(database_url: &str) -> Result<Self, SqliteInitError> {
        let url = if database_url.contains("mode=") || database_url.contains(":memory:") {
            database_url.to_owned()
        } else if database_url.contains('?') {
            format!("{database_url}&mode=rwc")
        } else {
            format!("{database_url}?mode=rwc")
        };
        let store = Self::connect(&url).await?;
        store.migrate().await?;
        Ok(store)
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let stored = StoredSession::wrap(record.clone());
        let payload = stored.to_json()?;

        sqlx::query(
            r"
                INSERT INTO session_store (key, payload, expires_at, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(key) DO UPDATE SET
                    payload = excluded.payload,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(SESSION_KEY)
        .bind(payload)
        .bind(stored.expires_at)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn load(&self) -> Result<Option<SessionRecord>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT payload, expires_at
                FROM session_store
                WHERE key = ?1
            ",
        )
        .bind(SESSION_KEY)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: DateTime<Utc> = row.try_get("expires_at").map_err(ser)?;
        if self.clock.now() >= expires_at {
            tracing::debug!(%expires_at, "dropping stale stored session");
            self.clear().await?;
            return Ok(None);
        }

        let payload: String = row.try_get("payload").map_err(ser)?;
        let stored = StoredSession::from_json(&payload)?;
        Ok(Some(stored.record))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM session_store WHERE key = ?1")
            .bind(SESSION_KEY)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqliteSessionStore>();
    }

    #[test]
    fn disk_full_maps_to_quota() {
        assert!(matches!(
            conn("database or disk is full"),
            StorageError::QuotaExceeded
        ));
        assert!(matches!(conn("locked"), StorageError::Connection(_)));
    }
}
