//! SQLite cache store.

use super::CacheStore;
use async_trait::async_trait;
use chrono::Utc;
use ragline_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Cache entries in a single table; expiry is unix milliseconds.
pub struct SqliteCacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::CacheUnavailable(format!("Failed to create cache directory: {}", e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::CacheUnavailable(format!("Failed to open SQLite cache: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS response_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_response_cache_expiry ON response_cache(expires_at);
            "#,
        )
        .map_err(|e| AppError::CacheUnavailable(format!("Failed to create cache table: {}", e)))?;

        tracing::debug!("Opened SQLite cache at {:?}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Delete expired rows. Returns how many were removed.
    pub async fn purge_expired(&self) -> AppResult<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM response_cache WHERE expires_at <= ?1",
                params![Utc::now().timestamp_millis()],
            )
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| AppError::CacheUnavailable("SQLite cache lock poisoned".to_string()))?;
            f(&conn).map_err(|e| AppError::CacheUnavailable(format!("SQLite cache error: {}", e)))
        })
        .await
        .map_err(|e| AppError::CacheUnavailable(format!("SQLite cache task failed: {}", e)))?
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().timestamp_millis();
            let row: Option<(String, i64)> = conn
                .query_row(
                    "SELECT value, expires_at FROM response_cache WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
                Some(_) => {
                    conn.execute("DELETE FROM response_cache WHERE key = ?1", params![key])?;
                    Ok(None)
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        let expires_at = Utc::now().timestamp_millis() + ttl.as_millis() as i64;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO response_cache (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, expires_at],
            )
            .map(|_| ())
        })
        .await
    }
}
