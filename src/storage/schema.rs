use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StoreError;

// ============================================================================
// Database
// ============================================================================

/// SQLite-backed news store.
///
/// Cloning is cheap: clones share the same connection pool. The pool itself
/// serializes writers, so no extra locking is layered on top.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database shared by all pool
    /// connections, which is what the tests use.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        Self::open_with(path, 5).await
    }

    /// Like [`Database::open`] with an explicit pool size.
    pub async fn open_with(path: &str, max_connections: u32) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: the scheduler and the enrichment worker write
        // concurrently, SQLite waits up to 5 seconds for the lock instead of
        // failing with SQLITE_BUSY. Set via pragma() so every pooled connection
        // inherits it.
        let options = SqliteConnectOptions::from_str(&url)?.pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate()
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        tracing::debug!(path = %path, "News store opened");
        Ok(db)
    }

    /// Run schema migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // AUTOINCREMENT: identifiers are never reused, even after deletes
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                link TEXT NOT NULL UNIQUE,
                published TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                description TEXT NOT NULL DEFAULT '',
                image TEXT NOT NULL DEFAULT ''
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_news_published ON news(published DESC)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Close every pooled connection.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn close(&self) {
        if self.pool.is_closed() {
            tracing::debug!("News store already closed");
            return;
        }
        self.pool.close().await;
        tracing::info!("News store closed");
    }
}
