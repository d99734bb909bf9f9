use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::{Consumer, MessageQueue, QueueError};

/// Durable queue stored in a SQLite table.
///
/// Each message is one row. A consumer claims the oldest row of its queue
/// with a single `DELETE ... RETURNING`, which is the acknowledgement: the
/// row is gone the moment the payload is handed out. When the queue is empty
/// consumers poll at `poll_interval`.
#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
    name: String,
    poll_interval: Duration,
}

impl SqliteQueue {
    /// Open (or create) the queue database at `path` and bind to queue `name`.
    pub async fn open(path: &str, name: &str, poll_interval: Duration) -> Result<Self, QueueError> {
        let url = format!("sqlite:{}?mode=rwc", path);
        let options = SqliteConnectOptions::from_str(&url)?.pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                queue TEXT NOT NULL,
                payload BLOB NOT NULL,
                enqueued_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_queue_messages_queue ON queue_messages(queue, id)",
        )
        .execute(&pool)
        .await?;

        tracing::debug!(path = %path, queue = %name, "SQLite queue opened");
        Ok(Self {
            pool,
            name: name.to_string(),
            poll_interval: poll_interval.max(Duration::from_millis(10)),
        })
    }

    /// Number of messages waiting in this queue.
    pub async fn pending(&self) -> Result<i64, QueueError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM queue_messages WHERE queue = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await
            .map_err(map_closed)?;
        Ok(count)
    }
}

fn map_closed(err: sqlx::Error) -> QueueError {
    match err {
        sqlx::Error::PoolClosed => QueueError::Closed,
        other => QueueError::Backend(other),
    }
}

#[async_trait]
impl MessageQueue for SqliteQueue {
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError> {
        if self.pool.is_closed() {
            return Err(QueueError::Closed);
        }
        sqlx::query("INSERT INTO queue_messages (queue, payload, enqueued_at) VALUES (?, ?, ?)")
            .bind(&self.name)
            .bind(payload)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(map_closed)?;
        Ok(())
    }

    async fn consume(&self) -> Result<Box<dyn Consumer>, QueueError> {
        if self.pool.is_closed() {
            return Err(QueueError::Closed);
        }
        Ok(Box::new(SqliteConsumer {
            queue: self.clone(),
        }))
    }

    async fn close(&self) -> Result<(), QueueError> {
        if !self.pool.is_closed() {
            self.pool.close().await;
            tracing::info!(queue = %self.name, "SQLite queue closed");
        }
        Ok(())
    }
}

struct SqliteConsumer {
    queue: SqliteQueue,
}

impl SqliteConsumer {
    async fn claim_next(&self) -> Result<Option<Vec<u8>>, sqlx::Error> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            r#"
            DELETE FROM queue_messages
            WHERE id = (
                SELECT id FROM queue_messages WHERE queue = ? ORDER BY id LIMIT 1
            )
            RETURNING payload
        "#,
        )
        .bind(&self.queue.name)
        .fetch_optional(&self.queue.pool)
        .await?;
        Ok(row.map(|(payload,)| payload))
    }
}

#[async_trait]
impl Consumer for SqliteConsumer {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, QueueError> {
        loop {
            if self.queue.pool.is_closed() {
                return Ok(None);
            }
            match self.claim_next().await {
                Ok(Some(payload)) => return Ok(Some(payload)),
                Ok(None) => tokio::time::sleep(self.queue.poll_interval).await,
                Err(sqlx::Error::PoolClosed) => return Ok(None),
                Err(e) => return Err(QueueError::Backend(e)),
            }
        }
    }
}
