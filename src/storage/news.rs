use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::time::Duration;

use super::schema::Database;
use super::types::{NewNewsItem, NewsItem, NewsPage, NewsPageRow, StoreError};

/// Store boundary consumed by the ingestion pipeline and the read API.
///
/// Implementations enforce link uniqueness themselves (dedup-on-write):
/// callers never check for existence before `create`.
#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Insert a new item and return its identifier.
    ///
    /// Returns `StoreError::Conflict` when the link is already stored and
    /// `StoreError::Invalid` when title or link is empty.
    async fn create(&self, item: &NewNewsItem) -> Result<i64, StoreError>;

    /// Look an item up by its link.
    async fn get_by_link(&self, link: &str) -> Result<NewsItem, StoreError>;

    /// Look an item up by its identifier.
    async fn get_by_id(&self, id: i64) -> Result<NewsItem, StoreError>;

    /// Overwrite the mutable fields of an existing item, matched by id.
    async fn update(&self, item: &NewsItem) -> Result<(), StoreError>;

    /// Newest-first page of items plus the total number of stored items.
    async fn list(&self, limit: i64, offset: i64) -> Result<NewsPage, StoreError>;
}

/// Run a store call under a caller-supplied deadline.
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(deadline, call)
        .await
        .map_err(|_| StoreError::Timeout(deadline))?
}

const NEWS_COLUMNS: &str = "id, title, link, published, description, image";

#[async_trait]
impl NewsStore for Database {
    async fn create(&self, item: &NewNewsItem) -> Result<i64, StoreError> {
        if item.title.trim().is_empty() {
            return Err(StoreError::Invalid("title is empty"));
        }
        if item.link.trim().is_empty() {
            return Err(StoreError::Invalid("link is empty"));
        }

        let published = item.published.unwrap_or_else(Utc::now);
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO news (title, link, published)
            VALUES (?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(&item.title)
        .bind(&item.link)
        .bind(published)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(id)
    }

    async fn get_by_link(&self, link: &str) -> Result<NewsItem, StoreError> {
        sqlx::query_as::<_, NewsItem>(&format!("SELECT {NEWS_COLUMNS} FROM news WHERE link = ?"))
            .bind(link)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_id(&self, id: i64) -> Result<NewsItem, StoreError> {
        sqlx::query_as::<_, NewsItem>(&format!("SELECT {NEWS_COLUMNS} FROM news WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, item: &NewsItem) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE news
            SET title = ?, link = ?, description = ?, image = ?
            WHERE id = ?
        "#,
        )
        .bind(&item.title)
        .bind(&item.link)
        .bind(&item.description)
        .bind(&item.image)
        .bind(item.id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<NewsPage, StoreError> {
        tracing::debug!(limit = limit, offset = offset, "Listing news page");

        // COUNT(*) OVER() carries the table size on every row, so a page past
        // the end has no rows and therefore reports a total of zero.
        let rows = sqlx::query_as::<_, NewsPageRow>(&format!(
            r#"
            SELECT COUNT(*) OVER() AS total, {NEWS_COLUMNS}
            FROM news
            ORDER BY published DESC, id DESC
            LIMIT ? OFFSET ?
        "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = rows.first().map(|r| r.total).unwrap_or(0);
        Ok(NewsPage {
            items: rows.into_iter().map(|r| r.item).collect(),
            total,
        })
    }
}
