use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors returned by the news store.
///
/// `Conflict` and `NotFound` are expected outcomes rather than failures:
/// ingestion counts conflicts as skipped items, and the read API maps
/// `NotFound` to its own "not found" response.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An item with the same link is already stored (unique constraint)
    #[error("item already exists")]
    Conflict,

    /// No item matches the requested id or link
    #[error("item not found")]
    NotFound,

    /// The item is missing a required field and was never sent to the database
    #[error("invalid item: {0}")]
    Invalid(&'static str),

    /// The caller-supplied deadline elapsed before the store answered
    #[error("store call exceeded deadline of {0:?}")]
    Timeout(std::time::Duration),

    /// Migration failed while opening the store
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Unclassified persistence failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, turning unique-constraint violations into `Conflict`.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Conflict,
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::Database(err),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A news item as stored.
///
/// `description` and `image` stay empty until the enrichment worker has
/// visited the item's link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct NewsItem {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub published: DateTime<Utc>,
    pub description: String,
    pub image: String,
}

/// A news item that has not been written yet.
#[derive(Debug, Clone)]
pub struct NewNewsItem {
    pub title: String,
    pub link: String,
    /// Defaults to the current time when absent
    pub published: Option<DateTime<Utc>>,
}

/// One page of rows plus the total row count of the whole table.
#[derive(Debug, Clone, Default)]
pub struct NewsPage {
    pub items: Vec<NewsItem>,
    pub total: i64,
}

/// Row type for the paginated list query (window count + item columns)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct NewsPageRow {
    pub total: i64,
    #[sqlx(flatten)]
    pub item: NewsItem,
}
