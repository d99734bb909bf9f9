//! News persistence.
//!
//! A single `news` table keyed by a never-reused numeric id, with a
//! uniqueness constraint on `link` that provides dedup-on-write for the
//! ingestion scheduler. Callers depend on the [`NewsStore`] contract;
//! [`Database`] is the SQLite implementation.

mod news;
mod schema;
mod types;

pub use news::{with_deadline, NewsStore};
pub use schema::Database;
pub use types::{NewNewsItem, NewsItem, NewsPage, StoreError};
