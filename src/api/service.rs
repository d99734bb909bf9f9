use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::pagination::{paginate, Filters, Metadata};
use crate::storage::{with_deadline, NewsItem, NewsStore, StoreError};

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("news item {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ReadError {
    fn from(err: StoreError) -> Self {
        ReadError::Store(err)
    }
}

/// One page of the news list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewsList {
    pub news: Vec<NewsItem>,
    pub metadata: Metadata,
}

/// Read-only view of the stored news for the rendering layers.
#[derive(Clone)]
pub struct NewsService {
    store: Arc<dyn NewsStore>,
    deadline: Duration,
}

impl NewsService {
    pub fn new(store: Arc<dyn NewsStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    /// Newest-first page of news. `filters` are normalized here.
    pub async fn list_news(&self, filters: Filters) -> Result<NewsList, ReadError> {
        let filters = filters.normalize();
        let page = with_deadline(
            self.deadline,
            self.store.list(filters.limit(), filters.offset()),
        )
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Failed to list news"))?;

        Ok(NewsList {
            metadata: paginate(page.total, filters.page, filters.page_size),
            news: page.items,
        })
    }

    pub async fn get_single_news(&self, id: i64) -> Result<NewsItem, ReadError> {
        match with_deadline(self.deadline, self.store.get_by_id(id)).await {
            Ok(item) => Ok(item),
            Err(StoreError::NotFound) => Err(ReadError::NotFound(id)),
            Err(e) => {
                tracing::error!(id = id, error = %e, "Failed to get news item");
                Err(e.into())
            }
        }
    }
}
