use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::content::{Enricher, Enrichment, DESCRIPTION, IMAGE};
use crate::feed::FetchError;
use crate::queue::Consumer;
use crate::storage::{with_deadline, NewsItem, NewsStore, StoreError};

use super::scheduler::DEFAULT_STORE_DEADLINE;

/// Pause after a failed queue receive before trying again.
const RECV_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Why one message did not lead to an update.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("message is not a UTF-8 link")]
    InvalidPayload,
    #[error("no stored item for link {0}")]
    UnknownLink(String),
    #[error("item {0} was removed before it could be updated")]
    Vanished(i64),
    #[error("page fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Tallies kept while the worker runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub received: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Consumes published links and writes scraped fields back to the stored items.
///
/// Messages are handled strictly one at a time, in delivery order.
pub struct EnrichmentWorker {
    store: Arc<dyn NewsStore>,
    enricher: Arc<dyn Enricher>,
    store_deadline: Duration,
}

impl EnrichmentWorker {
    pub fn new(store: Arc<dyn NewsStore>, enricher: Arc<dyn Enricher>) -> Self {
        Self {
            store,
            enricher,
            store_deadline: DEFAULT_STORE_DEADLINE,
        }
    }

    pub fn with_store_deadline(mut self, deadline: Duration) -> Self {
        self.store_deadline = deadline;
        self
    }

    /// Run until the queue is closed and drained or `shutdown` is cancelled.
    ///
    /// A message in progress is finished before cancellation is observed.
    pub async fn run(
        &self,
        mut consumer: Box<dyn Consumer>,
        shutdown: CancellationToken,
    ) -> WorkerStats {
        tracing::info!("Starting enrichment worker");
        let mut stats = WorkerStats::default();

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = consumer.recv() => received,
            };

            let payload = match received {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    tracing::info!("Queue closed, no more links to enrich");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to receive from queue");
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECV_ERROR_PAUSE) => continue,
                    }
                }
            };

            stats.received += 1;
            match self.process(&payload).await {
                Ok(applied) => {
                    stats.updated += 1;
                    tracing::debug!(applied = applied, "Enrichment applied");
                }
                Err(EnrichError::UnknownLink(link)) => {
                    stats.failed += 1;
                    tracing::warn!(link = %link, "Item not found, skipping enrichment");
                }
                Err(EnrichError::Vanished(id)) => {
                    stats.failed += 1;
                    tracing::warn!(id = id, "Item removed during enrichment, update dropped");
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::error!(error = %e, "Failed to enrich item");
                }
            }
        }

        tracing::info!(
            received = stats.received,
            updated = stats.updated,
            failed = stats.failed,
            "Enrichment worker stopped"
        );
        stats
    }

    /// Enrich the item whose link is `payload`. Returns the number of fields applied.
    pub async fn process(&self, payload: &[u8]) -> Result<usize, EnrichError> {
        let link = std::str::from_utf8(payload).map_err(|_| EnrichError::InvalidPayload)?;
        tracing::debug!(link = %link, "Enriching item");

        let lookup = with_deadline(self.store_deadline, self.store.get_by_link(link)).await;
        let mut item = match lookup {
            Ok(item) => item,
            Err(StoreError::NotFound) => return Err(EnrichError::UnknownLink(link.to_string())),
            Err(e) => return Err(e.into()),
        };

        let enrichment = self.enricher.enrich(&item.link).await?;
        let applied = merge(&mut item, enrichment);

        match with_deadline(self.store_deadline, self.store.update(&item)).await {
            Ok(()) => Ok(applied),
            Err(StoreError::NotFound) => Err(EnrichError::Vanished(item.id)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Copy extracted fields onto the item. Fields are only ever filled, never cleared.
fn merge(item: &mut NewsItem, enrichment: Enrichment) -> usize {
    let mut applied = 0;
    for (field, value) in enrichment {
        if value.is_empty() {
            continue;
        }
        match field {
            DESCRIPTION => item.description = value,
            IMAGE => item.image = value,
            other => {
                tracing::debug!(field = other, "No stored column for enrichment field");
                continue;
            }
        }
        applied += 1;
    }
    applied
}
