use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::feed::{self, DecodeError, FeedEntry, FeedSource, FetchError, HttpFeedSource};
use crate::queue::MessageQueue;
use crate::storage::{with_deadline, NewNewsItem, NewsStore, StoreError};

// ============================================================================
// Error Types
// ============================================================================

/// Why one polling attempt produced no entries.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
}

/// Terminal failure of the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("feed polling failed {attempts} times in a row: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: IngestError,
    },
}

// ============================================================================
// Policy & State
// ============================================================================

/// What to do once a cycle has used up all of its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnRetriesExhausted {
    /// Stop the scheduler with [`SchedulerError::RetriesExhausted`].
    #[default]
    Terminate,
    /// Give up on this cycle and wait for the next refresh tick.
    SkipCycle,
}

/// Bounded retry with a fixed backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt of a cycle.
    pub max_retries: u32,
    pub backoff: Duration,
    pub on_exhausted: OnRetriesExhausted,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(30),
            on_exhausted: OnRetriesExhausted::Terminate,
        }
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Polling,
    /// Waiting out the backoff after the `retry`-th failed attempt.
    BackingOff { retry: u32 },
    /// Waiting for the next refresh tick.
    Idle,
    Stopped,
}

/// Outcome of one successful cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Entries the feed announced
    pub parsed: usize,
    pub saved: usize,
    /// Entries whose link was already stored
    pub skipped: usize,
    /// Entries rejected or lost to a store failure
    pub failed: usize,
    /// Saved entries whose link could not be published
    pub unpublished: usize,
}

// ============================================================================
// Scheduler
// ============================================================================

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_STORE_DEADLINE: Duration = Duration::from_secs(3);

/// Periodically pulls the feed, stores new items and announces them on the queue.
pub struct IngestScheduler {
    source: Arc<dyn FeedSource>,
    store: Arc<dyn NewsStore>,
    queue: Arc<dyn MessageQueue>,
    refresh_interval: Duration,
    retry: RetryPolicy,
    store_deadline: Duration,
    state: watch::Sender<SchedulerState>,
}

impl IngestScheduler {
    /// Poll `feed_url` over HTTP with `client`.
    pub fn new(
        client: reqwest::Client,
        feed_url: impl Into<String>,
        store: Arc<dyn NewsStore>,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        Self::with_source(Arc::new(HttpFeedSource::new(client, feed_url)), store, queue)
    }

    pub fn with_source(
        source: Arc<dyn FeedSource>,
        store: Arc<dyn NewsStore>,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Polling);
        Self {
            source,
            store,
            queue,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            retry: RetryPolicy::default(),
            store_deadline: DEFAULT_STORE_DEADLINE,
            state,
        }
    }

    /// Zero is raised to one millisecond; `tokio::time::interval` rejects it.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_store_deadline(mut self, deadline: Duration) -> Self {
        self.store_deadline = deadline;
        self
    }

    /// Watch the scheduler's state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_replace(state);
    }

    /// Run until `shutdown` is cancelled or retries are exhausted.
    ///
    /// The first cycle starts immediately. Backoff waits do not reset the
    /// refresh timer, so a slow cycle is followed by the next tick as soon
    /// as it is due.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), SchedulerError> {
        tracing::info!(
            feed_url = %self.source.location(),
            interval = ?self.refresh_interval,
            "Starting ingestion scheduler"
        );

        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                _ = ticker.tick() => {}
            }

            match self.poll_with_retry(&shutdown).await {
                Ok(Some(report)) => {
                    tracing::info!(
                        saved = report.saved,
                        skipped = report.skipped,
                        failed = report.failed,
                        "Ingestion cycle complete"
                    );
                }
                Ok(None) => break Ok(()),
                Err(e) => match self.retry.on_exhausted {
                    OnRetriesExhausted::Terminate => {
                        tracing::error!(error = %e, "Feed polling retries exhausted, stopping scheduler");
                        break Err(e);
                    }
                    OnRetriesExhausted::SkipCycle => {
                        tracing::error!(error = %e, "Feed polling retries exhausted, skipping cycle");
                    }
                },
            }
            self.set_state(SchedulerState::Idle);
        };

        self.set_state(SchedulerState::Stopped);
        tracing::info!("Ingestion scheduler stopped");
        result
    }

    /// One cycle with retries. `Ok(None)` means shutdown interrupted the backoff.
    async fn poll_with_retry(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<Option<CycleReport>, SchedulerError> {
        let mut retry: u32 = 0;
        loop {
            self.set_state(SchedulerState::Polling);
            let error = match self.run_cycle().await {
                Ok(report) => return Ok(Some(report)),
                Err(e) => e,
            };

            if retry >= self.retry.max_retries {
                return Err(SchedulerError::RetriesExhausted {
                    attempts: retry + 1,
                    source: error,
                });
            }
            retry += 1;

            tracing::warn!(
                error = %error,
                retry = retry,
                max_retries = self.retry.max_retries,
                backoff = ?self.retry.backoff,
                "Feed poll failed, backing off"
            );
            self.set_state(SchedulerState::BackingOff { retry });

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(None),
                _ = tokio::time::sleep(self.retry.backoff) => {}
            }
        }
    }

    /// Fetch and decode the feed once, then store every entry.
    ///
    /// Per-entry problems never fail the cycle; only fetch and decode errors do.
    pub async fn run_cycle(&self) -> Result<CycleReport, IngestError> {
        tracing::debug!(feed_url = %self.source.location(), "Polling feed");
        let body = self.source.pull().await?;
        let entries = feed::decode(&body)?;
        tracing::info!(count = entries.len(), "Parsed feed entries");

        let mut report = CycleReport {
            parsed: entries.len(),
            ..CycleReport::default()
        };
        for entry in entries {
            self.store_entry(entry, &mut report).await;
        }
        Ok(report)
    }

    async fn store_entry(&self, entry: FeedEntry, report: &mut CycleReport) {
        let item = NewNewsItem {
            title: entry.title,
            link: entry.link,
            published: Some(Utc::now()),
        };

        match with_deadline(self.store_deadline, self.store.create(&item)).await {
            Ok(id) => {
                report.saved += 1;
                tracing::debug!(id = id, link = %item.link, "Saved news item");
                if let Err(e) = self.queue.publish(item.link.as_bytes()).await {
                    report.unpublished += 1;
                    tracing::error!(link = %item.link, error = %e, "Failed to publish link to queue");
                }
            }
            Err(StoreError::Conflict) => {
                report.skipped += 1;
                tracing::debug!(link = %item.link, "Item already exists");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(link = %item.link, error = %e, "Failed to save item");
            }
        }
    }
}
