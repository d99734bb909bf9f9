//! The two long-running halves of ingestion.
//!
//! [`IngestScheduler`] polls the feed on a timer, stores unseen items and
//! publishes their links. [`EnrichmentWorker`] consumes those links and fills
//! in each item's description and image. The queue is their only point of
//! contact; both stop when the shared cancellation token fires.

mod scheduler;
mod worker;

pub use scheduler::{
    CycleReport, IngestError, IngestScheduler, OnRetriesExhausted, RetryPolicy, SchedulerError,
    SchedulerState, DEFAULT_REFRESH_INTERVAL, DEFAULT_STORE_DEADLINE,
};
pub use worker::{EnrichError, EnrichmentWorker, WorkerStats};
