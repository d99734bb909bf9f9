//! Message queue boundary between the ingestion scheduler and the
//! enrichment worker.
//!
//! The contract is an ordered, at-least-once stream of opaque byte payloads
//! that is acknowledged on receipt: once [`Consumer::recv`] hands a message
//! out, the queue forgets it. A consumer that crashes before finishing its
//! work therefore drops that message, which is acceptable for best-effort,
//! idempotent enrichment.
//!
//! Two transports implement the contract:
//!
//! - [`MemoryQueue`] - bounded in-process channel, used by tests and
//!   single-process deployments that can afford to lose pending work on restart
//! - [`SqliteQueue`] - durable table-backed queue that survives restarts

mod memory;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

/// Errors raised by queue transports.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue was closed; nothing more can be published
    #[error("queue is closed")]
    Closed,
    /// The transport only supports a single consumer and it is taken
    #[error("queue already has a consumer")]
    AlreadyConsumed,
    /// The underlying storage failed
    #[error("queue backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

/// Producer side of the queue plus lifecycle control.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append a message to the tail of the queue.
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError>;

    /// Open a consumer that yields messages in publish order.
    async fn consume(&self) -> Result<Box<dyn Consumer>, QueueError>;

    /// Stop accepting messages and release the transport.
    ///
    /// Consumers drain what is already delivered to them and then see the end
    /// of the stream. Closing an already closed queue is not an error.
    async fn close(&self) -> Result<(), QueueError>;
}

/// Receiving side of the queue.
#[async_trait]
pub trait Consumer: Send {
    /// Wait for the next message.
    ///
    /// Returns `Ok(None)` once the queue is closed and nothing is left to
    /// deliver. The message is acknowledged as soon as it is returned.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, QueueError>;
}
