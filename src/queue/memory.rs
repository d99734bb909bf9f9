use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::{Consumer, MessageQueue, QueueError};

/// Bounded in-process queue.
///
/// Publishing waits while the queue is full, so a slow worker applies
/// backpressure to ingestion instead of dropping messages.
pub struct MemoryQueue {
    tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
}

impl MemoryQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<Vec<u8>>> {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn publish(&self, payload: &[u8]) -> Result<(), QueueError> {
        let tx = self.sender().ok_or(QueueError::Closed)?;
        tx.send(payload.to_vec())
            .await
            .map_err(|_| QueueError::Closed)
    }

    async fn consume(&self) -> Result<Box<dyn Consumer>, QueueError> {
        let rx = self
            .rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(QueueError::AlreadyConsumed)?;
        Ok(Box::new(MemoryConsumer { rx }))
    }

    async fn close(&self) -> Result<(), QueueError> {
        // Dropping the sender ends the stream once buffered messages drain
        if self
            .tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
        {
            tracing::info!("Memory queue closed");
        }
        Ok(())
    }
}

struct MemoryConsumer {
    rx: mpsc::Receiver<Vec<u8>>,
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, QueueError> {
        Ok(self.rx.recv().await)
    }
}
