//! Admission control for builds.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// The gate was closed while waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("build gate is closed")]
pub struct GateClosed;

/// Fixed-size pool of build slots.
///
/// Cloning shares the pool. Waiters are served in the order the semaphore
/// queues them.
#[derive(Debug, Clone)]
pub struct BuildGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl BuildGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot. The slot is returned when the [`BuildSlot`] drops.
    pub async fn acquire(&self) -> Result<BuildSlot, GateClosed> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map(|permit| BuildSlot { _permit: permit })
            .map_err(|_| GateClosed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Stop admitting builds. Current waiters and later callers get
    /// [`GateClosed`]; slots already held stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

impl Default for BuildGate {
    fn default() -> Self {
        Self::new(5)
    }
}

/// A held build slot.
#[derive(Debug)]
pub struct BuildSlot {
    _permit: OwnedSemaphorePermit,
}
