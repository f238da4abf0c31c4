//! Admission control for sandbox executions
//!
//! Limits how many sandboxes may run at the same time.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("server busy: no execution slot became free within {waited:?}")]
    Busy { waited: Duration },
}

/// Bounded pool of execution permits
///
/// Cloning the gate shares the same pool.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    /// Number of permits in the pool
    capacity: usize,

    /// Semaphore holding the permits
    semaphore: Arc<Semaphore>,
}

impl AdmissionGate {
    /// Create a gate with `capacity` permits
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Wait up to `max_wait` for a permit
    #[instrument(skip(self))]
    pub async fn acquire(&self, max_wait: Duration) -> Result<Permit, GateError> {
        let acquire = self.semaphore.clone().acquire_owned();
        // The semaphore is private to the gate and never closed
        let Ok(Ok(permit)) = tokio::time::timeout(max_wait, acquire).await else {
            debug!(?max_wait, "no permit available");
            return Err(GateError::Busy { waited: max_wait });
        };

        debug!(available = self.available(), "acquired execution permit");
        Ok(Permit { _permit: permit })
    }

    /// Get the number of free permits
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the number of permits currently held
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// Get the total number of permits
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Exclusive right to run one sandbox
///
/// The permit goes back to the gate when this value is released or dropped,
/// which also covers early returns and panics.
#[derive(Debug)]
#[must_use = "dropping the permit releases it immediately"]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
}

impl Permit {
    /// Return the permit to the gate
    pub fn release(self) {
        drop(self);
    }
}
