//! Admission control: a counting gate bounding total in-flight requests
//! across the whole pool.

use crate::errors::{PoolError, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting admission-control gate. Capacity is fixed for the pool lifetime.
///
/// No ordering fairness beyond eventual admission of all waiters.
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// RAII admission slot. The slot is returned on drop, so release happens on
/// every exit path including cancellation.
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Suspend until an admission slot is free.
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::GateClosed)?;
        Ok(GatePermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Currently free slots.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_capacity_and_availability() {
        let gate = ConcurrencyGate::new(3);
        assert_eq!(gate.capacity(), 3);
        assert_eq!(gate.available(), 3);

        let permit = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 2);

        drop(permit);
        assert_eq!(gate.available(), 3);
    }

    #[tokio::test]
    async fn test_admission_never_exceeds_capacity() {
        let gate = Arc::new(ConcurrencyGate::new(2));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let gate = gate.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire().await.unwrap();
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn test_permit_released_on_task_cancellation() {
        let gate = Arc::new(ConcurrencyGate::new(1));

        let held = gate.clone();
        let task = tokio::spawn(async move {
            let _permit = held.acquire().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        // Give the task time to take the slot, then cancel it mid-hold
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gate.available(), 0);
        task.abort();
        let _ = task.await;

        assert_eq!(gate.available(), 1);
    }
}
