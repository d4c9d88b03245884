//! Bounded admission for remote backtest calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps the number of concurrent remote evaluations.
///
/// Waiters are admitted in FIFO order, so no evaluation can be starved
/// under contention. The gate tracks live and peak occupancy so tests
/// and progress reporting can observe the cap holding.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// One gate slot. Dropping the permit releases the slot to the next
/// waiter.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    /// Matches the backtest service's documented rate tolerance
    pub const DEFAULT_CAPACITY: usize = 3;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> GatePermit {
        // the semaphore is owned by the gate and never closed
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("gate semaphore closed");
        let occupancy = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(occupancy, Ordering::SeqCst);
        GatePermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest occupancy seen over the gate's lifetime
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
