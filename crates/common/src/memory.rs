//! Per-fragment memory budget tracking.
//!
//! One tracker is created per fragment execution with a single scalar byte
//! budget. Memory-hungry operators (hash-join build side, aggregation
//! buffers) reserve bytes before growing their working set; exceeding the
//! budget fails the fragment with `ResourceExhausted` instead of spilling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{QuernError, Result};

/// Shared byte budget for one fragment's operator pipeline.
#[derive(Debug)]
pub struct MemoryTracker {
    budget_bytes: usize,
    in_use_bytes: AtomicUsize,
}

impl MemoryTracker {
    /// Create a tracker with a fixed byte budget.
    pub fn new(budget_bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            budget_bytes,
            in_use_bytes: AtomicUsize::new(0),
        })
    }

    /// Total budget in bytes.
    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    /// Bytes currently reserved across all live reservations.
    pub fn in_use_bytes(&self) -> usize {
        self.in_use_bytes.load(Ordering::Acquire)
    }

    /// Reserve `bytes` against the budget.
    ///
    /// # Errors
    /// Returns `ResourceExhausted` when the reservation would exceed the
    /// budget; the tracker's accounting is left unchanged in that case.
    pub fn try_reserve(self: &Arc<Self>, bytes: usize) -> Result<MemoryReservation> {
        self.charge(bytes)?;
        Ok(MemoryReservation {
            tracker: Arc::clone(self),
            reserved_bytes: bytes,
        })
    }

    fn charge(&self, bytes: usize) -> Result<()> {
        loop {
            let current = self.in_use_bytes.load(Ordering::Acquire);
            let next = current.saturating_add(bytes);
            if next > self.budget_bytes {
                return Err(QuernError::ResourceExhausted(format!(
                    "memory budget exceeded: requested {bytes} bytes, \
                     {current} of {} in use",
                    self.budget_bytes
                )));
            }
            if self
                .in_use_bytes
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    fn release(&self, bytes: usize) {
        if bytes > 0 {
            self.in_use_bytes.fetch_sub(bytes, Ordering::AcqRel);
        }
    }
}

/// RAII reservation that releases its bytes on drop.
///
/// Dropping a reservation is the release path for aborted pipelines: an
/// operator that fails mid-build drops its reservation along with its
/// partially accumulated state.
#[derive(Debug)]
pub struct MemoryReservation {
    tracker: Arc<MemoryTracker>,
    reserved_bytes: usize,
}

impl MemoryReservation {
    /// Bytes held by this reservation.
    pub fn reserved_bytes(&self) -> usize {
        self.reserved_bytes
    }

    /// Grow the reservation by `additional` bytes.
    ///
    /// # Errors
    /// Returns `ResourceExhausted` when growth would exceed the budget; the
    /// reservation keeps its previous size.
    pub fn grow(&mut self, additional: usize) -> Result<()> {
        self.tracker.charge(additional)?;
        self.reserved_bytes += additional;
        Ok(())
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.tracker.release(self.reserved_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_releases_budget_on_drop() {
        let tracker = MemoryTracker::new(100);
        {
            let reservation = tracker.try_reserve(80).expect("within budget");
            assert_eq!(reservation.reserved_bytes(), 80);
            assert_eq!(tracker.in_use_bytes(), 80);
            assert!(tracker.try_reserve(40).is_err());
        }
        assert_eq!(tracker.in_use_bytes(), 0);
        assert!(tracker.try_reserve(100).is_ok());
    }

    #[test]
    fn grow_fails_past_budget_and_keeps_size() {
        let tracker = MemoryTracker::new(50);
        let mut reservation = tracker.try_reserve(30).expect("within budget");
        reservation.grow(10).expect("still within budget");
        let err = reservation.grow(20).unwrap_err();
        assert!(matches!(err, QuernError::ResourceExhausted(_)));
        assert_eq!(reservation.reserved_bytes(), 40);
        assert_eq!(tracker.in_use_bytes(), 40);
    }
}
