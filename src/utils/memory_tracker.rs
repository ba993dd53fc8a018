use std::sync::atomic::{AtomicU64, Ordering};

use crate::utils::error::{BoxError, BoxResult};

pub struct MemoryTracker {
    maximum: u64,
    current: AtomicU64,
}

// Reservation is a compare-exchange loop so a refused request never shows up in `current`

impl MemoryTracker {
    pub fn new(maximum: u64) -> Self {
        Self {
            maximum,
            current: AtomicU64::new(0),
        }
    }

    pub fn allocate(&self, size: u64) -> BoxResult<()> {
        let mut prev = self.current.load(Ordering::Acquire);
        loop {
            let new = prev.checked_add(size).ok_or_else(|| {
                BoxError::OutOfMemory(format!(
                    "Memory allocation would overflow: current {} + size {}",
                    prev, size
                ))
            })?;

            if new > self.maximum {
                return Err(BoxError::OutOfMemory(format!(
                    "Memory limit exceeded: {} bytes requested with {} of {} in use",
                    size, prev, self.maximum
                )));
            }

            match self.current.compare_exchange_weak(
                prev,
                new,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => prev = actual,
            }
        }
    }

    pub fn deallocate(&self, size: u64) {
        let prev = self.current.fetch_sub(size, Ordering::AcqRel);
        debug_assert!(prev >= size, "released {} bytes but only {} tracked", size, prev);
    }

    pub fn get_current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn get_available(&self) -> u64 {
        self.maximum.saturating_sub(self.get_current())
    }

    pub fn get_maximum(&self) -> u64 {
        self.maximum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ErrorKind;

    #[test]
    fn allocate_within_limit() {
        let tracker = MemoryTracker::new(100);
        tracker.allocate(60).unwrap();
        tracker.allocate(40).unwrap();
        assert_eq!(tracker.get_current(), 100);
        assert_eq!(tracker.get_available(), 0);
    }

    #[test]
    fn refused_request_leaves_usage_untouched() {
        let tracker = MemoryTracker::new(100);
        tracker.allocate(80).unwrap();
        let err = tracker.allocate(21).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);
        assert_eq!(tracker.get_current(), 80);
    }

    #[test]
    fn deallocate_frees_budget() {
        let tracker = MemoryTracker::new(10);
        tracker.allocate(10).unwrap();
        tracker.deallocate(4);
        assert_eq!(tracker.get_available(), 4);
        tracker.allocate(4).unwrap();
        assert_eq!(tracker.get_maximum(), 10);
    }

    #[test]
    fn overflow_is_refused() {
        let tracker = MemoryTracker::new(u64::MAX);
        tracker.allocate(u64::MAX - 1).unwrap();
        assert!(tracker.allocate(2).is_err());
    }
}
