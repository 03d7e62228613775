use std::sync::atomic::{AtomicU64, Ordering};
use wal::wall_clock_nanos;

/// Hands out wall-clock timestamps (nanoseconds since the Unix epoch) that
/// never go backwards, even if the system clock does.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicU64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time, or the last value handed out if the wall clock is
    /// behind it.
    pub fn now(&self) -> u64 {
        let wall = wall_clock_nanos();
        let prev = self.last.fetch_max(wall, Ordering::AcqRel);
        prev.max(wall)
    }

    /// Raises the floor so later `now()` calls never return less than `ts`.
    pub fn observe(&self, ts: u64) {
        self.last.fetch_max(ts, Ordering::AcqRel);
    }

    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }
}
