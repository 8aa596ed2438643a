//! Injectable time source.
//!
//! Balances are pure nanosecond arithmetic, so the engine only needs a
//! monotonic-ish instant on an arbitrary scale. The clock is read inside
//! the shard-locked section of a debit, which means implementations must
//! be callable from any thread without external synchronization.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// A source of nanosecond instants on an arbitrary monotonic scale.
pub trait TimeSource: Send + Sync {
    /// Current instant in nanoseconds.
    fn now_ns(&self) -> i64;
}

static PROCESS_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// The default clock: nanoseconds elapsed since a process-wide epoch
/// taken on first use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_ns(&self) -> i64 {
        PROCESS_EPOCH.elapsed().as_nanos() as i64
    }
}

/// A clock that only moves when told to.
///
/// Intended for tests that need to pin "now" or step it forward in exact
/// increments. Shared freely across threads.
#[derive(Debug, Default)]
pub struct ManualClock {
    ns: AtomicI64,
}

impl ManualClock {
    /// Creates a clock pinned at `ns`.
    pub fn new(ns: i64) -> Self {
        Self { ns: AtomicI64::new(ns) }
    }

    /// Pins the clock to an absolute instant.
    pub fn set(&self, ns: i64) {
        self.ns.store(ns, Ordering::Relaxed);
    }

    /// Steps the clock forward.
    pub fn advance(&self, delta: Duration) {
        self.ns.fetch_add(delta.as_nanos() as i64, Ordering::Relaxed);
    }
}

impl TimeSource for ManualClock {
    fn now_ns(&self) -> i64 {
        self.ns.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock;
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(5);
        assert_eq!(clock.now_ns(), 5);

        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_ns(), 5 + 2_000_000_000);

        clock.set(0);
        assert_eq!(clock.now_ns(), 0);
    }
}
