//! Time sources.
//!
//! The miner reads network-adjusted time through the [`Clock`] trait so
//! tests can drive it manually. The adjustment itself (peer offset
//! sampling) is the network layer's job.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of network-adjusted time.
pub trait Clock: Send + Sync {
    /// Adjusted time in seconds since the epoch.
    fn adjusted_time(&self) -> i64;

    /// Adjusted time in milliseconds.
    fn millis(&self) -> i64 {
        self.adjusted_time() * 1000
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn adjusted_time(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Manually driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// A clock pinned at the given time.
    pub fn at(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Set the current time.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Advance by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn adjusted_time(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::at(1000);
        assert_eq!(clock.adjusted_time(), 1000);
        clock.advance(60);
        assert_eq!(clock.adjusted_time(), 1060);
        assert_eq!(clock.millis(), 1_060_000);
    }

    #[test]
    fn test_system_clock_progresses() {
        let clock = SystemClock;
        assert!(clock.adjusted_time() > 1_600_000_000);
    }
}
