//! Shared miner state.
//!
//! One `MinerState` value is owned by the supervisor and shared by all
//! workers, replacing the process globals of older miners: selection
//! counters, the coinstake search window, the recently-hashed tip map,
//! the extra-nonce tuple and the hash-rate meter.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::info;
use umbra_types::Hash256;

/// Extra-nonce tuple, reset whenever the previous block changes.
#[derive(Debug, Default)]
pub struct ExtraNonce {
    /// Previous block of the last rewrite.
    pub last_prev_block: Hash256,
    /// Running extra nonce.
    pub extra_nonce: u32,
}

#[derive(Debug, Default)]
struct HashMeter {
    hashes_per_sec: f64,
    timer_start_ms: i64,
    counter: u64,
    last_log_secs: i64,
}

/// State shared across miner workers.
#[derive(Default)]
pub struct MinerState {
    /// Transactions selected into the last template.
    pub last_block_tx: AtomicU64,
    /// Serialized size of the last template.
    pub last_block_size: AtomicU64,
    /// Last coinstake search time, seconds.
    pub last_coinstake_search_time: AtomicI64,
    /// Width of the last coinstake search window, seconds.
    pub last_coinstake_search_interval: AtomicI64,
    hashed_blocks: Mutex<HashMap<u32, i64>>,
    extra_nonce: Mutex<ExtraNonce>,
    meter: Mutex<HashMeter>,
}

impl MinerState {
    /// Fresh state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a selection pass.
    pub fn record_selection(&self, tx_count: u64, block_size: u64) {
        self.last_block_tx.store(tx_count, Ordering::Relaxed);
        self.last_block_size.store(block_size, Ordering::Relaxed);
    }

    /// Advance the coinstake search window.
    pub fn update_coinstake_search(&self, search_time: i64, interval: i64) {
        self.last_coinstake_search_time
            .store(search_time, Ordering::Relaxed);
        self.last_coinstake_search_interval
            .store(interval, Ordering::Relaxed);
    }

    /// Zero the search interval while the stake gate is closed.
    pub fn reset_coinstake_interval(&self) {
        self.last_coinstake_search_interval.store(0, Ordering::Relaxed);
    }

    /// Note that a template was built on the tip at `height`.
    pub fn record_hashed_block(&self, height: u32, now_secs: i64) {
        self.hashed_blocks.lock().insert(height, now_secs);
    }

    /// Whether the tip at `height` was hashed less than `min_interval_secs`
    /// ago.
    pub fn recently_hashed(&self, height: u32, now_secs: i64, min_interval_secs: i64) -> bool {
        self.hashed_blocks
            .lock()
            .get(&height)
            .is_some_and(|last| now_secs - last < min_interval_secs)
    }

    /// Bump the extra nonce for a block building on `prev_block`,
    /// resetting the counter when the previous block changed.
    pub fn next_extra_nonce(&self, prev_block: Hash256) -> u32 {
        let mut extra_nonce = self.extra_nonce.lock();
        if extra_nonce.last_prev_block != prev_block {
            extra_nonce.extra_nonce = 0;
            extra_nonce.last_prev_block = prev_block;
        }
        extra_nonce.extra_nonce += 1;
        extra_nonce.extra_nonce
    }

    /// Feed the hash-rate meter. Rates are recalculated at most every four
    /// seconds and logged every thirty minutes.
    pub fn count_hashes(&self, hashes: u64, now_ms: i64, now_secs: i64) {
        let mut meter = self.meter.lock();
        if meter.timer_start_ms == 0 {
            meter.timer_start_ms = now_ms;
            meter.counter = 0;
            return;
        }
        meter.counter += hashes;
        let elapsed_ms = now_ms - meter.timer_start_ms;
        if elapsed_ms > 4000 {
            meter.hashes_per_sec = 1000.0 * meter.counter as f64 / elapsed_ms as f64;
            meter.timer_start_ms = now_ms;
            meter.counter = 0;
            if now_secs - meter.last_log_secs > 30 * 60 {
                meter.last_log_secs = now_secs;
                info!(
                    khash_per_sec = meter.hashes_per_sec / 1000.0,
                    "hashmeter"
                );
            }
        }
    }

    /// Most recent hash-rate estimate.
    pub fn hashes_per_sec(&self) -> f64 {
        self.meter.lock().hashes_per_sec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_types::blake2b_256;

    #[test]
    fn test_extra_nonce_increments_and_resets() {
        let state = MinerState::new();
        let prev_a = blake2b_256(b"a");
        let prev_b = blake2b_256(b"b");

        assert_eq!(state.next_extra_nonce(prev_a), 1);
        assert_eq!(state.next_extra_nonce(prev_a), 2);
        assert_eq!(state.next_extra_nonce(prev_b), 1);
        assert_eq!(state.next_extra_nonce(prev_b), 2);
        assert_eq!(state.next_extra_nonce(prev_a), 1);
    }

    #[test]
    fn test_recently_hashed_window() {
        let state = MinerState::new();
        state.record_hashed_block(100, 1_000);

        assert!(state.recently_hashed(100, 1_000, 1));
        assert!(!state.recently_hashed(100, 1_002, 1));
        assert!(!state.recently_hashed(101, 1_000, 1));
    }

    #[test]
    fn test_hash_meter_needs_elapsed_time() {
        let state = MinerState::new();
        // First feed only starts the timer.
        state.count_hashes(1000, 10_000, 10);
        assert_eq!(state.hashes_per_sec(), 0.0);

        // 5000 hashes over 5 seconds -> 1000 H/s.
        state.count_hashes(5000, 15_000, 15);
        assert!((state.hashes_per_sec() - 1000.0).abs() < 1.0);
    }

    #[test]
    fn test_selection_counters() {
        let state = MinerState::new();
        state.record_selection(12, 34_567);
        assert_eq!(state.last_block_tx.load(Ordering::Relaxed), 12);
        assert_eq!(state.last_block_size.load(Ordering::Relaxed), 34_567);
    }
}
