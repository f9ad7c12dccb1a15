//! Cooperative cancellation.
//!
//! Every worker loop carries a [`CancelToken`]; sleeps wake early on
//! cancellation and checkpoints convert a pending cancel into
//! [`MiningError::Cancelled`] so the worker unwinds through its normal
//! error path.

use crate::{MiningError, MiningResult};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Inner {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

/// Shared cancellation token.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Request cancellation and wake all sleepers.
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.condvar.notify_all();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Cancellation checkpoint.
    pub fn checkpoint(&self) -> MiningResult<()> {
        if self.is_cancelled() {
            Err(MiningError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early and failing with
    /// [`MiningError::Cancelled`] if cancellation is requested.
    pub fn sleep(&self, duration: Duration) -> MiningResult<()> {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.inner.cancelled.lock();
        loop {
            if *cancelled {
                return Err(MiningError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let _ = self
                .inner
                .condvar
                .wait_for(&mut cancelled, deadline - now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_checkpoint_reflects_cancel() {
        let token = CancelToken::new();
        assert!(token.checkpoint().is_ok());
        token.cancel();
        assert!(matches!(token.checkpoint(), Err(MiningError::Cancelled)));
    }

    #[test]
    fn test_sleep_completes_when_uncancelled() {
        let token = CancelToken::new();
        let start = Instant::now();
        token.sleep(Duration::from_millis(20)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_sleep_wakes_early_on_cancel() {
        let token = CancelToken::new();
        let sleeper = token.clone();
        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(MiningError::Cancelled)));
    }
}
