//! Miner supervision.
//!
//! The supervisor owns the worker threads. Reconfiguration always follows
//! the same shape: cancel the previous group, join it, then spawn the
//! replacement.

use crate::worker::{run_miner, run_poa_miner};
use crate::{CancelToken, MinerContext};
use parking_lot::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::info;

/// Default interval between PoA build attempts.
pub const DEFAULT_POA_PERIOD: Duration = Duration::from_secs(180);

struct WorkerGroup {
    token: CancelToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    fn shutdown(self) {
        self.token.cancel();
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Supervises the PoW/PoS worker pool, the stake minter and the PoA
/// worker.
pub struct MinerSupervisor {
    ctx: MinerContext,
    workers: Mutex<Option<WorkerGroup>>,
    stake_minter: Mutex<Option<WorkerGroup>>,
    poa_worker: Mutex<Option<WorkerGroup>>,
}

impl MinerSupervisor {
    /// A supervisor over the given context. No workers run until asked.
    pub fn new(ctx: MinerContext) -> Self {
        Self {
            ctx,
            workers: Mutex::new(None),
            stake_minter: Mutex::new(None),
            poa_worker: Mutex::new(None),
        }
    }

    /// The wired context.
    pub fn context(&self) -> &MinerContext {
        &self.ctx
    }

    /// Start or stop block generation with `threads` workers. Negative
    /// thread counts pick the network default, falling back to hardware
    /// concurrency.
    pub fn set_generate(&self, enable: bool, threads: i32) {
        let previous = self.workers.lock().take();
        if let Some(group) = previous {
            group.shutdown();
        }

        if !enable || threads == 0 {
            info!("block generation stopped");
            return;
        }

        let params = self.ctx.chain.params();
        let count = if threads < 0 {
            if params.default_miner_threads > 0 {
                params.default_miner_threads
            } else {
                num_cpus::get()
            }
        } else {
            threads as usize
        };

        // Workers past the PoW phase start directly in stake mode.
        let proof_of_stake = self
            .ctx
            .chain
            .height()
            .is_some_and(|height| height >= params.last_pow_block);

        let token = CancelToken::new();
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let ctx = self.ctx.clone();
            let worker_token = token.clone();
            let handle = thread::Builder::new()
                .name(format!("umbra-miner-{id}"))
                .spawn(move || run_miner(&ctx, proof_of_stake, &worker_token))
                .expect("Failed to spawn miner thread");
            handles.push(handle);
        }
        info!(threads = count, proof_of_stake, "block generation started");

        *self.workers.lock() = Some(WorkerGroup { token, handles });
    }

    /// Start the PoA worker, replacing any previous one.
    pub fn start_poa(&self, period: Option<Duration>) {
        let previous = self.poa_worker.lock().take();
        if let Some(group) = previous {
            group.shutdown();
        }

        let period = period.unwrap_or(DEFAULT_POA_PERIOD);
        let token = CancelToken::new();
        let ctx = self.ctx.clone();
        let worker_token = token.clone();
        let handle = thread::Builder::new()
            .name("umbra-poa-miner".to_string())
            .spawn(move || run_poa_miner(&ctx, period, &worker_token))
            .expect("Failed to spawn PoA miner thread");

        *self.poa_worker.lock() = Some(WorkerGroup {
            token,
            handles: vec![handle],
        });
    }

    /// Start the dedicated stake minter, replacing any previous one.
    pub fn start_stake_minter(&self) {
        let previous = self.stake_minter.lock().take();
        if let Some(group) = previous {
            group.shutdown();
        }

        let token = CancelToken::new();
        let ctx = self.ctx.clone();
        let worker_token = token.clone();
        let handle = thread::Builder::new()
            .name("umbra-stake-minter".to_string())
            .spawn(move || run_miner(&ctx, true, &worker_token))
            .expect("Failed to spawn stake minter thread");

        *self.stake_minter.lock() = Some(WorkerGroup {
            token,
            handles: vec![handle],
        });
    }

    /// Whether the generation pool is running.
    pub fn is_generating(&self) -> bool {
        self.workers.lock().is_some()
    }

    /// Cancel and join every worker.
    pub fn stop_all(&self) {
        for slot in [&self.workers, &self.stake_minter, &self.poa_worker] {
            let previous = slot.lock().take();
            if let Some(group) = previous {
                group.shutdown();
            }
        }
    }
}

impl Drop for MinerSupervisor {
    fn drop(&mut self) {
        self.stop_all();
    }
}
