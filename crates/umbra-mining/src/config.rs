//! Miner runtime options.

use serde::{Deserialize, Serialize};
use umbra_chain::NetworkParams;

/// Runtime options for template assembly, normally sourced from the host's
/// argument store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerOptions {
    /// Upper bound on the serialized template size.
    pub block_max_size: usize,
    /// Bytes reserved for the priority-mode area; zero starts selection in
    /// fee mode.
    pub block_priority_size: usize,
    /// Floor below which free transactions are still admitted.
    pub block_min_size: usize,
    /// Emit per-transaction priority/fee log lines during selection.
    #[serde(default)]
    pub print_priority: bool,
    /// Header version override, honored in regression-test mode only.
    #[serde(default)]
    pub block_version_override: Option<i32>,
}

impl MinerOptions {
    /// Defaults for the given network.
    pub fn from_params(params: &NetworkParams) -> Self {
        Self {
            block_max_size: params.default_block_max_size,
            block_priority_size: params.default_block_priority_size,
            block_min_size: params.default_block_min_size,
            print_priority: false,
            block_version_override: None,
        }
    }

    /// Apply the sanity clamps: the maximum stays within
    /// `[1000, network_max - 1000]` and the other budgets within it.
    pub fn clamped(&self, params: &NetworkParams) -> Self {
        let block_max_size = self
            .block_max_size
            .clamp(1000, params.max_block_size - 1000);
        Self {
            block_max_size,
            block_priority_size: self.block_priority_size.min(block_max_size),
            block_min_size: self.block_min_size.min(block_max_size),
            print_priority: self.print_priority,
            block_version_override: self.block_version_override,
        }
    }
}

impl Default for MinerOptions {
    fn default() -> Self {
        Self::from_params(&NetworkParams::mainnet())
    }
}
