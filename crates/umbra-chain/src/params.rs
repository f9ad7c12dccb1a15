//! Network parameters.
//!
//! Static consensus parameters for each network, plus the emission
//! schedule. Difficulty retargeting itself lives with the external
//! consensus engine; only the constants the miner consumes are here.

use serde::{Deserialize, Serialize};
use umbra_types::{Amount, COIN};

/// Emission schedule: a fixed subsidy with step reductions down to a floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Emission {
    /// Subsidy during the initial interval.
    pub initial_subsidy: Amount,
    /// Blocks between reductions.
    pub reduction_interval: u32,
    /// Subsidy removed at each reduction.
    pub reduction_amount: Amount,
    /// Floor the subsidy never drops below.
    pub min_subsidy: Amount,
}

impl Default for Emission {
    fn default() -> Self {
        Self {
            initial_subsidy: 50 * COIN,
            reduction_interval: 525_600, // one year of minute blocks
            reduction_amount: 5 * COIN,
            min_subsidy: 5 * COIN,
        }
    }
}

impl Emission {
    /// Block subsidy at the given height, independent of fees.
    pub fn block_value(&self, height: u32) -> Amount {
        let reductions = (height / self.reduction_interval) as Amount;
        (self.initial_subsidy - reductions * self.reduction_amount).max(self.min_subsidy)
    }
}

/// Static parameters of one network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkParams {
    /// Network name.
    pub name: String,
    /// Last height at which PoW blocks are produced.
    pub last_pow_block: u32,
    /// First height at which PoA blocks may appear.
    pub start_poa_block: u32,
    /// Maximum PoS blocks audited by one PoA block.
    pub max_pos_blocks_audited: usize,
    /// Height of the reward hard fork (halves the PoA per-audit reward).
    pub hard_fork_height: u32,
    /// Target seconds between blocks.
    pub target_spacing_secs: u64,
    /// Network ceiling on serialized block size.
    pub max_block_size: usize,
    /// Default template size cap.
    pub default_block_max_size: usize,
    /// Default bytes reserved for the priority area.
    pub default_block_priority_size: usize,
    /// Default floor below which free transactions are still admitted.
    pub default_block_min_size: usize,
    /// Regression-test mode: blocks are mined on demand and the header
    /// version may be overridden.
    pub mine_blocks_on_demand: bool,
    /// Whether mining requires connected peers.
    pub mining_requires_peers: bool,
    /// Whether difficulty may fall back to the minimum on testnets.
    pub allow_min_difficulty_blocks: bool,
    /// Pinned miner thread count; zero defers to hardware concurrency.
    pub default_miner_threads: usize,
    /// Compact target used while retargeting is delegated.
    pub genesis_bits: u32,
    /// Flags appended to the coinbase scriptSig.
    pub coinbase_flags: Vec<u8>,
    /// Emission schedule.
    pub emission: Emission,
}

impl NetworkParams {
    /// Mainnet parameters.
    pub fn mainnet() -> Self {
        Self {
            name: "main".to_string(),
            last_pow_block: 1440,
            start_poa_block: 1500,
            max_pos_blocks_audited: 59,
            hard_fork_height: 1_200_000,
            target_spacing_secs: 60,
            max_block_size: 2_000_000,
            default_block_max_size: 750_000,
            default_block_priority_size: 50_000,
            default_block_min_size: 0,
            mine_blocks_on_demand: false,
            mining_requires_peers: true,
            allow_min_difficulty_blocks: false,
            default_miner_threads: 0,
            genesis_bits: 0x1e0f_fff0,
            coinbase_flags: b"/umbra/".to_vec(),
            emission: Emission::default(),
        }
    }

    /// Regression-test parameters: tiny phase boundaries, on-demand mining,
    /// no peer requirement.
    pub fn regtest() -> Self {
        Self {
            name: "regtest".to_string(),
            last_pow_block: 200,
            start_poa_block: 300,
            max_pos_blocks_audited: 59,
            hard_fork_height: 1000,
            target_spacing_secs: 60,
            max_block_size: 2_000_000,
            default_block_max_size: 750_000,
            default_block_priority_size: 50_000,
            default_block_min_size: 0,
            mine_blocks_on_demand: true,
            mining_requires_peers: false,
            allow_min_difficulty_blocks: true,
            default_miner_threads: 1,
            genesis_bits: 0x207f_ffff,
            coinbase_flags: b"/umbra/".to_vec(),
            emission: Emission::default(),
        }
    }

    /// Block subsidy at the given height.
    pub fn block_value(&self, height: u32) -> Amount {
        self.emission.block_value(height)
    }
}
