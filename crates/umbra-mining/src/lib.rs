//! # umbra-mining
//!
//! Block template assembly and the miner loop for the Umbra node.
//!
//! This crate provides:
//! - Priority/fee transaction selection with orphan dependency tracking
//! - PoW and PoS block template assembly
//! - Proof-of-Audit template assembly over recent PoS blocks
//! - Worker threads for nonce search, staking and periodic audits
//! - A supervisor owning the worker pool and the shared miner state
//!
//! Lock order is canonical throughout the crate: the chain view before the
//! mempool, the best-block lock never held across either, and the
//! hash-meter lock as a leaf.

mod cancel;
mod config;
mod context;
mod error;
mod poa;
mod priority;
mod selector;
mod state;
mod supervisor;
mod template;
mod traits;
mod worker;

pub use cancel::CancelToken;
pub use config::MinerOptions;
pub use context::{CoinsProvider, MinerContext};
pub use error::{MiningError, MiningResult, TemplateFailure};
pub use poa::{create_new_poa_block, create_new_poa_block_with_key, list_pos_info};
pub use priority::{OrderingMode, TxPriority, TxPriorityQueue};
pub use selector::{
    select_transactions, SelectedTx, Selection, SelectionBudget, MAX_BLOCK_SIGOPS,
};
pub use state::{ExtraNonce, MinerState};
pub use supervisor::{MinerSupervisor, DEFAULT_POA_PERIOD};
pub use template::{
    create_new_block, create_new_block_with_key, increment_extra_nonce, update_time,
};
pub use traits::{
    BlockProcessor, EphemeralKeys, MasternodeHooks, PeerSet, WalletBackend,
};
pub use worker::{process_block_found, run_miner, run_poa_miner};
