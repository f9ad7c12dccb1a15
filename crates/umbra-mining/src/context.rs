//! Shared miner context.

use crate::{
    BlockProcessor, MasternodeHooks, MinerOptions, MinerState, PeerSet, WalletBackend,
};
use std::sync::Arc;
use umbra_chain::{Chain, Clock, CoinsView, InvalidOutpoints};
use umbra_mempool::Mempool;

/// Source of fresh UTXO views anchored at the current coins tip.
pub trait CoinsProvider: Send + Sync {
    /// Derive a view for one template build.
    fn view_at_tip(&self) -> CoinsView;
}

/// Everything a miner worker needs, wired once by the supervisor.
///
/// Lock order is canonical throughout: the chain view before the mempool;
/// the best-block lock is never held across either; the hash-meter lock
/// is a leaf.
#[derive(Clone)]
pub struct MinerContext {
    /// Chain view.
    pub chain: Arc<Chain>,
    /// Mempool.
    pub mempool: Arc<Mempool>,
    /// UTXO view factory.
    pub coins: Arc<dyn CoinsProvider>,
    /// Wallet collaborator.
    pub wallet: Arc<dyn WalletBackend>,
    /// Chain processor collaborator.
    pub processor: Arc<dyn BlockProcessor>,
    /// Peer set.
    pub peers: Arc<dyn PeerSet>,
    /// Masternode layer.
    pub masternodes: Arc<dyn MasternodeHooks>,
    /// Blacklisted outpoints.
    pub invalid_outpoints: Arc<InvalidOutpoints>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Runtime options.
    pub options: MinerOptions,
    /// Shared miner state.
    pub state: Arc<MinerState>,
}
