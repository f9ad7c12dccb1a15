//! Collaborator seams.
//!
//! The miner consumes the wallet, chain processor, peer set and masternode
//! layer through these traits; their implementations live outside this
//! workspace.

use umbra_chain::BlockIndex;
use umbra_types::{Amount, Block, Hash256, Transaction, TxOut};

/// Ephemeral keys backing one miner address.
#[derive(Debug, Clone)]
pub struct EphemeralKeys {
    /// Miner public key, paid by the coinbase script.
    pub pubkey: Vec<u8>,
    /// Transaction-level public key embedded in the paying output.
    pub tx_pub: Vec<u8>,
    /// Transaction-level private key embedded in the paying output.
    pub tx_priv: Vec<u8>,
}

/// Wallet operations the miner depends on.
pub trait WalletBackend: Send + Sync {
    /// Derive a fresh miner address with its transaction keypair.
    fn generate_address(&self) -> Option<EphemeralKeys>;

    /// Search for a coinstake satisfying `bits` within the given window.
    /// Returns the coinstake transaction and its block time.
    fn create_coinstake(&self, bits: u32, search_window: i64) -> Option<(Transaction, u32)>;

    /// Whether the wallet currently holds stakeable coins.
    fn mintable_coins(&self) -> bool;

    /// Whether the wallet is locked.
    fn is_locked(&self) -> bool;

    /// Spendable balance.
    fn balance(&self) -> Amount;

    /// Balance reserved from staking.
    fn reserve_balance(&self) -> Amount;

    /// Minimum seconds between hashing the same tip.
    fn hash_interval(&self) -> u64;

    /// Encode an output amount against the shared secret.
    fn encode_tx_out_amount(&self, out: &mut TxOut, amount: Amount, shared_secret: &[u8]);

    /// Create a Pedersen commitment to `value` under `blind`.
    fn create_commitment(&self, blind: &[u8; 32], value: Amount) -> Option<Vec<u8>>;

    /// Produce the aggregate Schnorr signature over the key images of `tx`.
    fn make_schnorr_signature(&self, tx: &mut Transaction) -> bool;

    /// Verify the aggregate key-image signature of `tx`.
    fn verify_schnorr_key_image(&self, tx: &Transaction) -> bool;

    /// Derive and store the private key for a computed output.
    fn add_computed_private_key(&self, out: &TxOut);

    /// Sign a block.
    fn sign_block(&self, block: &mut Block) -> bool;

    /// Let the wallet recognize its own outputs in `tx`.
    fn is_transaction_for_me(&self, tx: &Transaction) -> bool;

    /// Commit the reserve key consumed by a submitted block.
    fn keep_reserve_key(&self);

    /// Reset the per-block getdata request counter.
    fn reset_request_count(&self, block_hash: &Hash256);
}

/// Chain processing operations the miner hands finished blocks to.
pub trait BlockProcessor: Send + Sync {
    /// Validate and activate a new block, as if received from a peer.
    fn process_new_block(&self, block: Block) -> bool;

    /// Signal listeners that a block was found locally.
    fn block_found(&self, hash: &Hash256);

    /// Re-run PoS verification for an already-connected block.
    fn reverify_pos_block(&self, index: &BlockIndex) -> bool;
}

/// View of the connected peer set.
pub trait PeerSet: Send + Sync {
    /// Number of connected peers.
    fn peer_count(&self) -> usize;

    /// Announce a block to all peers.
    fn broadcast_block_inventory(&self, hash: &Hash256);
}

/// Masternode and budget layer.
pub trait MasternodeHooks: Send + Sync {
    /// Whether masternode sync has completed.
    fn is_synced(&self) -> bool;

    /// Add payee outputs to the coinbase, if a payment is due this block.
    fn fill_block_payee(&self, coinbase: &mut Transaction, fees: Amount, proof_of_stake: bool);
}
