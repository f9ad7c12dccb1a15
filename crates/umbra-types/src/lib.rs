//! # umbra-types
//!
//! Chain primitives for the Umbra privacy blockchain.
//!
//! This crate provides:
//! - Content hashes and key images
//! - Amounts and fee rates
//! - Push-only scripts with legacy sig-op counting
//! - Transactions with per-output commitments and ephemeral keys
//! - Blocks, headers and block templates (PoW, PoS and PoA)
//! - Merkle trees and compact difficulty targets

mod amount;
mod block;
mod compact;
mod encode;
mod hash;
mod merkle;
mod script;
mod transaction;

pub use amount::{format_amount, Amount, FeeRate, COIN, MIN_RELAY_FEE_RATE};
pub use block::{Block, BlockHeader, BlockTemplate, PoSBlockSummary};
pub use compact::{decode_compact, hash_meets_target};
pub use hash::{blake2b_256, Hash256};
pub use merkle::merkle_root;
pub use script::{Script, OP_0, OP_CHECKSIG};
pub use transaction::{KeyImage, OutPoint, Transaction, TxIn, TxOut, TxType};

/// Current block header version.
pub const BLOCK_VERSION: i32 = 5;

/// Header version marking a Proof-of-Audit block.
pub const POA_BLOCK_VERSION: i32 = 100;

/// Upper bound on a coinbase scriptSig, enforced when the extra nonce is
/// rewritten into it.
pub const MAX_COINBASE_SCRIPT_SIG_SIZE: usize = 100;
