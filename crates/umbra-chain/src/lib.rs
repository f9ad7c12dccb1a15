//! # umbra-chain
//!
//! Chain state consumed by the miner:
//! - Block index and in-memory chain view with best-block tracking
//! - Spent-key-image and invalid-outpoint sets
//! - UTXO coins view with input checking and priority scoring
//! - Network parameters and the emission schedule
//! - Clock abstraction (system and manual time sources)

mod chain;
mod coins;
mod error;
mod params;
mod time;

pub use chain::{BlockIndex, Chain};
pub use coins::{
    allow_free, Coin, CoinsView, InvalidOutpoints, MANDATORY_SCRIPT_VERIFY_FLAGS,
};
pub use error::{ChainError, ChainResult};
pub use params::{Emission, NetworkParams};
pub use time::{Clock, ManualClock, SystemClock};
