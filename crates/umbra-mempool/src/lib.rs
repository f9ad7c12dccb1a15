//! # umbra-mempool
//!
//! Transaction mempool for the Umbra node.
//!
//! This crate provides:
//! - Transaction storage keyed by txid
//! - Per-transaction priority and fee deltas (external prioritisation)
//! - Read-only snapshots for template assembly
//! - An update counter the miner uses to detect pool churn

mod error;
mod pool;

pub use error::{MempoolError, MempoolResult};
pub use pool::{Mempool, PoolEntry};
