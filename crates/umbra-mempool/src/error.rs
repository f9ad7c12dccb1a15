//! Error types for the mempool.

use thiserror::Error;

/// Mempool errors.
#[derive(Error, Debug)]
pub enum MempoolError {
    /// Transaction already exists in the pool.
    #[error("Transaction already in mempool: {0}")]
    AlreadyExists(String),

    /// Transaction not found.
    #[error("Transaction not found: {0}")]
    NotFound(String),
}

/// Result type for mempool operations.
pub type MempoolResult<T> = Result<T, MempoolError>;
