//! Mining error types.

use thiserror::Error;
use umbra_chain::ChainError;
use umbra_mempool::MempoolError;

/// Reasons a template build produced no template.
#[derive(Error, Debug)]
pub enum TemplateFailure {
    /// The wallet could not provide a miner address.
    #[error("No miner address available")]
    NoAddress,

    /// No stakeable coin satisfied the target in the search window.
    #[error("Stake not found")]
    NoStake,

    /// The value commitment could not be created.
    #[error("Failed to create value commitment")]
    CommitmentFailed,

    /// Signing the coinstake or the block failed.
    #[error("Signing failed")]
    SignatureFailed,

    /// The key-image signature did not verify.
    #[error("Key-image signature verification failed")]
    VerifyFailed,

    /// An audited block could not be loaded from the block store.
    #[error("Failed to read audited block: {0}")]
    ReadBlockFailed(#[source] ChainError),
}

/// Mining errors.
#[derive(Error, Debug)]
pub enum MiningError {
    /// The chain has no tip.
    #[error("Chain has no tip")]
    NoTip,

    /// The tip moved while the template was being built.
    #[error("Chain tip moved during template build")]
    StaleTip,

    /// The template build failed; the worker loops.
    #[error("Template build failed: {0}")]
    TemplateBuild(#[from] TemplateFailure),

    /// The block's prev-hash no longer matches the best block.
    #[error("Generated block is stale")]
    SubmitStale,

    /// The chain processor refused the block.
    #[error("Block not accepted: {0}")]
    SubmitRejected(String),

    /// Cooperative cancellation unwound the worker.
    #[error("Mining cancelled")]
    Cancelled,

    /// Chain error.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Mempool error.
    #[error("Mempool error: {0}")]
    Mempool(#[from] MempoolError),
}

/// Result type for mining operations.
pub type MiningResult<T> = Result<T, MiningError>;
