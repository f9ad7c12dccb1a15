//! Chain error types.

use thiserror::Error;
use umbra_types::Hash256;

/// Chain errors.
#[derive(Error, Debug)]
pub enum ChainError {
    /// No block at the requested height.
    #[error("No block at height {0}")]
    UnknownHeight(u32),

    /// The chain has no tip yet.
    #[error("Chain has no tip")]
    NoTip,

    /// Block data could not be loaded for an indexed block.
    #[error("Failed to read block {0} from the block store")]
    ReadBlockFailed(Hash256),

    /// One or more transaction inputs are not present in the coins view.
    #[error("Missing inputs for transaction {0}")]
    MissingInputs(Hash256),

    /// Script verification failed under the mandatory flags.
    #[error("Script verification failed for transaction {0}")]
    ScriptVerifyFailed(Hash256),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
