use blobber_types::Digest;

/// Errors from storage backends.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// Content was requested that the byte store does not hold.
    #[error("content not found: {0}")]
    ContentNotFound(Digest),

    /// Requested block range lies outside the content.
    #[error("block range {block_num}+{num_blocks} out of bounds for {content_hash}")]
    BlockOutOfRange {
        content_hash: Digest,
        block_num: u64,
        num_blocks: u64,
    },

    /// A lock guarding backend state was poisoned by a panicking writer.
    #[error("store state poisoned: {0}")]
    Poisoned(String),

    /// The backend refused or failed the operation; nothing was written.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The external ledger could not be reached or answered with an error.
    #[error("ledger error: {0}")]
    Ledger(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
