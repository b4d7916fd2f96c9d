/// Errors from reference tree operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("path not found: {0}")]
    NotFound(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    /// Copy or insert target is not a directory.
    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("not a file: {0}")]
    NotAFile(String),

    #[error("block {block_num} out of range ({total} blocks)")]
    BlockOutOfRange { block_num: u64, total: u64 },
}

/// Convenience alias for tree results.
pub type TreeResult<T> = Result<T, TreeError>;
