use blobber_reftree::TreeError;

/// Errors from allocation and connection operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AllocError {
    /// The connection belongs to a different allocation or client.
    #[error("connection {connection_id} is not owned by this allocation/client")]
    ConnectionMismatch { connection_id: String },

    #[error("connection {0} is no longer open")]
    ConnectionClosed(String),

    #[error("connection {0} has no staged changes")]
    EmptyConnection(String),

    /// Replaying a staged change failed; the whole connection is aborted.
    #[error("change {index} failed: {source}")]
    ChangeFailed {
        index: usize,
        #[source]
        source: TreeError,
    },
}

/// Convenience alias for allocation results.
pub type AllocResult<T> = Result<T, AllocError>;
