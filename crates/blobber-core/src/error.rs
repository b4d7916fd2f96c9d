use blobber_alloc::AllocError;
use blobber_crypto::ChainError;
use blobber_markers::{MarkerError, WriteMarkerEntity};
use blobber_reftree::TreeError;
use blobber_store::StoreError;
use blobber_types::Digest;

/// Errors surfaced by core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Unknown or expired allocation.
    #[error("invalid allocation: {0}")]
    InvalidAllocation(String),

    /// Unknown staging session, foreign session, or empty change set.
    #[error("invalid connection: {0}")]
    InvalidConnection(String),

    #[error("max allocation size reached: {used} used + {requested} requested > {capacity}")]
    MaxAllocationSize {
        requested: i64,
        used: u64,
        capacity: u64,
    },

    #[error("invalid marker: {0}")]
    InvalidMarker(#[source] MarkerError),

    /// The client's view of the allocation is stale. Carries the current
    /// root and the marker that committed it so the client can rebase.
    #[error("allocation root rejected: {reason}")]
    RejectedRoot {
        reason: String,
        allocation_root: Option<Digest>,
        latest_marker: Option<Box<WriteMarkerEntity>>,
    },

    #[error("insufficient pool balance: want {want}, have {have}")]
    InsufficientFunds { want: u64, have: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("write marker chain broken: {0}")]
    BrokenChain(#[from] ChainError),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<TreeError> for CoreError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::NotFound(p) => Self::NotFound(p),
            TreeError::AlreadyExists(p) => Self::AlreadyExists(p),
            TreeError::InvalidDestination(p) => Self::InvalidDestination(p),
            other @ (TreeError::InvalidPath(_)
            | TreeError::NotAFile(_)
            | TreeError::BlockOutOfRange { .. }) => {
                Self::InvalidParameters(other.to_string())
            }
        }
    }
}

impl From<AllocError> for CoreError {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::ChangeFailed { source, .. } => source.into(),
            other => Self::InvalidConnection(other.to_string()),
        }
    }
}

impl CoreError {
    /// `true` for conflicts the client resolves by resyncing and retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::RejectedRoot { .. })
    }
}

/// Convenience alias for core results.
pub type CoreResult<T> = Result<T, CoreError>;
