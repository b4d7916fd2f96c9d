use blobber_types::Digest;

/// Errors from marker and ticket verification.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MarkerError {
    #[error("signature verification failed")]
    InvalidSignature,

    #[error("marker is for allocation {found}, expected {expected}")]
    AllocationMismatch { expected: String, found: String },

    #[error("marker is for blobber {found}, expected {expected}")]
    BlobberMismatch { expected: String, found: String },

    #[error("marker client does not match the signer or allocation")]
    ClientMismatch,

    #[error("marker size {found} does not match staged size {expected}")]
    SizeMismatch { expected: i64, found: i64 },

    /// The marker was built on a root other than the stored one.
    #[error("previous root {found:?} does not match current root {expected:?}")]
    PreviousRootMismatch {
        expected: Option<Digest>,
        found: Option<Digest>,
    },

    #[error("ticket expired")]
    Expired,

    #[error("ticket was not issued to this client")]
    NotGrantee,

    #[error("ticket does not cover the requested path")]
    OutOfScope,
}

/// Convenience alias for marker results.
pub type MarkerResult<T> = Result<T, MarkerError>;
