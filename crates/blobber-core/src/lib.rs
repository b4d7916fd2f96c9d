//! The blobber's allocation protocol.
//!
//! A [`NodeContext`] bundles the node identity, its storage seams, and the
//! lock registry; every operation is a method on it and takes a
//! [`RequestContext`] describing the authenticated caller.
//!
//! # Operations
//!
//! - Write path: [`NodeContext::write_file`], [`NodeContext::delete_file`],
//!   [`NodeContext::rename_object`], [`NodeContext::copy_object`] stage
//!   changes into a connection; [`NodeContext::commit_write`] seals them
//!   with a client-signed write marker.
//! - Read path: [`NodeContext::download_file`] redeems a read marker.
//! - Queries: reference paths, object paths and trees, listings, paginated
//!   refs, file metadata and stats, and forced hash recomputation.
//! - File annotations: per-file collaborators and commit-meta transactions.
//!
//! # Commit Guarantees
//!
//! 1. Commits on one allocation are serialized by the allocation lock.
//! 2. Every rejection before the durable batch leaves no trace.
//! 3. Allocation, write marker, reference tree, and pending-write state land
//!    in one atomic batch.
//! 4. A stale write marker is answered with the current root and marker.

pub mod commit;
pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod file_meta;
pub mod lock;
pub mod pool;
pub mod query;
pub mod staging;

pub use commit::{CommitRequest, CommitResult};
pub use config::BlobberConfig;
pub use context::{NodeContext, RequestContext};
pub use download::{ContentKind, DownloadRequest, DownloadResponse};
pub use error::{CoreError, CoreResult};
pub use file_meta::FileStatsResult;
pub use lock::{LockRegistry, ResourceLock};
pub use query::{
    FileLocator, ListResult, ObjectPathResult, ReferencePathResult, RefsParams, RefsResult,
};
pub use staging::{UploadMode, UploadRequest, UploadResult};
