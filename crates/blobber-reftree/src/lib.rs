//! Reference tree for a blobber allocation.
//!
//! The tree is the hierarchical, content-addressed namespace of one
//! allocation. Nodes live in an index-addressed arena; children are kept in
//! name order so directory hashes do not depend on the order in which
//! changes were applied.
//!
//! # Key Types
//!
//! - [`ReferenceTree`]: arena of [`RefNode`]s rooted at `/`
//! - [`AllocationChange`] / [`ChangeOp`]: one staged insert, update,
//!   delete, rename, or copy
//! - [`ReferencePath`]: nested listing returned to clients
//! - [`RefsQuery`] / [`RefsPage`]: paginated flat listings
//! - [`FileStats`]: per-file update and download counters
//!
//! # Hashing Rules
//!
//! 1. A file's hash is `hash(contentHash:merkleRoot:size)`.
//! 2. A directory's hash is the hash of `name:hash:size` for every child,
//!    sorted by name and joined with `:`.
//! 3. Directory size and block count are the sums over children.
//! 4. Timestamps never feed into a hash.

pub mod annotations;
pub mod change;
pub mod error;
pub mod listing;
pub mod node;
pub mod path;
pub mod refs;
pub mod stats;
pub mod tree;

pub use change::{AllocationChange, ChangeKind, ChangeOp};
pub use error::{TreeError, TreeResult};
pub use listing::{ObjectPath, ReferencePath};
pub use node::{CommitMetaTxn, NewFile, RefNode, RefType};
pub use refs::{RefKind, RefsPage, RefsQuery};
pub use stats::FileStats;
pub use tree::ReferenceTree;
