//! Foundation types for the blobber storage node.
//!
//! Every other blobber crate depends on `blobber-types` for the identifiers
//! that flow through markers, reference trees, and allocations.
//!
//! # Key Types
//!
//! - [`Digest`]: 32-byte BLAKE3 digest, serialized as lowercase hex
//! - [`ClientId`]: Client identity derived from an Ed25519 public key
//! - [`Timestamp`]: Whole seconds since the Unix epoch

pub mod digest;
pub mod error;
pub mod identity;
pub mod time;

pub use digest::Digest;
pub use error::TypeError;
pub use identity::ClientId;
pub use time::Timestamp;
