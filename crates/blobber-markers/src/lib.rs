//! Signed client commitments.
//!
//! Every commitment has a canonical `:`-joined hash string; the client signs
//! the hex of its digest and the node checks it through a
//! [`SignatureVerifier`](blobber_crypto::SignatureVerifier).
//!
//! # Key Types
//!
//! - [`WriteMarker`]: commits a new allocation root on top of the previous one
//! - [`ReadMarker`]: authorizes a read-counter increment
//! - [`AuthTicket`]: owner-issued capability for non-owner access to a path

pub mod auth_ticket;
pub mod error;
pub mod read;
pub mod write;

pub use auth_ticket::{AuthTicket, UnsignedAuthTicket};
pub use error::{MarkerError, MarkerResult};
pub use read::{ReadMarker, ReadMarkerEntity, UnsignedReadMarker};
pub use write::{MarkerStatus, UnsignedWriteMarker, WriteMarker, WriteMarkerEntity};
