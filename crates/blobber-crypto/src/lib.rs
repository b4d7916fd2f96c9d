//! Cryptographic primitives for the blobber.
//!
//! Provides the canonical string hashes used for lookup keys and allocation
//! roots, Ed25519 signing/verification behind a [`SignatureVerifier`] seam,
//! binary Merkle roots over content chunks, and allocation-root chain
//! verification.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod chain;
pub mod hasher;
pub mod merkle;
pub mod signer;
pub mod verifier;

pub use chain::{ChainError, RootChainVerifier, RootLink};
pub use hasher::{allocation_root, hash_joined, lookup_hash};
pub use merkle::MerkleTree;
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey};
pub use verifier::{Ed25519Verifier, SignatureVerifier};
