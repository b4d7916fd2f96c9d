use std::fmt;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::TypeError;

/// Identity of a client (allocation owner, payer, repairer, or reader).
///
/// A client id is the digest of the client's raw Ed25519 public key bytes,
/// so anyone holding the key can check the claim `hash(key) == id`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Digest);

impl ClientId {
    /// Derive the id owned by a public key.
    pub fn from_public_key(key: &[u8]) -> Self {
        Self(Digest::of(key))
    }

    pub const fn from_digest(digest: Digest) -> Self {
        Self(digest)
    }

    pub fn digest(&self) -> Digest {
        self.0
    }

    /// Returns `true` if `key` hashes to this id.
    pub fn owns_key(&self, key: &[u8]) -> bool {
        Self::from_public_key(key) == *self
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        Digest::from_hex(s).map(Self)
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0.short_hex())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
