use serde::{Deserialize, Serialize};

use blobber_crypto::VerifyingKey;
use blobber_types::{ClientId, Digest, Timestamp};

/// Prices a blobber charges an allocation, in tokens per GiB.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobberTerms {
    pub blobber_id: String,
    pub read_price: u64,
    pub write_price: u64,
}

/// A capacity lease held by a client.
///
/// `blobber_size` is the share of the lease stored on this node; it is the
/// bound every commit is checked against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: String,
    /// Transaction that created the allocation; signed requests sign its hash.
    pub tx: String,
    pub owner_id: ClientId,
    pub owner_public_key: VerifyingKey,
    pub payer_id: ClientId,
    pub repairer_id: Option<ClientId>,
    pub size: u64,
    pub used_size: u64,
    pub blobber_size: u64,
    pub blobber_size_used: u64,
    pub expiration: Timestamp,
    pub is_immutable: bool,
    /// `None` until the first write is committed.
    pub allocation_root: Option<Digest>,
    pub is_redeem_required: bool,
    pub terms: Vec<BlobberTerms>,
}

impl Allocation {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiration < now
    }

    pub fn terms_for(&self, blobber_id: &str) -> Option<&BlobberTerms> {
        self.terms.iter().find(|t| t.blobber_id == blobber_id)
    }

    pub fn is_owner(&self, client: &ClientId) -> bool {
        self.owner_id == *client
    }

    /// Owners and payers may stage uploads.
    pub fn can_upload(&self, client: &ClientId) -> bool {
        self.is_owner(client) || self.payer_id == *client
    }

    /// Owners and repairers may read any file's metadata without a
    /// ticket. Per-file collaborators live on the reference itself.
    pub fn can_read_meta(&self, client: &ClientId) -> bool {
        self.is_owner(client) || self.repairer_id.as_ref() == Some(client)
    }

    /// Would applying `delta` bytes exceed this node's share of the lease?
    pub fn exceeds_capacity(&self, delta: i64) -> bool {
        let after = self.blobber_size_used as i128 + delta as i128;
        after > self.blobber_size as i128
    }

    /// Record a committed size delta. Never goes below zero.
    pub fn apply_size_delta(&mut self, delta: i64) {
        self.used_size = shift(self.used_size, delta);
        self.blobber_size_used = shift(self.blobber_size_used, delta);
    }
}

fn shift(value: u64, delta: i64) -> u64 {
    if delta >= 0 {
        value.saturating_add(delta.unsigned_abs())
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}
