use serde::{Deserialize, Serialize};

use blobber_alloc::Allocation;
use blobber_crypto::{Signature, SignatureVerifier, SigningKey, VerifyingKey};
use blobber_types::{ClientId, Digest, Timestamp};

use crate::error::{MarkerError, MarkerResult};

/// Field values of a read marker before it is signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedReadMarker {
    pub allocation_id: String,
    pub blobber_id: String,
    pub owner_id: ClientId,
    pub read_counter: u64,
    pub timestamp: Timestamp,
}

impl UnsignedReadMarker {
    pub fn sign(self, key: &SigningKey) -> ReadMarker {
        let mut marker = ReadMarker {
            client_id: key.client_id(),
            client_public_key: key.verifying_key(),
            allocation_id: self.allocation_id,
            blobber_id: self.blobber_id,
            owner_id: self.owner_id,
            read_counter: self.read_counter,
            timestamp: self.timestamp,
            signature: key.sign(&[]),
        };
        marker.signature = key.sign(marker.hash().to_hex().as_bytes());
        marker
    }
}

/// Client-signed authorization for reading up to `read_counter` blocks in
/// total from one blobber.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadMarker {
    pub client_id: ClientId,
    pub client_public_key: VerifyingKey,
    pub allocation_id: String,
    pub blobber_id: String,
    pub owner_id: ClientId,
    pub read_counter: u64,
    pub timestamp: Timestamp,
    pub signature: Signature,
}

impl ReadMarker {
    /// `allocation:blobber:client:clientKey:owner:counter:timestamp`.
    pub fn hash_data(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.allocation_id,
            self.blobber_id,
            self.client_id,
            self.client_public_key.to_hex(),
            self.owner_id,
            self.read_counter,
            self.timestamp
        )
    }

    pub fn hash(&self) -> Digest {
        Digest::of_str(&self.hash_data())
    }

    pub fn verify(
        &self,
        allocation: &Allocation,
        blobber_id: &str,
        verifier: &dyn SignatureVerifier,
    ) -> MarkerResult<()> {
        if self.allocation_id != allocation.id {
            return Err(MarkerError::AllocationMismatch {
                expected: allocation.id.clone(),
                found: self.allocation_id.clone(),
            });
        }
        if self.blobber_id != blobber_id {
            return Err(MarkerError::BlobberMismatch {
                expected: blobber_id.to_string(),
                found: self.blobber_id.clone(),
            });
        }
        if self.owner_id != allocation.owner_id
            || self.client_public_key.to_client_id() != self.client_id
        {
            return Err(MarkerError::ClientMismatch);
        }
        if !verifier.verify(&self.client_public_key, &self.signature, &self.hash()) {
            return Err(MarkerError::InvalidSignature);
        }
        Ok(())
    }
}

/// The latest read marker accepted from one client, plus the counter the
/// ledger has already redeemed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadMarkerEntity {
    pub latest: ReadMarker,
    pub redeemed_counter: u64,
}

impl ReadMarkerEntity {
    pub fn new(latest: ReadMarker) -> Self {
        Self {
            latest,
            redeemed_counter: 0,
        }
    }

    /// Blocks served since the last redemption.
    pub fn pend_num_blocks(&self) -> u64 {
        self.latest.read_counter.saturating_sub(self.redeemed_counter)
    }

    /// A marker continues this one only if it advances the counter by
    /// exactly `num_blocks`.
    pub fn accepts(&self, marker: &ReadMarker, num_blocks: u64) -> bool {
        self.latest.read_counter.checked_add(num_blocks) == Some(marker.read_counter)
    }

    /// Record `marker` as the latest, keeping the redemption watermark.
    pub fn advance(&mut self, marker: ReadMarker) {
        self.latest = marker;
    }
}
