use serde::{Deserialize, Serialize};

use blobber_alloc::Allocation;
use blobber_crypto::{RootLink, Signature, SignatureVerifier, SigningKey, VerifyingKey};
use blobber_types::{ClientId, Digest, Timestamp};

use crate::error::{MarkerError, MarkerResult};

/// Field values of a write marker before it is signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedWriteMarker {
    pub allocation_root: Digest,
    pub previous_allocation_root: Option<Digest>,
    pub allocation_id: String,
    pub size: i64,
    pub blobber_id: String,
    pub timestamp: Timestamp,
}

impl UnsignedWriteMarker {
    pub fn sign(self, key: &SigningKey) -> WriteMarker {
        let client_id = key.client_id();
        let hash = Digest::of_str(&canonical(&self, &client_id));
        WriteMarker {
            allocation_root: self.allocation_root,
            previous_allocation_root: self.previous_allocation_root,
            allocation_id: self.allocation_id,
            size: self.size,
            blobber_id: self.blobber_id,
            timestamp: self.timestamp,
            client_id,
            signature: key.sign(hash.to_hex().as_bytes()),
        }
    }
}

/// A client's signed claim that applying a connection moves the allocation
/// from `previous_allocation_root` to `allocation_root`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteMarker {
    pub allocation_root: Digest,
    pub previous_allocation_root: Option<Digest>,
    pub allocation_id: String,
    pub size: i64,
    pub blobber_id: String,
    pub timestamp: Timestamp,
    pub client_id: ClientId,
    pub signature: Signature,
}

fn canonical(m: &UnsignedWriteMarker, client_id: &ClientId) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}:{}",
        m.allocation_root,
        m.previous_allocation_root
            .map(|d| d.to_hex())
            .unwrap_or_default(),
        m.allocation_id,
        m.blobber_id,
        client_id,
        m.size,
        m.timestamp
    )
}

impl WriteMarker {
    fn unsigned(&self) -> UnsignedWriteMarker {
        UnsignedWriteMarker {
            allocation_root: self.allocation_root,
            previous_allocation_root: self.previous_allocation_root,
            allocation_id: self.allocation_id.clone(),
            size: self.size,
            blobber_id: self.blobber_id.clone(),
            timestamp: self.timestamp,
        }
    }

    /// `root:prevRoot:allocation:blobber:client:size:timestamp`.
    pub fn hash_data(&self) -> String {
        canonical(&self.unsigned(), &self.client_id)
    }

    pub fn hash(&self) -> Digest {
        Digest::of_str(&self.hash_data())
    }

    /// Structural and cryptographic checks against the stored allocation.
    ///
    /// The previous-root continuity check runs last so that a stale but
    /// otherwise valid marker is reported as
    /// [`MarkerError::PreviousRootMismatch`].
    pub fn verify(
        &self,
        allocation: &Allocation,
        blobber_id: &str,
        client_key: &VerifyingKey,
        staged_size: i64,
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
        if self.client_id != allocation.owner_id || client_key.to_client_id() != self.client_id {
            return Err(MarkerError::ClientMismatch);
        }
        if self.size != staged_size {
            return Err(MarkerError::SizeMismatch {
                expected: staged_size,
                found: self.size,
            });
        }
        if !verifier.verify(client_key, &self.signature, &self.hash()) {
            return Err(MarkerError::InvalidSignature);
        }
        if self.previous_allocation_root != allocation.allocation_root {
            return Err(MarkerError::PreviousRootMismatch {
                expected: allocation.allocation_root,
                found: self.previous_allocation_root,
            });
        }
        Ok(())
    }
}

impl RootLink for WriteMarker {
    fn root(&self) -> Digest {
        self.allocation_root
    }

    fn previous_root(&self) -> Option<Digest> {
        self.previous_allocation_root
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerStatus {
    /// Persisted with its commit; awaiting redemption on the ledger.
    Accepted,
    Redeemed,
    Failed,
}

/// A write marker as stored by the node, keyed by its allocation root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteMarkerEntity {
    pub marker: WriteMarker,
    pub status: MarkerStatus,
    pub connection_id: String,
    pub client_public_key: VerifyingKey,
}

impl WriteMarkerEntity {
    pub fn accepted(
        marker: WriteMarker,
        connection_id: impl Into<String>,
        client_public_key: VerifyingKey,
    ) -> Self {
        Self {
            marker,
            status: MarkerStatus::Accepted,
            connection_id: connection_id.into(),
            client_public_key,
        }
    }
}
