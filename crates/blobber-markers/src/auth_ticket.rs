use serde::{Deserialize, Serialize};

use blobber_alloc::Allocation;
use blobber_crypto::{Signature, SignatureVerifier, SigningKey};
use blobber_reftree::{path, RefNode, RefType};
use blobber_types::{ClientId, Digest, Timestamp};

use crate::error::{MarkerError, MarkerResult};

/// Field values of an auth ticket before the owner signs it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedAuthTicket {
    /// Grantee; `None` shares with anyone holding the ticket.
    pub client_id: Option<ClientId>,
    pub allocation_id: String,
    pub file_path_hash: Digest,
    pub file_name: String,
    pub ref_type: RefType,
    /// `Timestamp(0)` never expires.
    pub expiration: Timestamp,
    pub timestamp: Timestamp,
}

impl UnsignedAuthTicket {
    pub fn sign(self, owner: &SigningKey) -> AuthTicket {
        let mut ticket = AuthTicket {
            client_id: self.client_id,
            owner_id: owner.client_id(),
            allocation_id: self.allocation_id,
            file_path_hash: self.file_path_hash,
            file_name: self.file_name,
            ref_type: self.ref_type,
            expiration: self.expiration,
            timestamp: self.timestamp,
            signature: owner.sign(&[]),
        };
        ticket.signature = owner.sign(ticket.hash().to_hex().as_bytes());
        ticket
    }
}

/// Owner-issued capability granting access to one reference and, for
/// directories, everything below it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTicket {
    pub client_id: Option<ClientId>,
    pub owner_id: ClientId,
    pub allocation_id: String,
    pub file_path_hash: Digest,
    pub file_name: String,
    pub ref_type: RefType,
    pub expiration: Timestamp,
    pub timestamp: Timestamp,
    pub signature: Signature,
}

impl AuthTicket {
    pub fn hash_data(&self) -> String {
        let ref_type = match self.ref_type {
            RefType::File => "f",
            RefType::Directory => "d",
        };
        format!(
            "{}:{}:{}:{}:{}:{}:{}:{}",
            self.allocation_id,
            self.client_id.map(|c| c.to_hex()).unwrap_or_default(),
            self.owner_id,
            self.file_path_hash,
            self.file_name,
            ref_type,
            self.expiration,
            self.timestamp
        )
    }

    pub fn hash(&self) -> Digest {
        Digest::of_str(&self.hash_data())
    }

    /// Check issuer, grantee, expiry, and the owner's signature.
    pub fn verify(
        &self,
        allocation: &Allocation,
        client_id: &ClientId,
        now: Timestamp,
        verifier: &dyn SignatureVerifier,
    ) -> MarkerResult<()> {
        if self.allocation_id != allocation.id {
            return Err(MarkerError::AllocationMismatch {
                expected: allocation.id.clone(),
                found: self.allocation_id.clone(),
            });
        }
        if self.owner_id != allocation.owner_id {
            return Err(MarkerError::ClientMismatch);
        }
        if self.client_id.is_some_and(|grantee| grantee != *client_id) {
            return Err(MarkerError::NotGrantee);
        }
        if self.expiration.as_secs() > 0 && self.expiration < now {
            return Err(MarkerError::Expired);
        }
        if !verifier.verify(&allocation.owner_public_key, &self.signature, &self.hash()) {
            return Err(MarkerError::InvalidSignature);
        }
        Ok(())
    }

    /// Does the ticket reach `requested`?
    ///
    /// `anchor` is the reference the ticket was issued for, resolved by the
    /// caller from `file_path_hash`. Anything strictly below a shared
    /// directory is covered.
    pub fn covers(&self, requested: &RefNode, anchor: Option<&RefNode>) -> MarkerResult<()> {
        if requested.lookup_hash == self.file_path_hash {
            return Ok(());
        }
        match anchor {
            Some(anchor)
                if anchor.lookup_hash == self.file_path_hash
                    && anchor.is_dir()
                    && path::is_within(&requested.parent_path, &anchor.path) =>
            {
                Ok(())
            }
            _ => Err(MarkerError::OutOfScope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobber_crypto::{lookup_hash, Ed25519Verifier};

    fn allocation(owner: &SigningKey) -> Allocation {
        Allocation {
            id: "alloc".into(),
            tx: "tx".into(),
            owner_id: owner.client_id(),
            owner_public_key: owner.verifying_key(),
            payer_id: owner.client_id(),
            repairer_id: None,
            size: 100,
            used_size: 0,
            blobber_size: 100,
            blobber_size_used: 0,
            expiration: Timestamp::from_secs(i64::MAX),
            is_immutable: false,
            allocation_root: None,
            is_redeem_required: false,
            terms: vec![],
        }
    }

    fn ticket(owner: &SigningKey, grantee: Option<ClientId>, anchor: &str) -> AuthTicket {
        UnsignedAuthTicket {
            client_id: grantee,
            allocation_id: "alloc".into(),
            file_path_hash: lookup_hash("alloc", anchor),
            file_name: path::name(anchor).into(),
            ref_type: RefType::Directory,
            expiration: Timestamp::from_secs(1_000),
            timestamp: Timestamp::from_secs(1),
        }
        .sign(owner)
    }

    #[test]
    fn verifies_for_grantee() {
        let owner = SigningKey::from_bytes([1; 32]);
        let reader = ClientId::from_public_key(b"reader");
        let t = ticket(&owner, Some(reader), "/shared");
        let alloc = allocation(&owner);
        let now = Timestamp::from_secs(10);
        assert!(t.verify(&alloc, &reader, now, &Ed25519Verifier).is_ok());
        assert_eq!(
            t.verify(&alloc, &ClientId::from_public_key(b"other"), now, &Ed25519Verifier),
            Err(MarkerError::NotGrantee)
        );
    }

    #[test]
    fn open_ticket_accepts_anyone_until_expiry() {
        let owner = SigningKey::from_bytes([1; 32]);
        let t = ticket(&owner, None, "/shared");
        let alloc = allocation(&owner);
        let anyone = ClientId::from_public_key(b"anyone");
        assert!(t
            .verify(&alloc, &anyone, Timestamp::from_secs(999), &Ed25519Verifier)
            .is_ok());
        assert_eq!(
            t.verify(&alloc, &anyone, Timestamp::from_secs(1_001), &Ed25519Verifier),
            Err(MarkerError::Expired)
        );
    }

    #[test]
    fn forged_ticket_fails() {
        let owner = SigningKey::from_bytes([1; 32]);
        let forger = SigningKey::from_bytes([2; 32]);
        let mut t = ticket(&forger, None, "/shared");
        t.owner_id = owner.client_id();
        assert_eq!(
            t.verify(
                &allocation(&owner),
                &forger.client_id(),
                Timestamp::from_secs(1),
                &Ed25519Verifier
            ),
            Err(MarkerError::InvalidSignature)
        );
    }

    #[test]
    fn covers_subtree_by_component() {
        let owner = SigningKey::from_bytes([1; 32]);
        let t = ticket(&owner, None, "/shared");
        let ts = Timestamp::from_secs(0);
        let anchor = RefNode::directory("alloc", "/shared", ts);
        let inside = RefNode::directory("alloc", "/shared/deep/x", ts);
        let sibling = RefNode::directory("alloc", "/shared2/x", ts);

        assert!(t.covers(&anchor, None).is_ok());
        assert!(t.covers(&inside, Some(&anchor)).is_ok());
        assert_eq!(t.covers(&sibling, Some(&anchor)), Err(MarkerError::OutOfScope));
        assert_eq!(t.covers(&inside, None), Err(MarkerError::OutOfScope));
    }
}
