use std::sync::Arc;

use blobber_alloc::Allocation;
use blobber_crypto::{Ed25519Verifier, Signature, SignatureVerifier, VerifyingKey};
use blobber_markers::WriteMarkerEntity;
use blobber_reftree::ReferenceTree;
use blobber_store::{ByteStore, MetaStore, PoolLedger};
use blobber_types::{ClientId, Digest, Timestamp};
use tracing::debug;

use crate::config::BlobberConfig;
use crate::error::{CoreError, CoreResult};
use crate::lock::LockRegistry;

/// Everything an operation needs from the node: identity, configuration,
/// storage, the ledger, signature checking, and the lock registry.
///
/// Cloning is cheap; clones share stores and locks.
#[derive(Clone)]
pub struct NodeContext {
    pub config: BlobberConfig,
    pub store: Arc<dyn MetaStore>,
    pub bytes: Arc<dyn ByteStore>,
    pub ledger: Arc<dyn PoolLedger>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub locks: LockRegistry,
}

/// The authenticated caller of one request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub client_id: ClientId,
    pub client_key: Option<VerifyingKey>,
    /// Allocation transaction the caller addressed, when it named one.
    pub allocation_tx: Option<String>,
    /// Owner signature over the hash of the allocation transaction.
    pub signature: Option<Signature>,
}

impl RequestContext {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            client_key: None,
            allocation_tx: None,
            signature: None,
        }
    }

    /// Caller identified by its public key.
    pub fn with_key(client_key: VerifyingKey) -> Self {
        Self {
            client_id: client_key.to_client_id(),
            client_key: Some(client_key),
            allocation_tx: None,
            signature: None,
        }
    }

    pub fn signed(mut self, allocation_tx: impl Into<String>, signature: Signature) -> Self {
        self.allocation_tx = Some(allocation_tx.into());
        self.signature = Some(signature);
        self
    }

    /// The caller's key, required to match the claimed client id.
    pub(crate) fn verified_key(&self) -> CoreResult<&VerifyingKey> {
        match &self.client_key {
            Some(key) if key.to_client_id() == self.client_id => Ok(key),
            Some(_) => Err(CoreError::Unauthorized(
                "public key does not match client id".into(),
            )),
            None => Err(CoreError::Unauthorized("client public key required".into())),
        }
    }
}

impl NodeContext {
    pub fn new(
        config: BlobberConfig,
        store: Arc<dyn MetaStore>,
        bytes: Arc<dyn ByteStore>,
        ledger: Arc<dyn PoolLedger>,
    ) -> Self {
        let locks = LockRegistry::new(config.lock_wait());
        Self {
            config,
            store,
            bytes,
            ledger,
            verifier: Arc::new(Ed25519Verifier),
            locks,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn blobber_id(&self) -> &str {
        &self.config.blobber_id
    }

    /// Load an allocation that exists and has not expired.
    pub fn verify_allocation(&self, allocation_id: &str, now: Timestamp) -> CoreResult<Allocation> {
        let allocation = self
            .store
            .allocation(allocation_id)?
            .ok_or_else(|| CoreError::InvalidAllocation(format!("{allocation_id} not found")))?;
        if allocation.is_expired(now) {
            return Err(CoreError::InvalidAllocation(format!(
                "{allocation_id} expired at {}",
                allocation.expiration
            )));
        }
        Ok(allocation)
    }

    /// Like [`verify_allocation`](Self::verify_allocation), also checking
    /// any transaction the caller named.
    pub(crate) fn request_allocation(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        now: Timestamp,
    ) -> CoreResult<Allocation> {
        let allocation = self.verify_allocation(allocation_id, now)?;
        if let Some(tx) = &req.allocation_tx {
            if *tx != allocation.tx {
                return Err(CoreError::InvalidAllocation(format!(
                    "transaction {tx} does not belong to {allocation_id}"
                )));
            }
        }
        Ok(allocation)
    }

    pub(crate) fn require_owner(&self, req: &RequestContext, allocation: &Allocation) -> CoreResult<()> {
        if allocation.is_owner(&req.client_id) {
            Ok(())
        } else {
            Err(CoreError::Unauthorized(format!(
                "{} does not own {}",
                req.client_id, allocation.id
            )))
        }
    }

    /// Owner-only query check: the request must carry the owner's signature
    /// over the hash of the allocation transaction.
    pub(crate) fn verify_owner_signature(
        &self,
        req: &RequestContext,
        allocation: &Allocation,
    ) -> CoreResult<()> {
        self.require_owner(req, allocation)?;
        let signature = req
            .signature
            .as_ref()
            .ok_or_else(|| CoreError::Unauthorized("request signature required".into()))?;
        let message = Digest::of_str(&allocation.tx);
        if !self
            .verifier
            .verify(&allocation.owner_public_key, signature, &message)
        {
            debug!(allocation_id = %allocation.id, "request signature rejected");
            return Err(CoreError::Unauthorized("invalid request signature".into()));
        }
        Ok(())
    }

    /// The committed tree, or an empty one before the first commit.
    pub(crate) fn load_tree(&self, allocation: &Allocation) -> CoreResult<ReferenceTree> {
        Ok(self
            .store
            .reference_tree(&allocation.id)?
            .unwrap_or_else(|| ReferenceTree::new(allocation.id.clone(), self.config.chunk_size)))
    }

    /// The marker that committed the allocation's current root.
    pub(crate) fn latest_write_marker(
        &self,
        allocation: &Allocation,
    ) -> CoreResult<Option<WriteMarkerEntity>> {
        match &allocation.allocation_root {
            Some(root) => Ok(self.store.write_marker(&allocation.id, root)?),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("blobber_id", &self.config.blobber_id)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}
