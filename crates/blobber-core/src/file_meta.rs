//! Per-file collaborators, commit-meta transactions, and usage stats.
//!
//! Annotations are written straight into the committed reference tree under
//! the allocation lock. They never change a hash, so no write marker is
//! involved.

use serde::{Deserialize, Serialize};
use tracing::info;

use blobber_alloc::Allocation;
use blobber_markers::AuthTicket;
use blobber_reftree::{CommitMetaTxn, FileStats, RefNode, ReferenceTree, TreeError, TreeResult};
use blobber_store::WriteBatch;
use blobber_types::{ClientId, Timestamp};

use crate::context::{NodeContext, RequestContext};
use crate::error::{CoreError, CoreResult};
use crate::lock::ALLOCATION_LOCKS;
use crate::query::FileLocator;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatsResult {
    pub meta: RefNode,
    pub stats: FileStats,
}

impl NodeContext {
    /// Grant `collaborator` ticketless metadata access to one file.
    /// Returns `false` when it already had it.
    pub async fn add_collaborator(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        file: &FileLocator,
        collaborator: ClientId,
    ) -> CoreResult<bool> {
        let allocation = self.request_allocation(req, allocation_id, Timestamp::now())?;
        self.verify_owner_signature(req, &allocation)?;
        let added = self
            .edit_file(&allocation, file, |tree, path| {
                tree.add_collaborator(path, collaborator)
            })
            .await?;
        info!(allocation_id, collaborator = %collaborator, added, "collaborator added");
        Ok(added)
    }

    /// Returns `false` when `collaborator` was not on the file.
    pub async fn remove_collaborator(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        file: &FileLocator,
        collaborator: &ClientId,
    ) -> CoreResult<bool> {
        let allocation = self.request_allocation(req, allocation_id, Timestamp::now())?;
        self.verify_owner_signature(req, &allocation)?;
        let removed = self
            .edit_file(&allocation, file, |tree, path| {
                tree.remove_collaborator(path, collaborator)
            })
            .await?;
        info!(allocation_id, collaborator = %collaborator, removed, "collaborator removed");
        Ok(removed)
    }

    pub fn get_collaborators(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        file: &FileLocator,
    ) -> CoreResult<Vec<ClientId>> {
        let allocation = self.request_allocation(req, allocation_id, Timestamp::now())?;
        self.verify_owner_signature(req, &allocation)?;
        let tree = self.load_tree(&allocation)?;
        let node = file.resolve(&tree)?;
        require_file(node)?;
        Ok(node.collaborators.clone())
    }

    /// Attach a ledger transaction id to a file. Non-owners, and owners
    /// presenting one, need an auth ticket covering the file.
    pub async fn add_commit_meta_txn(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        file: &FileLocator,
        txn_id: &str,
        auth_ticket: Option<&AuthTicket>,
    ) -> CoreResult<()> {
        let now = Timestamp::now();
        let allocation = self.request_allocation(req, allocation_id, now)?;
        {
            let tree = self.load_tree(&allocation)?;
            let node = file.resolve(&tree)?;
            require_file(node)?;
            if !allocation.is_owner(&req.client_id) || auth_ticket.is_some() {
                let ticket = auth_ticket
                    .ok_or_else(|| CoreError::Unauthorized("auth ticket required".into()))?;
                self.authorize_ticket(req, &allocation, &tree, node, ticket, now)?;
            }
        }
        if txn_id.is_empty() {
            return Err(CoreError::InvalidParameters("txn id required".into()));
        }

        let txn = CommitMetaTxn {
            txn_id: txn_id.to_string(),
            created_at: now,
        };
        self.edit_file(&allocation, file, |tree, path| {
            tree.add_commit_meta_txn(path, txn)
        })
        .await?;
        info!(allocation_id, txn_id, "commit meta txn recorded");
        Ok(())
    }

    /// A file's metadata together with its update and download counters.
    pub fn get_file_stats(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        file: &FileLocator,
    ) -> CoreResult<FileStatsResult> {
        let allocation = self.request_allocation(req, allocation_id, Timestamp::now())?;
        self.verify_owner_signature(req, &allocation)?;
        let tree = self.load_tree(&allocation)?;
        let node = file.resolve(&tree)?;
        require_file(node)?;
        let stats = self
            .store
            .file_stats(&allocation.id, &node.lookup_hash)?
            .unwrap_or_default();
        Ok(FileStatsResult {
            meta: node.clone(),
            stats,
        })
    }

    // Re-resolves under the lock; a commit may have moved the file since
    // the caller last looked.
    async fn edit_file<T>(
        &self,
        allocation: &Allocation,
        file: &FileLocator,
        edit: impl FnOnce(&mut ReferenceTree, &str) -> TreeResult<T>,
    ) -> CoreResult<T> {
        let _lock = self.locks.acquire(ALLOCATION_LOCKS, &allocation.id).await?;
        let allocation = self.verify_allocation(&allocation.id, Timestamp::now())?;
        let mut tree = self.load_tree(&allocation)?;
        let file_path = file.resolve(&tree)?.path.clone();
        let out = edit(&mut tree, &file_path)?;

        let mut batch = WriteBatch::new();
        batch.put_tree(tree);
        self.store.commit(batch)?;
        Ok(out)
    }
}

fn require_file(node: &RefNode) -> CoreResult<()> {
    if node.is_file() {
        Ok(())
    } else {
        Err(TreeError::NotAFile(node.path.clone()).into())
    }
}
