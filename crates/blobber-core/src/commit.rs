//! The write-commit state machine.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use blobber_crypto::allocation_root;
use blobber_markers::{MarkerError, WriteMarker, WriteMarkerEntity};
use blobber_reftree::{AllocationChange, ChangeOp, ReferenceTree};
use blobber_store::WriteBatch;
use blobber_types::{Digest, Timestamp};

use crate::context::{NodeContext, RequestContext};
use crate::error::{CoreError, CoreResult};
use crate::lock::{ALLOCATION_LOCKS, CONNECTION_LOCKS};

/// A client's request to seal a connection with a signed write marker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitRequest {
    pub allocation_id: String,
    pub connection_id: String,
    pub write_marker: WriteMarker,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    pub allocation_root: Digest,
    pub write_marker: WriteMarker,
    /// Net bytes the commit added to the allocation.
    pub size: i64,
}

impl NodeContext {
    /// Apply a connection's staged changes and record the write marker.
    ///
    /// Every failure before the metadata batch leaves allocation, tree,
    /// markers, pools, and the connection exactly as they were. A marker
    /// built on a stale root fails with [`CoreError::RejectedRoot`], which
    /// carries the current root and the marker that committed it.
    pub async fn commit_write(
        &self,
        req: &RequestContext,
        request: CommitRequest,
    ) -> CoreResult<CommitResult> {
        let CommitRequest {
            allocation_id,
            connection_id,
            write_marker: marker,
        } = request;
        if connection_id.is_empty() {
            return Err(CoreError::InvalidParameters("connection id required".into()));
        }
        let client_key = req.verified_key()?.clone();
        let allocation = self.request_allocation(req, &allocation_id, Timestamp::now())?;
        self.require_owner(req, &allocation)?;

        let _lock = self.locks.acquire(ALLOCATION_LOCKS, &allocation.id).await?;
        // Staging rewrites the connection row under this lock; holding it
        // keeps a late stage from resurrecting a committed connection.
        // Staging never takes the allocation lock, so the order is safe.
        let _connection_lock = self.locks.acquire(CONNECTION_LOCKS, &connection_id).await?;
        info!(allocation_id = %allocation.id, connection_id = %connection_id, "commit started");

        // Re-read under the lock; the pre-lock copy may predate a commit.
        let allocation = self.verify_allocation(&allocation.id, Timestamp::now())?;

        let mut connection = self
            .store
            .connection(&connection_id)?
            .ok_or_else(|| CoreError::InvalidConnection(format!("{connection_id} not found")))?;
        connection.validate(&allocation.id, &req.client_id)?;
        if connection.is_empty() {
            return Err(CoreError::InvalidConnection(format!(
                "{connection_id} has no staged changes"
            )));
        }

        if allocation.exceeds_capacity(connection.size) {
            return Err(CoreError::MaxAllocationSize {
                requested: connection.size,
                used: allocation.blobber_size_used,
                capacity: allocation.blobber_size,
            });
        }

        let latest = self.latest_write_marker(&allocation)?;
        match marker.verify(
            &allocation,
            self.blobber_id(),
            &client_key,
            connection.size,
            self.verifier.as_ref(),
        ) {
            Ok(()) => {}
            Err(err @ MarkerError::PreviousRootMismatch { .. }) => {
                info!(allocation_id = %allocation.id, %err, "stale write marker");
                return Err(CoreError::RejectedRoot {
                    reason: err.to_string(),
                    allocation_root: allocation.allocation_root,
                    latest_marker: latest.map(Box::new),
                });
            }
            Err(err) => return Err(CoreError::InvalidMarker(err)),
        }

        let pending = self
            .write_pre_redeem(&allocation, connection.size, &allocation.owner_id)
            .await?;

        let old_tree = self.load_tree(&allocation)?;
        let mut tree = old_tree.clone();
        connection.apply_changes(&mut tree, marker.timestamp)?;
        let root_hash = tree.compute_root(false);
        let computed = allocation_root(&root_hash, marker.timestamp);
        if computed != marker.allocation_root {
            warn!(
                allocation_id = %allocation.id,
                computed = %computed,
                claimed = %marker.allocation_root,
                "allocation root mismatch"
            );
            return Err(CoreError::RejectedRoot {
                reason: format!(
                    "computed root {computed} does not match marker root {}",
                    marker.allocation_root
                ),
                allocation_root: allocation.allocation_root,
                latest_marker: latest.map(Box::new),
            });
        }

        let size = connection.size;
        let mut updated = allocation.clone();
        updated.apply_size_delta(size);
        updated.allocation_root = Some(computed);
        updated.is_redeem_required = true;

        let staged_content = staged_content(&connection.changes);
        let released_content = released_content(&old_tree, &tree);
        let updated_files = updated_files(&connection.changes, &tree);

        let mut batch = WriteBatch::new();
        batch
            .put_allocation(updated)
            .put_write_marker(
                &allocation.id,
                WriteMarkerEntity::accepted(marker.clone(), connection_id.clone(), client_key),
            )
            .put_tree(tree);
        if let Some(pending) = pending {
            batch.put_pending(pending);
        }
        for lookup_hash in updated_files {
            batch.record_file_update(&allocation.id, lookup_hash, marker.timestamp);
        }
        self.store.commit(batch)?;

        self.commit_to_file_store(
            &allocation.id,
            &connection_id,
            &staged_content,
            &released_content,
        )
        .await?;

        connection.mark_committed();
        let mut close = WriteBatch::new();
        close.put_connection(connection);
        self.store.commit(close)?;

        info!(
            allocation_id = %allocation.id,
            connection_id = %connection_id,
            allocation_root = %computed,
            size,
            "commit accepted"
        );
        Ok(CommitResult {
            allocation_root: computed,
            write_marker: marker,
            size,
        })
    }

    /// Promote newly staged content and release content no live file uses.
    async fn commit_to_file_store(
        &self,
        allocation_id: &str,
        connection_id: &str,
        staged: &[Digest],
        released: &[Digest],
    ) -> CoreResult<()> {
        for content_hash in staged {
            let promoted = self
                .bytes
                .commit(allocation_id, connection_id, content_hash)
                .await;
            if let Err(err) = promoted {
                warn!(
                    allocation_id,
                    connection_id,
                    content_hash = %content_hash,
                    %err,
                    "content commit failed"
                );
                return Err(err.into());
            }
        }
        for content_hash in released {
            if let Err(err) = self.bytes.delete(allocation_id, content_hash).await {
                // Metadata no longer references it; an orphan is harmless.
                warn!(allocation_id, content_hash = %content_hash, %err, "content release failed");
            }
        }
        Ok(())
    }
}

// Content and thumbnail hashes brought in by inserts and updates.
fn staged_content(changes: &[AllocationChange]) -> Vec<Digest> {
    let mut seen = HashSet::new();
    changes
        .iter()
        .filter_map(|change| match &change.op {
            ChangeOp::Insert(file) | ChangeOp::Update(file) => Some(file),
            _ => None,
        })
        .flat_map(|file| std::iter::once(file.content_hash).chain(file.thumbnail_hash))
        .filter(|hash| seen.insert(*hash))
        .collect()
}

// Lookup hashes of inserted or updated files still present in `tree`.
fn updated_files(changes: &[AllocationChange], tree: &ReferenceTree) -> Vec<Digest> {
    let mut seen = HashSet::new();
    changes
        .iter()
        .filter_map(|change| match &change.op {
            ChangeOp::Insert(file) | ChangeOp::Update(file) => tree.get(&file.path),
            _ => None,
        })
        .map(|node| node.lookup_hash)
        .filter(|hash| seen.insert(*hash))
        .collect()
}

// Content referenced by `before` and by nothing in `after`.
fn released_content(before: &ReferenceTree, after: &ReferenceTree) -> Vec<Digest> {
    let live: HashSet<Digest> = content_hashes(after).collect();
    content_hashes(before)
        .filter(|hash| !live.contains(hash))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn content_hashes(tree: &ReferenceTree) -> impl Iterator<Item = Digest> + '_ {
    tree.nodes()
        .filter(|node| node.is_file())
        .flat_map(|node| node.content_hash.into_iter().chain(node.thumbnail_hash))
}
