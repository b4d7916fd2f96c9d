//! Staging changes into a connection ahead of commit.
//!
//! Each operation validates against the committed tree, writes content to
//! the byte store's staging area, and appends a change to the connection.
//! Operations on one connection are serialized by the connection lock.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use blobber_alloc::{Allocation, AllocationChangeCollector};
use blobber_reftree::{path, AllocationChange, ChangeOp, NewFile};
use blobber_store::WriteBatch;
use blobber_types::{Digest, Timestamp};

use crate::context::{NodeContext, RequestContext};
use crate::error::{CoreError, CoreResult};
use crate::lock::CONNECTION_LOCKS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Insert,
    Update,
}

#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub allocation_id: String,
    pub connection_id: String,
    pub path: String,
    pub mode: UploadMode,
    pub data: Bytes,
    pub thumbnail: Option<Bytes>,
    pub mime_type: String,
    /// Checked against what the node computes, when given.
    pub expected_content_hash: Option<Digest>,
    pub expected_merkle_root: Option<Digest>,
    pub expected_thumbnail_hash: Option<Digest>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub path: String,
    pub content_hash: Digest,
    pub merkle_root: Digest,
    pub size: u64,
    pub thumbnail_hash: Option<Digest>,
}

impl NodeContext {
    /// Stage a new file or new content for an existing one.
    pub async fn write_file(
        &self,
        req: &RequestContext,
        request: UploadRequest,
    ) -> CoreResult<UploadResult> {
        let allocation = self.writable_allocation(req, &request.allocation_id)?;
        if !allocation.can_upload(&req.client_id) {
            return Err(CoreError::Unauthorized(format!(
                "{} cannot upload to {}",
                req.client_id, allocation.id
            )));
        }
        let file_path = path::normalize(&request.path)?;
        path::validate_name(path::name(&file_path))?;

        let _lock = self
            .locks
            .acquire(CONNECTION_LOCKS, &request.connection_id)
            .await?;
        let tree = self.load_tree(&allocation)?;
        let existing = tree.get(&file_path);
        let existing_size = match (request.mode, existing) {
            (UploadMode::Insert, Some(_)) => return Err(CoreError::AlreadyExists(file_path)),
            (UploadMode::Insert, None) => 0,
            (UploadMode::Update, None) => return Err(CoreError::NotFound(file_path)),
            (UploadMode::Update, Some(node)) if node.is_dir() => {
                return Err(CoreError::InvalidParameters(format!("{file_path} is a directory")))
            }
            (UploadMode::Update, Some(node)) => node.size,
        };

        let mut connection = self.open_connection(req, &allocation, &request.connection_id)?;
        let size = request.data.len() as u64;
        let delta = to_delta(size) - to_delta(existing_size);
        if allocation.exceeds_capacity(connection.size + delta) {
            return Err(CoreError::MaxAllocationSize {
                requested: connection.size + delta,
                used: allocation.blobber_size_used,
                capacity: allocation.blobber_size,
            });
        }

        let written = self
            .bytes
            .write_block(&allocation.id, &request.connection_id, request.data)
            .await?;
        let mismatch = request
            .expected_content_hash
            .is_some_and(|h| h != written.content_hash)
            || request
                .expected_merkle_root
                .is_some_and(|m| m != written.merkle_root);
        if mismatch {
            return Err(CoreError::InvalidParameters(format!(
                "uploaded content for {file_path} does not match the declared hashes"
            )));
        }
        let merkle_root = written.merkle_root;

        let thumbnail = match request.thumbnail {
            Some(data) => Some(
                self.bytes
                    .write_block(&allocation.id, &request.connection_id, data)
                    .await?,
            ),
            None => None,
        };
        if let Some(expected) = request.expected_thumbnail_hash {
            if thumbnail.as_ref().map(|t| t.content_hash) != Some(expected) {
                return Err(CoreError::InvalidParameters(format!(
                    "thumbnail for {file_path} does not match the declared hash"
                )));
            }
        }

        let file = NewFile {
            path: file_path.clone(),
            content_hash: written.content_hash,
            merkle_root,
            size,
            thumbnail_hash: thumbnail.as_ref().map(|t| t.content_hash),
            thumbnail_size: thumbnail.as_ref().map_or(0, |t| t.size),
            mime_type: request.mime_type,
        };
        let result = UploadResult {
            path: file_path,
            content_hash: file.content_hash,
            merkle_root,
            size,
            thumbnail_hash: file.thumbnail_hash,
        };
        let op = match request.mode {
            UploadMode::Insert => ChangeOp::Insert(file),
            UploadMode::Update => ChangeOp::Update(file),
        };
        self.stage(&mut connection, AllocationChange::new(op, delta))?;
        debug!(
            allocation_id = %allocation.id,
            connection_id = %request.connection_id,
            path = %result.path,
            size,
            "file staged"
        );
        Ok(result)
    }

    /// Stage removal of a file or directory subtree.
    pub async fn delete_file(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        connection_id: &str,
        target: &str,
    ) -> CoreResult<()> {
        let allocation = self.writable_allocation(req, allocation_id)?;
        self.require_owner(req, &allocation)?;
        let target = path::normalize(target)?;

        let _lock = self.locks.acquire(CONNECTION_LOCKS, connection_id).await?;
        let tree = self.load_tree(&allocation)?;
        let node = tree.lookup(&target)?;
        let size = -to_delta(node.size);

        let mut connection = self.open_connection(req, &allocation, connection_id)?;
        self.stage(
            &mut connection,
            AllocationChange::new(ChangeOp::Delete { path: target }, size),
        )
    }

    /// Stage a rename within the same parent directory.
    pub async fn rename_object(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        connection_id: &str,
        target: &str,
        new_name: &str,
    ) -> CoreResult<()> {
        let allocation = self.writable_allocation(req, allocation_id)?;
        self.require_owner(req, &allocation)?;
        let target = path::normalize(target)?;
        path::validate_name(new_name)?;

        let _lock = self.locks.acquire(CONNECTION_LOCKS, connection_id).await?;
        let tree = self.load_tree(&allocation)?;
        tree.lookup(&target)?;
        let sibling = path::join(path::parent(&target), new_name);
        if sibling != target && tree.get(&sibling).is_some() {
            return Err(CoreError::AlreadyExists(sibling));
        }

        let mut connection = self.open_connection(req, &allocation, connection_id)?;
        self.stage(
            &mut connection,
            AllocationChange::new(
                ChangeOp::Rename {
                    path: target,
                    new_name: new_name.to_string(),
                },
                0,
            ),
        )
    }

    /// Stage a copy of `src` into the directory `dest`.
    ///
    /// Rejected without touching the connection when `dest` is missing, is
    /// not a directory, or already holds an entry with the source's name.
    pub async fn copy_object(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        connection_id: &str,
        src: &str,
        dest: &str,
    ) -> CoreResult<()> {
        let allocation = self.writable_allocation(req, allocation_id)?;
        self.require_owner(req, &allocation)?;
        if dest.trim().is_empty() {
            return Err(CoreError::InvalidParameters("copy destination required".into()));
        }
        let src = path::normalize(src)?;
        let dest = path::normalize(dest)?;

        let _lock = self.locks.acquire(CONNECTION_LOCKS, connection_id).await?;
        let tree = self.load_tree(&allocation)?;
        let node = tree.lookup(&src)?;
        match tree.get(&dest) {
            Some(dir) if dir.is_dir() => {}
            _ => return Err(CoreError::InvalidDestination(dest)),
        }
        let target = path::join(&dest, &node.name);
        if tree.get(&target).is_some() {
            return Err(CoreError::AlreadyExists(target));
        }
        let size = to_delta(node.size);

        let mut connection = self.open_connection(req, &allocation, connection_id)?;
        if allocation.exceeds_capacity(connection.size + size) {
            return Err(CoreError::MaxAllocationSize {
                requested: connection.size + size,
                used: allocation.blobber_size_used,
                capacity: allocation.blobber_size,
            });
        }
        self.stage(
            &mut connection,
            AllocationChange::new(
                ChangeOp::Copy {
                    src_path: src,
                    dest_path: dest,
                },
                size,
            ),
        )
    }

    /// Abandon a connection and everything staged under it.
    pub async fn abort_connection(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        connection_id: &str,
    ) -> CoreResult<()> {
        let allocation = self.request_allocation(req, allocation_id, Timestamp::now())?;
        let _lock = self.locks.acquire(CONNECTION_LOCKS, connection_id).await?;
        let mut connection = self
            .store
            .connection(connection_id)?
            .ok_or_else(|| CoreError::InvalidConnection(format!("{connection_id} not found")))?;
        connection.validate(&allocation.id, &req.client_id)?;

        self.bytes.discard(&allocation.id, connection_id).await?;
        connection.abort();
        let mut batch = WriteBatch::new();
        batch.put_connection(connection);
        self.store.commit(batch)?;
        info!(allocation_id = %allocation.id, connection_id, "connection aborted");
        Ok(())
    }

    fn writable_allocation(
        &self,
        req: &RequestContext,
        allocation_id: &str,
    ) -> CoreResult<Allocation> {
        let allocation = self.request_allocation(req, allocation_id, Timestamp::now())?;
        if allocation.is_immutable {
            return Err(CoreError::InvalidAllocation(format!("{allocation_id} is immutable")));
        }
        Ok(allocation)
    }

    /// The caller's open connection, created on first use.
    fn open_connection(
        &self,
        req: &RequestContext,
        allocation: &Allocation,
        connection_id: &str,
    ) -> CoreResult<AllocationChangeCollector> {
        if connection_id.is_empty() {
            return Err(CoreError::InvalidParameters("connection id required".into()));
        }
        match self.store.connection(connection_id)? {
            Some(connection) => {
                connection.validate(&allocation.id, &req.client_id)?;
                Ok(connection)
            }
            None => Ok(AllocationChangeCollector::new(
                connection_id,
                &allocation.id,
                req.client_id,
            )),
        }
    }

    fn stage(
        &self,
        connection: &mut AllocationChangeCollector,
        change: AllocationChange,
    ) -> CoreResult<()> {
        connection.add_change(change);
        let mut batch = WriteBatch::new();
        batch.put_connection(connection.clone());
        self.store.commit(batch)?;
        Ok(())
    }
}

fn to_delta(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}
