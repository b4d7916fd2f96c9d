//! Read-marker redemption: serving blocks against a signed, monotonic
//! read counter.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use blobber_markers::{AuthTicket, MarkerError, ReadMarker, ReadMarkerEntity};
use blobber_store::WriteBatch;
use blobber_types::Timestamp;

use crate::context::{NodeContext, RequestContext};
use crate::error::{CoreError, CoreResult};
use crate::lock::READ_MARKER_LOCKS;
use crate::query::FileLocator;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    Content,
    Thumbnail,
}

#[derive(Clone, Debug)]
pub struct DownloadRequest {
    pub allocation_id: String,
    pub file: FileLocator,
    /// First block to read, zero based.
    pub block_num: u64,
    /// Defaults to one block. Zero serves no data and charges nothing but
    /// still records the marker.
    pub num_blocks: Option<u64>,
    pub read_marker: ReadMarker,
    pub auth_ticket: Option<AuthTicket>,
    pub content: ContentKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadResponse {
    pub success: bool,
    pub allocation_id: String,
    pub path: String,
    pub data: Bytes,
    /// On a counter mismatch, the marker the client must continue from.
    pub latest_rm: Option<ReadMarker>,
}

impl NodeContext {
    /// Serve blocks of a file, redeeming the attached read marker.
    ///
    /// A counter that does not continue the stored marker is not an error:
    /// the response has `success == false` and carries the stored marker.
    pub async fn download_file(
        &self,
        req: &RequestContext,
        request: DownloadRequest,
    ) -> CoreResult<DownloadResponse> {
        let now = Timestamp::now();
        let allocation = self.request_allocation(req, &request.allocation_id, now)?;
        let num_blocks = request.num_blocks.unwrap_or(1);

        let marker = request.read_marker;
        marker
            .verify(&allocation, self.blobber_id(), self.verifier.as_ref())
            .map_err(CoreError::InvalidMarker)?;
        if marker.client_id != req.client_id {
            return Err(CoreError::InvalidMarker(MarkerError::ClientMismatch));
        }

        let tree = self.load_tree(&allocation)?;
        let node = request.file.resolve(&tree)?;
        if !node.is_file() {
            return Err(CoreError::InvalidParameters(format!("{} is a directory", node.path)));
        }

        // Owners and payers read on their own pools; everyone else reads
        // through a ticket and its issuer pays.
        let payer = if allocation.can_upload(&req.client_id) && request.auth_ticket.is_none() {
            req.client_id
        } else {
            let ticket = request
                .auth_ticket
                .as_ref()
                .ok_or_else(|| CoreError::Unauthorized("auth ticket required".into()))?;
            self.authorize_ticket(req, &allocation, &tree, node, ticket, now)?;
            ticket.owner_id
        };

        let content_hash = match request.content {
            ContentKind::Content => node.content_hash,
            ContentKind::Thumbnail => node.thumbnail_hash,
        }
        .ok_or_else(|| CoreError::NotFound(format!("{} has no {:?}", node.path, request.content)))?;

        let client_key = format!("{}:{}", allocation.id, marker.client_id);
        let _lock = self.locks.acquire(READ_MARKER_LOCKS, &client_key).await?;

        let stored = self.store.read_marker(&allocation.id, &marker.client_id)?;
        if let Some(stored) = &stored {
            if !stored.accepts(&marker, num_blocks) {
                info!(
                    allocation_id = %allocation.id,
                    client_id = %marker.client_id,
                    latest = stored.latest.read_counter,
                    received = marker.read_counter,
                    num_blocks,
                    "read counter mismatch"
                );
                return Ok(DownloadResponse {
                    success: false,
                    allocation_id: allocation.id,
                    path: node.path.clone(),
                    data: Bytes::new(),
                    latest_rm: Some(stored.latest.clone()),
                });
            }
        }

        let pend_num_blocks = stored.as_ref().map_or(0, ReadMarkerEntity::pend_num_blocks);
        self.read_pre_redeem(&allocation, num_blocks, pend_num_blocks, &payer)
            .await?;

        let data = if num_blocks == 0 {
            Bytes::new()
        } else {
            self.bytes
                .read_block(&allocation.id, &content_hash, request.block_num, num_blocks)
                .await?
        };

        let entity = match stored {
            Some(mut entity) => {
                entity.advance(marker.clone());
                entity
            }
            None => ReadMarkerEntity::new(marker.clone()),
        };
        let mut batch = WriteBatch::new();
        batch
            .put_read_marker(&allocation.id, marker.client_id, entity)
            .record_file_download(&allocation.id, node.lookup_hash, now);
        self.store.commit(batch)?;

        debug!(
            allocation_id = %allocation.id,
            path = %node.path,
            block_num = request.block_num,
            bytes = data.len(),
            read_counter = marker.read_counter,
            "blocks served"
        );
        Ok(DownloadResponse {
            success: true,
            allocation_id: allocation.id,
            path: node.path.clone(),
            data,
            latest_rm: None,
        })
    }
}
