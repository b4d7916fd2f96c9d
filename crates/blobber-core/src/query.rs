//! Read-only views of an allocation, plus forced hash recomputation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use blobber_alloc::Allocation;
use blobber_crypto::RootChainVerifier;
use blobber_markers::{AuthTicket, WriteMarker};
use blobber_reftree::{
    path, ObjectPath, RefKind, RefNode, RefType, ReferencePath, ReferenceTree, RefsPage, RefsQuery,
    TreeResult,
};
use blobber_store::WriteBatch;
use blobber_types::{Digest, Timestamp};

use crate::context::{NodeContext, RequestContext};
use crate::error::{CoreError, CoreResult};
use crate::lock::ALLOCATION_LOCKS;

/// How a request names a reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileLocator {
    Path(String),
    LookupHash(Digest),
}

impl FileLocator {
    pub(crate) fn resolve<'t>(&self, tree: &'t ReferenceTree) -> CoreResult<&'t RefNode> {
        match self {
            Self::Path(p) => {
                let normalized = path::normalize(p)?;
                tree.get(&normalized)
                    .ok_or_else(|| CoreError::NotFound(normalized.clone()))
            }
            Self::LookupHash(hash) => tree
                .get_by_lookup(hash)
                .ok_or_else(|| CoreError::NotFound(format!("lookup hash {hash}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencePathResult {
    pub reference_path: ReferencePath,
    pub latest_write_marker: Option<WriteMarker>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectPathResult {
    pub object_path: ObjectPath,
    pub latest_write_marker: Option<WriteMarker>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResult {
    pub allocation_root: Option<Digest>,
    pub meta: RefNode,
    pub entities: Vec<RefNode>,
}

/// Paginated-refs request as received from a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefsParams {
    pub path: String,
    pub kind: RefKind,
    pub offset_path: Option<String>,
    /// RFC 3339.
    pub offset_date: Option<String>,
    /// RFC 3339.
    pub updated_date: Option<String>,
    pub file_type: Option<RefType>,
    #[serde(default)]
    pub level: i64,
    pub page_limit: Option<i64>,
}

impl RefsParams {
    pub fn new(path: impl Into<String>, kind: RefKind) -> Self {
        Self {
            path: path.into(),
            kind,
            offset_path: None,
            offset_date: None,
            updated_date: None,
            file_type: None,
            level: 0,
            page_limit: None,
        }
    }

    /// Validate and convert; `max_page_limit` is both default and ceiling.
    fn to_query(&self, max_page_limit: usize) -> CoreResult<RefsQuery> {
        let page_limit = match self.page_limit {
            None => max_page_limit,
            Some(limit) if limit <= 0 => {
                return Err(CoreError::InvalidParameters(format!(
                    "page limit must be positive, got {limit}"
                )))
            }
            Some(limit) => usize::try_from(limit).map_or(max_page_limit, |l| l.min(max_page_limit)),
        };
        let level = usize::try_from(self.level).map_err(|_| {
            CoreError::InvalidParameters(format!("level must not be negative, got {}", self.level))
        })?;
        let parse_date = |raw: &Option<String>| -> CoreResult<Option<Timestamp>> {
            raw.as_deref()
                .filter(|s| !s.is_empty())
                .map(Timestamp::parse_rfc3339)
                .transpose()
                .map_err(|e| CoreError::InvalidParameters(e.to_string()))
        };

        let mut query = RefsQuery::new(self.path.clone(), self.kind, page_limit);
        query.offset_path = self.offset_path.clone().filter(|p| !p.is_empty());
        query.offset_date = parse_date(&self.offset_date)?;
        query.updated_date = parse_date(&self.updated_date)?;
        query.file_type = self.file_type;
        query.level = level;
        Ok(query)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefsResult {
    pub page: RefsPage,
    pub latest_write_marker: Option<WriteMarker>,
}

impl NodeContext {
    pub fn get_allocation_details(
        &self,
        req: &RequestContext,
        allocation_id: &str,
    ) -> CoreResult<Allocation> {
        self.request_allocation(req, allocation_id, Timestamp::now())
    }

    /// Metadata of one reference. Callers other than the owner, the
    /// repairer, or one of the file's collaborators need an auth ticket
    /// covering it, and get the reference with paths removed.
    pub fn get_file_meta(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        file: &FileLocator,
        auth_ticket: Option<&AuthTicket>,
    ) -> CoreResult<RefNode> {
        let now = Timestamp::now();
        let allocation = self.request_allocation(req, allocation_id, now)?;
        let tree = self.load_tree(&allocation)?;
        let node = file.resolve(&tree)?;
        if allocation.can_read_meta(&req.client_id) || node.collaborators.contains(&req.client_id)
        {
            return Ok(node.clone());
        }
        let ticket =
            auth_ticket.ok_or_else(|| CoreError::Unauthorized("auth ticket required".into()))?;
        self.authorize_ticket(req, &allocation, &tree, node, ticket, now)?;
        Ok(redacted(node))
    }

    /// Direct children of a directory.
    pub fn list_entities(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        dir: &FileLocator,
        auth_ticket: Option<&AuthTicket>,
    ) -> CoreResult<ListResult> {
        let now = Timestamp::now();
        let allocation = self.request_allocation(req, allocation_id, now)?;
        let tree = self.load_tree(&allocation)?;
        let node = dir.resolve(&tree)?;

        let redact = !allocation.is_owner(&req.client_id);
        if redact {
            let ticket =
                auth_ticket.ok_or_else(|| CoreError::Unauthorized("auth ticket required".into()))?;
            self.authorize_ticket(req, &allocation, &tree, node, ticket, now)?;
        }

        let listing = tree.list(&node.path)?;
        let present = |n: &RefNode| if redact { redacted(n) } else { n.clone() };
        Ok(ListResult {
            allocation_root: allocation.allocation_root,
            meta: present(&listing.meta),
            entities: listing.list.iter().map(|entry| present(&entry.meta)).collect(),
        })
    }

    /// Root listing with each requested path's ancestors expanded; what a
    /// client needs to rebuild the allocation root locally.
    pub async fn get_reference_path(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        paths: Vec<String>,
    ) -> CoreResult<ReferencePathResult> {
        let allocation = self.request_allocation(req, allocation_id, Timestamp::now())?;
        self.verify_owner_signature(req, &allocation)?;
        if paths.is_empty() {
            return Err(CoreError::InvalidParameters("at least one path required".into()));
        }

        let tree = self.load_tree(&allocation)?;
        let reference_path = self.assemble(tree, move |t| t.reference_path(&paths)).await?;
        Ok(ReferencePathResult {
            reference_path,
            latest_write_marker: self.latest_marker_of(&allocation)?,
        })
    }

    /// The full subtree under `node_path`.
    pub async fn get_object_tree(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        node_path: &str,
    ) -> CoreResult<ReferencePathResult> {
        let allocation = self.request_allocation(req, allocation_id, Timestamp::now())?;
        self.verify_owner_signature(req, &allocation)?;

        let tree = self.load_tree(&allocation)?;
        let node_path = node_path.to_string();
        let reference_path = self.assemble(tree, move |t| t.object_tree(&node_path)).await?;
        Ok(ReferencePathResult {
            reference_path,
            latest_write_marker: self.latest_marker_of(&allocation)?,
        })
    }

    /// The file holding the allocation-wide block `block_num` (zero based).
    pub async fn get_object_path(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        block_num: u64,
    ) -> CoreResult<ObjectPathResult> {
        let allocation = self.request_allocation(req, allocation_id, Timestamp::now())?;
        self.verify_owner_signature(req, &allocation)?;

        let tree = self.load_tree(&allocation)?;
        let object_path = self.assemble(tree, move |t| t.object_path(block_num)).await?;
        Ok(ObjectPathResult {
            object_path,
            latest_write_marker: self.latest_marker_of(&allocation)?,
        })
    }

    /// A page of references in path, update, or deletion order.
    pub async fn get_refs(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        params: &RefsParams,
    ) -> CoreResult<RefsResult> {
        let allocation = self.request_allocation(req, allocation_id, Timestamp::now())?;
        self.verify_owner_signature(req, &allocation)?;
        let query = params.to_query(self.config.page_limit)?;

        let tree = self.load_tree(&allocation)?;
        let page = self.assemble(tree, move |t| t.refs(&query)).await?;
        Ok(RefsResult {
            page,
            latest_write_marker: self.latest_marker_of(&allocation)?,
        })
    }

    /// Recompute every hash in the tree from its leaves and store it.
    ///
    /// The allocation root is left alone; it only changes on commit.
    pub async fn calculate_hash(
        &self,
        req: &RequestContext,
        allocation_id: &str,
        paths: &[String],
    ) -> CoreResult<Digest> {
        let allocation = self.request_allocation(req, allocation_id, Timestamp::now())?;
        self.require_owner(req, &allocation)?;

        let _lock = self.locks.acquire(ALLOCATION_LOCKS, &allocation.id).await?;
        let mut tree = self.load_tree(&allocation)?;
        for requested in paths {
            tree.lookup(&path::normalize(requested)?)?;
        }
        let root_hash = tree.compute_root(true);

        let mut batch = WriteBatch::new();
        batch.put_tree(tree);
        self.store.commit(batch)?;
        info!(allocation_id = %allocation.id, root_hash = %root_hash, "hashes recalculated");
        Ok(root_hash)
    }

    /// Check that the stored write markers form one unbroken chain ending
    /// at the current allocation root. Returns the chain length.
    pub fn verify_write_marker_chain(&self, allocation_id: &str) -> CoreResult<usize> {
        let allocation = self
            .store
            .allocation(allocation_id)?
            .ok_or_else(|| CoreError::InvalidAllocation(format!("{allocation_id} not found")))?;
        let mut markers: Vec<WriteMarker> = self
            .store
            .write_markers(allocation_id)?
            .into_iter()
            .map(|entity| entity.marker)
            .collect();
        markers.sort_by_key(|m| m.timestamp);
        RootChainVerifier::verify_chain(markers.as_slice())?;

        let tip = markers.last().map(|m| m.allocation_root);
        if tip != allocation.allocation_root {
            return Err(CoreError::InvalidAllocation(format!(
                "chain ends at {tip:?}, allocation root is {:?}",
                allocation.allocation_root
            )));
        }
        debug!(allocation_id, markers = markers.len(), "write marker chain verified");
        Ok(markers.len())
    }

    /// Verify an auth ticket and that it reaches `node`.
    pub(crate) fn authorize_ticket(
        &self,
        req: &RequestContext,
        allocation: &Allocation,
        tree: &ReferenceTree,
        node: &RefNode,
        ticket: &AuthTicket,
        now: Timestamp,
    ) -> CoreResult<()> {
        ticket
            .verify(allocation, &req.client_id, now, self.verifier.as_ref())
            .and_then(|()| ticket.covers(node, tree.get_by_lookup(&ticket.file_path_hash)))
            .map_err(|e| CoreError::Unauthorized(e.to_string()))
    }

    fn latest_marker_of(&self, allocation: &Allocation) -> CoreResult<Option<WriteMarker>> {
        Ok(self.latest_write_marker(allocation)?.map(|entity| entity.marker))
    }

    /// Build a listing off the async runtime, bounded by the listing
    /// timeout. A late result is dropped, never returned partially.
    async fn assemble<T, F>(&self, tree: ReferenceTree, build: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ReferenceTree) -> TreeResult<T> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(move || build(&tree));
        match tokio::time::timeout(self.config.listing_timeout(), task).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(join)) => Err(CoreError::Internal(format!("listing task failed: {join}"))),
            Err(_) => Err(CoreError::Timeout("assembling listing".into())),
        }
    }
}

fn redacted(node: &RefNode) -> RefNode {
    let mut node = node.clone();
    node.path.clear();
    node.parent_path.clear();
    node
}
