use blobber_alloc::{Allocation, AllocationChangeCollector, Pending, PoolSnapshot};
use blobber_markers::{ReadMarkerEntity, WriteMarkerEntity};
use blobber_reftree::ReferenceTree;
use blobber_types::{ClientId, Digest, Timestamp};

/// One row-level write.
#[derive(Clone, Debug)]
pub enum Mutation {
    PutAllocation(Allocation),
    PutTree(ReferenceTree),
    PutConnection(AllocationChangeCollector),
    DeleteConnection(String),
    PutWriteMarker {
        allocation_id: String,
        entity: WriteMarkerEntity,
    },
    PutReadMarker {
        allocation_id: String,
        client_id: ClientId,
        entity: ReadMarkerEntity,
    },
    PutPools {
        allocation_id: String,
        client_id: ClientId,
        snapshot: PoolSnapshot,
    },
    PutPending(Pending),
    /// Bump a file's update counter; applied against the stored row.
    RecordFileUpdate {
        allocation_id: String,
        lookup_hash: Digest,
        at: Timestamp,
    },
    /// Bump a file's download counter; applied against the stored row.
    RecordFileDownload {
        allocation_id: String,
        lookup_hash: Digest,
        at: Timestamp,
    },
}

/// An ordered set of mutations applied as one transaction.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    mutations: Vec<Mutation>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    pub fn put_allocation(&mut self, allocation: Allocation) -> &mut Self {
        self.push(Mutation::PutAllocation(allocation))
    }

    pub fn put_tree(&mut self, tree: ReferenceTree) -> &mut Self {
        self.push(Mutation::PutTree(tree))
    }

    pub fn put_connection(&mut self, connection: AllocationChangeCollector) -> &mut Self {
        self.push(Mutation::PutConnection(connection))
    }

    pub fn put_write_marker(&mut self, allocation_id: &str, entity: WriteMarkerEntity) -> &mut Self {
        self.push(Mutation::PutWriteMarker {
            allocation_id: allocation_id.to_string(),
            entity,
        })
    }

    pub fn put_read_marker(
        &mut self,
        allocation_id: &str,
        client_id: ClientId,
        entity: ReadMarkerEntity,
    ) -> &mut Self {
        self.push(Mutation::PutReadMarker {
            allocation_id: allocation_id.to_string(),
            client_id,
            entity,
        })
    }

    pub fn put_pools(
        &mut self,
        allocation_id: &str,
        client_id: ClientId,
        snapshot: PoolSnapshot,
    ) -> &mut Self {
        self.push(Mutation::PutPools {
            allocation_id: allocation_id.to_string(),
            client_id,
            snapshot,
        })
    }

    pub fn put_pending(&mut self, pending: Pending) -> &mut Self {
        self.push(Mutation::PutPending(pending))
    }

    pub fn record_file_update(
        &mut self,
        allocation_id: &str,
        lookup_hash: Digest,
        at: Timestamp,
    ) -> &mut Self {
        self.push(Mutation::RecordFileUpdate {
            allocation_id: allocation_id.to_string(),
            lookup_hash,
            at,
        })
    }

    pub fn record_file_download(
        &mut self,
        allocation_id: &str,
        lookup_hash: Digest,
        at: Timestamp,
    ) -> &mut Self {
        self.push(Mutation::RecordFileDownload {
            allocation_id: allocation_id.to_string(),
            lookup_hash,
            at,
        })
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

impl IntoIterator for WriteBatch {
    type Item = Mutation;
    type IntoIter = std::vec::IntoIter<Mutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.into_iter()
    }
}
