use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use blobber_alloc::{Allocation, AllocationChangeCollector, Pending, PoolSnapshot};
use blobber_markers::{ReadMarkerEntity, WriteMarkerEntity};
use blobber_reftree::{FileStats, ReferenceTree};
use blobber_types::{ClientId, Digest};

use crate::batch::{Mutation, WriteBatch};
use crate::error::{StoreError, StoreResult};
use crate::traits::MetaStore;

#[derive(Default)]
struct Tables {
    allocations: HashMap<String, Allocation>,
    trees: HashMap<String, ReferenceTree>,
    connections: HashMap<String, AllocationChangeCollector>,
    /// Per allocation, in commit order.
    write_markers: HashMap<String, Vec<WriteMarkerEntity>>,
    read_markers: HashMap<(String, ClientId), ReadMarkerEntity>,
    pools: HashMap<(String, ClientId), PoolSnapshot>,
    pending: HashMap<(String, ClientId, String), Pending>,
    file_stats: HashMap<(String, Digest), FileStats>,
}

/// In-memory metadata store.
///
/// All tables sit behind one `RwLock`, so a batch applied under the write
/// lock is invisible to readers until it is complete. Intended for tests
/// and embedding.
pub struct InMemoryMetaStore {
    tables: RwLock<Tables>,
    fail_next_commit: AtomicBool,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            fail_next_commit: AtomicBool::new(false),
        }
    }

    /// Make the next `commit` fail without writing anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of connections currently stored.
    pub fn connection_count(&self) -> usize {
        self.read()
            .map(|tables| tables.connections.len())
            .unwrap_or_default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Poisoned("meta store".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Poisoned("meta store".into()))
    }
}

impl Default for InMemoryMetaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaStore for InMemoryMetaStore {
    fn allocation(&self, allocation_id: &str) -> StoreResult<Option<Allocation>> {
        Ok(self.read()?.allocations.get(allocation_id).cloned())
    }

    fn reference_tree(&self, allocation_id: &str) -> StoreResult<Option<ReferenceTree>> {
        Ok(self.read()?.trees.get(allocation_id).cloned())
    }

    fn connection(&self, connection_id: &str) -> StoreResult<Option<AllocationChangeCollector>> {
        Ok(self.read()?.connections.get(connection_id).cloned())
    }

    fn write_marker(
        &self,
        allocation_id: &str,
        allocation_root: &Digest,
    ) -> StoreResult<Option<WriteMarkerEntity>> {
        Ok(self
            .read()?
            .write_markers
            .get(allocation_id)
            .and_then(|markers| {
                markers
                    .iter()
                    .rev()
                    .find(|e| e.marker.allocation_root == *allocation_root)
            })
            .cloned())
    }

    fn write_markers(&self, allocation_id: &str) -> StoreResult<Vec<WriteMarkerEntity>> {
        Ok(self
            .read()?
            .write_markers
            .get(allocation_id)
            .cloned()
            .unwrap_or_default())
    }

    fn read_marker(
        &self,
        allocation_id: &str,
        client_id: &ClientId,
    ) -> StoreResult<Option<ReadMarkerEntity>> {
        Ok(self
            .read()?
            .read_markers
            .get(&(allocation_id.to_string(), *client_id))
            .cloned())
    }

    fn pools(&self, allocation_id: &str, client_id: &ClientId) -> StoreResult<PoolSnapshot> {
        Ok(self
            .read()?
            .pools
            .get(&(allocation_id.to_string(), *client_id))
            .cloned()
            .unwrap_or_default())
    }

    fn pending(
        &self,
        allocation_id: &str,
        client_id: &ClientId,
        blobber_id: &str,
    ) -> StoreResult<Option<Pending>> {
        Ok(self
            .read()?
            .pending
            .get(&(allocation_id.to_string(), *client_id, blobber_id.to_string()))
            .cloned())
    }

    fn file_stats(
        &self,
        allocation_id: &str,
        lookup_hash: &Digest,
    ) -> StoreResult<Option<FileStats>> {
        Ok(self
            .read()?
            .file_stats
            .get(&(allocation_id.to_string(), *lookup_hash))
            .cloned())
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        let count = batch.len();
        let mut tables = self.write()?;
        for mutation in batch {
            match mutation {
                Mutation::PutAllocation(allocation) => {
                    tables.allocations.insert(allocation.id.clone(), allocation);
                }
                Mutation::PutTree(tree) => {
                    tables.trees.insert(tree.allocation_id().to_string(), tree);
                }
                Mutation::PutConnection(connection) => {
                    tables
                        .connections
                        .insert(connection.connection_id.clone(), connection);
                }
                Mutation::DeleteConnection(connection_id) => {
                    tables.connections.remove(&connection_id);
                }
                Mutation::PutWriteMarker {
                    allocation_id,
                    entity,
                } => {
                    tables
                        .write_markers
                        .entry(allocation_id)
                        .or_default()
                        .push(entity);
                }
                Mutation::PutReadMarker {
                    allocation_id,
                    client_id,
                    entity,
                } => {
                    tables.read_markers.insert((allocation_id, client_id), entity);
                }
                Mutation::PutPools {
                    allocation_id,
                    client_id,
                    snapshot,
                } => {
                    tables.pools.insert((allocation_id, client_id), snapshot);
                }
                Mutation::PutPending(pending) => {
                    let key = (
                        pending.allocation_id.clone(),
                        pending.client_id,
                        pending.blobber_id.clone(),
                    );
                    tables.pending.insert(key, pending);
                }
                Mutation::RecordFileUpdate {
                    allocation_id,
                    lookup_hash,
                    at,
                } => {
                    tables
                        .file_stats
                        .entry((allocation_id, lookup_hash))
                        .or_default()
                        .record_update(at);
                }
                Mutation::RecordFileDownload {
                    allocation_id,
                    lookup_hash,
                    at,
                } => {
                    tables
                        .file_stats
                        .entry((allocation_id, lookup_hash))
                        .or_default()
                        .record_download(at);
                }
            }
        }
        debug!(mutations = count, "meta batch committed");
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryMetaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (allocations, connections) = self
            .read()
            .map(|t| (t.allocations.len(), t.connections.len()))
            .unwrap_or_default();
        f.debug_struct("InMemoryMetaStore")
            .field("allocations", &allocations)
            .field("connections", &connections)
            .finish()
    }
}
