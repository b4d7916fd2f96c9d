use blobber_alloc::{Allocation, AllocationChangeCollector, Pending, PoolSnapshot};
use blobber_markers::{ReadMarkerEntity, WriteMarkerEntity};
use blobber_reftree::{FileStats, ReferenceTree};
use blobber_types::{ClientId, Digest};

use crate::batch::WriteBatch;
use crate::error::StoreResult;

/// Transactional metadata store.
///
/// Implementations must satisfy:
/// - `commit` applies every mutation of a batch or none of them.
/// - Reads observe either the state before a batch or the state after it.
/// - Returned values are snapshots; mutating them has no effect until they
///   are written back through `commit`.
pub trait MetaStore: Send + Sync {
    fn allocation(&self, allocation_id: &str) -> StoreResult<Option<Allocation>>;

    fn reference_tree(&self, allocation_id: &str) -> StoreResult<Option<ReferenceTree>>;

    fn connection(&self, connection_id: &str) -> StoreResult<Option<AllocationChangeCollector>>;

    /// The write marker that committed `allocation_root`.
    fn write_marker(
        &self,
        allocation_id: &str,
        allocation_root: &Digest,
    ) -> StoreResult<Option<WriteMarkerEntity>>;

    /// Every stored write marker of an allocation, oldest first.
    fn write_markers(&self, allocation_id: &str) -> StoreResult<Vec<WriteMarkerEntity>>;

    fn read_marker(
        &self,
        allocation_id: &str,
        client_id: &ClientId,
    ) -> StoreResult<Option<ReadMarkerEntity>>;

    /// Locally cached pools; empty when none are known.
    fn pools(&self, allocation_id: &str, client_id: &ClientId) -> StoreResult<PoolSnapshot>;

    fn pending(
        &self,
        allocation_id: &str,
        client_id: &ClientId,
        blobber_id: &str,
    ) -> StoreResult<Option<Pending>>;

    /// Usage counters of the file at `lookup_hash`, if it has any.
    fn file_stats(&self, allocation_id: &str, lookup_hash: &Digest)
        -> StoreResult<Option<FileStats>>;

    /// Atomically apply a batch.
    fn commit(&self, batch: WriteBatch) -> StoreResult<()>;
}
