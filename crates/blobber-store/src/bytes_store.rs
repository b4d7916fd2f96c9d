use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use blobber_crypto::MerkleTree;
use blobber_types::Digest;

use crate::error::{StoreError, StoreResult};

/// What the byte store computed for a written file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockWrite {
    pub content_hash: Digest,
    pub merkle_root: Digest,
    pub size: u64,
}

/// Content-addressed file bytes.
///
/// Writes are staged under a connection and only become readable after
/// [`commit`](ByteStore::commit). The hashes returned by
/// [`write_block`](ByteStore::write_block) are authoritative.
#[async_trait]
pub trait ByteStore: Send + Sync {
    async fn write_block(
        &self,
        allocation_id: &str,
        connection_id: &str,
        data: Bytes,
    ) -> StoreResult<BlockWrite>;

    /// Read `num_blocks` blocks starting at `block_num` (zero based).
    async fn read_block(
        &self,
        allocation_id: &str,
        content_hash: &Digest,
        block_num: u64,
        num_blocks: u64,
    ) -> StoreResult<Bytes>;

    /// Promote content staged under `connection_id` to durable storage.
    async fn commit(
        &self,
        allocation_id: &str,
        connection_id: &str,
        content_hash: &Digest,
    ) -> StoreResult<()>;

    /// Release durable content.
    async fn delete(&self, allocation_id: &str, content_hash: &Digest) -> StoreResult<()>;

    /// Drop everything still staged under `connection_id`.
    async fn discard(&self, allocation_id: &str, connection_id: &str) -> StoreResult<()>;
}

type Staged = HashMap<(String, String), HashMap<Digest, Bytes>>;

/// `HashMap`-backed byte store.
pub struct InMemoryByteStore {
    chunk_size: u64,
    staged: RwLock<Staged>,
    durable: RwLock<HashMap<(String, Digest), Bytes>>,
}

impl InMemoryByteStore {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size,
            staged: RwLock::new(HashMap::new()),
            durable: RwLock::new(HashMap::new()),
        }
    }

    /// Is `content_hash` durable for `allocation_id`?
    pub fn contains(&self, allocation_id: &str, content_hash: &Digest) -> bool {
        self.durable
            .read()
            .map(|d| d.contains_key(&(allocation_id.to_string(), *content_hash)))
            .unwrap_or(false)
    }

    /// Number of staged objects across all connections.
    pub fn staged_count(&self) -> usize {
        self.staged
            .read()
            .map(|s| s.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Poisoned("byte store".into())
}

#[async_trait]
impl ByteStore for InMemoryByteStore {
    async fn write_block(
        &self,
        allocation_id: &str,
        connection_id: &str,
        data: Bytes,
    ) -> StoreResult<BlockWrite> {
        let chunk_size = usize::try_from(self.chunk_size).unwrap_or(usize::MAX);
        let written = BlockWrite {
            content_hash: Digest::of(&data),
            merkle_root: MerkleTree::from_chunks(&data, chunk_size).root(),
            size: data.len() as u64,
        };
        self.staged
            .write()
            .map_err(poisoned)?
            .entry((allocation_id.to_string(), connection_id.to_string()))
            .or_default()
            .insert(written.content_hash, data);
        debug!(
            allocation_id,
            connection_id,
            content_hash = %written.content_hash.short_hex(),
            size = written.size,
            "content staged"
        );
        Ok(written)
    }

    async fn read_block(
        &self,
        allocation_id: &str,
        content_hash: &Digest,
        block_num: u64,
        num_blocks: u64,
    ) -> StoreResult<Bytes> {
        let data = self
            .durable
            .read()
            .map_err(poisoned)?
            .get(&(allocation_id.to_string(), *content_hash))
            .cloned()
            .ok_or(StoreError::ContentNotFound(*content_hash))?;

        let out_of_range = StoreError::BlockOutOfRange {
            content_hash: *content_hash,
            block_num,
            num_blocks,
        };
        let start = block_num
            .checked_mul(self.chunk_size)
            .ok_or_else(|| out_of_range.clone())?;
        if start >= data.len() as u64 && !(start == 0 && data.is_empty()) {
            return Err(out_of_range);
        }
        let end = num_blocks
            .checked_mul(self.chunk_size)
            .and_then(|len| start.checked_add(len))
            .map_or(data.len() as u64, |end| end.min(data.len() as u64));
        Ok(data.slice(start as usize..end as usize))
    }

    async fn commit(
        &self,
        allocation_id: &str,
        connection_id: &str,
        content_hash: &Digest,
    ) -> StoreResult<()> {
        let key = (allocation_id.to_string(), connection_id.to_string());
        let data = self
            .staged
            .write()
            .map_err(poisoned)?
            .get_mut(&key)
            .and_then(|staged| staged.remove(content_hash));
        let mut durable = self.durable.write().map_err(poisoned)?;
        let durable_key = (allocation_id.to_string(), *content_hash);
        match data {
            Some(data) => {
                durable.insert(durable_key, data);
                Ok(())
            }
            // Copies and repeated uploads reference content that is already durable.
            None if durable.contains_key(&durable_key) => Ok(()),
            None => Err(StoreError::ContentNotFound(*content_hash)),
        }
    }

    async fn delete(&self, allocation_id: &str, content_hash: &Digest) -> StoreResult<()> {
        self.durable
            .write()
            .map_err(poisoned)?
            .remove(&(allocation_id.to_string(), *content_hash));
        Ok(())
    }

    async fn discard(&self, allocation_id: &str, connection_id: &str) -> StoreResult<()> {
        self.staged
            .write()
            .map_err(poisoned)?
            .remove(&(allocation_id.to_string(), connection_id.to_string()));
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryByteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryByteStore")
            .field("chunk_size", &self.chunk_size)
            .field("staged", &self.staged_count())
            .finish()
    }
}
