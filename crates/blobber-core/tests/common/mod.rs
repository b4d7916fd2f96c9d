#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;

use blobber_alloc::{Allocation, BlobberTerms, Pool, PoolSnapshot};
use blobber_core::{
    BlobberConfig, CommitRequest, CommitResult, CoreResult, NodeContext, RequestContext,
    UploadMode, UploadRequest, UploadResult,
};
use blobber_crypto::{allocation_root, SigningKey};
use blobber_markers::{UnsignedReadMarker, UnsignedWriteMarker, ReadMarker, WriteMarker};
use blobber_reftree::ReferenceTree;
use blobber_store::{
    ByteStore, InMemoryByteStore, InMemoryLedger, InMemoryMetaStore, MetaStore, WriteBatch,
};
use blobber_types::{ClientId, Digest, Timestamp};

pub const BLOBBER: &str = "blobber-1";
pub const ALLOCATION: &str = "alloc-1";
pub const ALLOCATION_TX: &str = "tx-alloc-1";
pub const CHUNK: u64 = 64;
pub const GIB: u64 = 1 << 30;

pub struct Fixture {
    pub ctx: NodeContext,
    pub meta: Arc<InMemoryMetaStore>,
    pub bytes: Arc<InMemoryByteStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub owner: SigningKey,
}

impl Fixture {
    /// Free reads and writes.
    pub fn new() -> Self {
        Self::with_prices(0, 0)
    }

    pub fn with_prices(read_price: u64, write_price: u64) -> Self {
        Self::build(read_price, write_price, |bytes| bytes as Arc<dyn ByteStore>)
    }

    /// Like [`Fixture::with_prices`], with the node reaching the byte store
    /// through `wrap`. `Fixture::bytes` stays the unwrapped store.
    pub fn build(
        read_price: u64,
        write_price: u64,
        wrap: impl FnOnce(Arc<InMemoryByteStore>) -> Arc<dyn ByteStore>,
    ) -> Self {
        let config = BlobberConfig {
            blobber_id: BLOBBER.into(),
            chunk_size: CHUNK,
            lock_wait_secs: 5,
            ..BlobberConfig::default()
        };
        let meta = Arc::new(InMemoryMetaStore::new());
        let bytes = Arc::new(InMemoryByteStore::new(CHUNK));
        let ledger = Arc::new(InMemoryLedger::new());
        let ctx = NodeContext::new(config, meta.clone(), wrap(bytes.clone()), ledger.clone());
        let owner = SigningKey::generate();

        let allocation = Allocation {
            id: ALLOCATION.into(),
            tx: ALLOCATION_TX.into(),
            owner_id: owner.client_id(),
            owner_public_key: owner.verifying_key(),
            payer_id: owner.client_id(),
            repairer_id: None,
            size: 1 << 20,
            used_size: 0,
            blobber_size: 1 << 20,
            blobber_size_used: 0,
            expiration: Timestamp::now().add_secs(3600),
            is_immutable: false,
            allocation_root: None,
            is_redeem_required: false,
            terms: vec![BlobberTerms {
                blobber_id: BLOBBER.into(),
                read_price,
                write_price,
            }],
        };
        let mut batch = WriteBatch::new();
        batch.put_allocation(allocation);
        meta.commit(batch).unwrap();

        Self {
            ctx,
            meta,
            bytes,
            ledger,
            owner,
        }
    }

    pub fn owner_req(&self) -> RequestContext {
        RequestContext::with_key(self.owner.verifying_key())
    }

    /// Owner request carrying the signature owner-only queries require.
    pub fn signed_req(&self) -> RequestContext {
        let signature = self
            .owner
            .sign(Digest::of_str(ALLOCATION_TX).to_hex().as_bytes());
        self.owner_req().signed(ALLOCATION_TX, signature)
    }

    pub fn allocation(&self) -> Allocation {
        self.meta.allocation(ALLOCATION).unwrap().unwrap()
    }

    pub fn replace_allocation(&self, allocation: Allocation) {
        let mut batch = WriteBatch::new();
        batch.put_allocation(allocation);
        self.meta.commit(batch).unwrap();
    }

    pub fn tree(&self) -> Option<ReferenceTree> {
        self.meta.reference_tree(ALLOCATION).unwrap()
    }

    pub fn fund(&self, client: ClientId, read_balance: u64, write_balance: u64) {
        let pool = |balance| Pool {
            id: format!("pool-{balance}"),
            client_id: client,
            allocation_id: ALLOCATION.into(),
            blobber_id: BLOBBER.into(),
            balance,
            expire_at: Timestamp::now().add_secs(86_400),
        };
        let snapshot = PoolSnapshot {
            read_pools: vec![pool(read_balance)],
            write_pools: vec![pool(write_balance)],
        };
        self.ledger.set_pools(client, ALLOCATION, snapshot).unwrap();
    }

    pub async fn upload(&self, connection_id: &str, path: &str, data: &[u8]) -> UploadResult {
        self.ctx
            .write_file(
                &self.owner_req(),
                UploadRequest {
                    allocation_id: ALLOCATION.into(),
                    connection_id: connection_id.into(),
                    path: path.into(),
                    mode: UploadMode::Insert,
                    data: Bytes::copy_from_slice(data),
                    thumbnail: None,
                    mime_type: "application/octet-stream".into(),
                    expected_content_hash: None,
                    expected_merkle_root: None,
                    expected_thumbnail_hash: None,
                },
            )
            .await
            .unwrap()
    }

    /// The root a client computes for `connection_id` on top of the
    /// committed tree.
    pub fn expected_root(&self, connection_id: &str, at: Timestamp) -> Digest {
        let connection = self.meta.connection(connection_id).unwrap().unwrap();
        let mut tree = self
            .tree()
            .unwrap_or_else(|| ReferenceTree::new(ALLOCATION, CHUNK));
        connection.apply_changes(&mut tree, at).unwrap();
        allocation_root(&tree.compute_root(false), at)
    }

    /// A correctly built marker for `connection_id`.
    pub fn write_marker(&self, connection_id: &str, at: Timestamp) -> WriteMarker {
        let connection = self.meta.connection(connection_id).unwrap().unwrap();
        UnsignedWriteMarker {
            allocation_root: self.expected_root(connection_id, at),
            previous_allocation_root: self.allocation().allocation_root,
            allocation_id: ALLOCATION.into(),
            size: connection.size,
            blobber_id: BLOBBER.into(),
            timestamp: at,
        }
        .sign(&self.owner)
    }

    pub async fn commit_marker(
        &self,
        connection_id: &str,
        marker: WriteMarker,
    ) -> CoreResult<CommitResult> {
        self.ctx
            .commit_write(
                &self.owner_req(),
                CommitRequest {
                    allocation_id: ALLOCATION.into(),
                    connection_id: connection_id.into(),
                    write_marker: marker,
                },
            )
            .await
    }

    pub async fn commit(&self, connection_id: &str, at: Timestamp) -> CoreResult<CommitResult> {
        let marker = self.write_marker(connection_id, at);
        self.commit_marker(connection_id, marker).await
    }

    pub fn read_marker(&self, reader: &SigningKey, counter: u64) -> ReadMarker {
        UnsignedReadMarker {
            allocation_id: ALLOCATION.into(),
            blobber_id: BLOBBER.into(),
            owner_id: self.owner.client_id(),
            read_counter: counter,
            timestamp: Timestamp::now(),
        }
        .sign(reader)
    }
}

pub fn ts(secs: i64) -> Timestamp {
    Timestamp::from_secs(1_700_000_000 + secs)
}
