use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use blobber_alloc::PoolSnapshot;
use blobber_types::ClientId;

use crate::error::{StoreError, StoreResult};

/// The external ledger that owns pool balances.
#[async_trait]
pub trait PoolLedger: Send + Sync {
    /// Fresh pool snapshot for (client, allocation).
    async fn request_pools(
        &self,
        client_id: &ClientId,
        allocation_id: &str,
    ) -> StoreResult<PoolSnapshot>;
}

/// Ledger stand-in that serves configured snapshots and counts requests.
#[derive(Default)]
pub struct InMemoryLedger {
    pools: RwLock<HashMap<(ClientId, String), PoolSnapshot>>,
    requests: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pools(
        &self,
        client_id: ClientId,
        allocation_id: &str,
        snapshot: PoolSnapshot,
    ) -> StoreResult<()> {
        self.pools
            .write()
            .map_err(|_| StoreError::Poisoned("ledger".into()))?
            .insert((client_id, allocation_id.to_string()), snapshot);
        Ok(())
    }

    /// How many times pools were requested.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoolLedger for InMemoryLedger {
    async fn request_pools(
        &self,
        client_id: &ClientId,
        allocation_id: &str,
    ) -> StoreResult<PoolSnapshot> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let snapshot = self
            .pools
            .read()
            .map_err(|_| StoreError::Poisoned("ledger".into()))?
            .get(&(*client_id, allocation_id.to_string()))
            .cloned()
            .unwrap_or_default();
        debug!(
            client_id = %client_id,
            allocation_id,
            read_pools = snapshot.read_pools.len(),
            write_pools = snapshot.write_pools.len(),
            "ledger pools requested"
        );
        Ok(snapshot)
    }
}

impl std::fmt::Debug for InMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedger")
            .field("requests", &self.request_count())
            .finish()
    }
}
