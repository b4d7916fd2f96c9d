use serde::{Deserialize, Serialize};

use blobber_types::{ClientId, Timestamp};

use crate::pricing;

/// A pre-funded token balance. The same shape backs read and write pools.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub client_id: ClientId,
    pub allocation_id: String,
    pub blobber_id: String,
    pub balance: u64,
    pub expire_at: Timestamp,
}

/// Pools known for one (client, allocation).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub read_pools: Vec<Pool>,
    pub write_pools: Vec<Pool>,
}

impl PoolSnapshot {
    /// Sum of read-pool balances on `blobber_id` still valid after `until`.
    pub fn read_balance(&self, blobber_id: &str, until: Timestamp) -> u64 {
        usable(&self.read_pools, blobber_id, until)
    }

    /// Sum of write-pool balances on `blobber_id` still valid after `until`.
    pub fn write_balance(&self, blobber_id: &str, until: Timestamp) -> u64 {
        usable(&self.write_pools, blobber_id, until)
    }
}

fn usable(pools: &[Pool], blobber_id: &str, until: Timestamp) -> u64 {
    pools
        .iter()
        .filter(|p| p.blobber_id == blobber_id && p.expire_at > until)
        .fold(0u64, |acc, p| acc.saturating_add(p.balance))
}

/// Amounts charged against a client's pools on this node but not yet
/// redeemed on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pending {
    pub client_id: ClientId,
    pub allocation_id: String,
    pub blobber_id: String,
    /// Bytes admitted for writing since the last settlement.
    pub pending_write: u64,
}

impl Pending {
    pub fn new(client_id: ClientId, allocation_id: &str, blobber_id: &str) -> Self {
        Self {
            client_id,
            allocation_id: allocation_id.to_string(),
            blobber_id: blobber_id.to_string(),
            pending_write: 0,
        }
    }

    /// Write balance left after the pending writes are paid for.
    pub fn have_write(
        &self,
        pools: &PoolSnapshot,
        write_price: u64,
        until: Timestamp,
    ) -> u64 {
        let pending = pricing::want_write(
            i64::try_from(self.pending_write).unwrap_or(i64::MAX),
            write_price,
        );
        pools
            .write_balance(&self.blobber_id, until)
            .saturating_sub(pending)
    }

    pub fn add_pending_write(&mut self, size: i64) {
        if size > 0 {
            self.pending_write = self.pending_write.saturating_add(size.unsigned_abs());
        }
    }
}

/// Read balance left after paying for `pend_num_blocks` already served.
pub fn have_read(
    pools: &PoolSnapshot,
    blobber_id: &str,
    pend_num_blocks: u64,
    chunk_size: u64,
    read_price: u64,
    until: Timestamp,
) -> u64 {
    let pending = pricing::want_read(pend_num_blocks, chunk_size, read_price);
    pools.read_balance(blobber_id, until).saturating_sub(pending)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(blobber: &str, balance: u64, expire: i64) -> Pool {
        Pool {
            id: format!("{blobber}-{balance}"),
            client_id: ClientId::from_public_key(b"c"),
            allocation_id: "alloc".into(),
            blobber_id: blobber.into(),
            balance,
            expire_at: Timestamp::from_secs(expire),
        }
    }

    #[test]
    fn balances_filter_blobber_and_expiry() {
        let snapshot = PoolSnapshot {
            read_pools: vec![pool("b1", 10, 100), pool("b1", 5, 50), pool("b2", 99, 100)],
            write_pools: vec![pool("b1", 7, 100)],
        };
        let until = Timestamp::from_secs(60);
        assert_eq!(snapshot.read_balance("b1", until), 10);
        assert_eq!(snapshot.write_balance("b1", until), 7);
        assert_eq!(snapshot.write_balance("b2", until), 0);
    }

    #[test]
    fn have_write_nets_pending() {
        let snapshot = PoolSnapshot {
            read_pools: vec![],
            write_pools: vec![pool("b1", 100, 100)],
        };
        let mut pending = Pending::new(ClientId::from_public_key(b"c"), "alloc", "b1");
        let until = Timestamp::from_secs(0);
        // 1 token per byte-GiB: one GiB pending costs `price` tokens.
        assert_eq!(pending.have_write(&snapshot, 30, until), 100);
        pending.add_pending_write(1 << 30);
        assert_eq!(pending.have_write(&snapshot, 30, until), 70);
        pending.add_pending_write(-5);
        assert_eq!(pending.pending_write, 1 << 30);
    }

    #[test]
    fn have_read_nets_pending_blocks() {
        let snapshot = PoolSnapshot {
            read_pools: vec![pool("b1", 10, 100)],
            write_pools: vec![],
        };
        let until = Timestamp::from_secs(0);
        assert_eq!(have_read(&snapshot, "b1", 0, 1 << 20, 1024, until), 10);
        // 1 block of 1 MiB at 1024 tokens/GiB = 1 token.
        assert_eq!(have_read(&snapshot, "b1", 1, 1 << 20, 1024, until), 9);
        assert_eq!(have_read(&snapshot, "b1", 100, 1 << 20, 1024, until), 0);
    }
}
