//! Pre-redemption balance checks.
//!
//! Reads and writes are only served when the payer's pools, minus what is
//! already owed, cover the request. The local snapshot is consulted first;
//! a shortfall triggers exactly one ledger refresh before giving up.

use std::time::Duration;

use blobber_alloc::{have_read, pricing, Allocation, BlobberTerms, Pending, PoolSnapshot};
use blobber_store::WriteBatch;
use blobber_types::{ClientId, Timestamp};
use tracing::{debug, info};

use crate::context::NodeContext;
use crate::error::{CoreError, CoreResult};

impl NodeContext {
    /// Check that `payer` can pay for `num_blocks` more blocks, on top of
    /// the `pend_num_blocks` not yet redeemed.
    pub async fn read_pre_redeem(
        &self,
        allocation: &Allocation,
        num_blocks: u64,
        pend_num_blocks: u64,
        payer: &ClientId,
    ) -> CoreResult<()> {
        let terms = self.terms(allocation)?;
        let chunk_size = self.config.chunk_size;
        let want = pricing::want_read(num_blocks, chunk_size, terms.read_price);
        if want == 0 {
            return Ok(());
        }

        let timeout = self.config.read_lock_timeout();
        let until = deadline(timeout);
        let blobber_id = self.blobber_id();
        let have_of = |pools: &PoolSnapshot| {
            have_read(pools, blobber_id, pend_num_blocks, chunk_size, terms.read_price, until)
        };

        let mut have = have_of(&self.store.pools(&allocation.id, payer)?);
        if have < want {
            let fresh = self.refresh_pools(payer, &allocation.id, timeout).await?;
            have = have_of(&fresh);
            if have < want {
                info!(allocation_id = %allocation.id, want, have, "read rejected: pools too low");
                return Err(CoreError::InsufficientFunds { want, have });
            }
        }
        Ok(())
    }

    /// Check that `payer` can pay for `size` more bytes on top of the
    /// pending writes. Returns the pending-write record to persist with
    /// the commit, or `None` when nothing is charged.
    pub async fn write_pre_redeem(
        &self,
        allocation: &Allocation,
        size: i64,
        payer: &ClientId,
    ) -> CoreResult<Option<Pending>> {
        let terms = self.terms(allocation)?;
        let want = pricing::want_write(size, terms.write_price);
        if want == 0 {
            return Ok(None);
        }

        let timeout = self.config.write_lock_timeout();
        let until = deadline(timeout);
        let mut pending = self
            .store
            .pending(&allocation.id, payer, self.blobber_id())?
            .unwrap_or_else(|| Pending::new(*payer, &allocation.id, self.blobber_id()));

        let cached = self.store.pools(&allocation.id, payer)?;
        let mut have = pending.have_write(&cached, terms.write_price, until);
        if have < want {
            let fresh = self.refresh_pools(payer, &allocation.id, timeout).await?;
            have = pending.have_write(&fresh, terms.write_price, until);
            if have < want {
                info!(allocation_id = %allocation.id, want, have, "write rejected: pools too low");
                return Err(CoreError::InsufficientFunds { want, have });
            }
        }

        pending.add_pending_write(size);
        Ok(Some(pending))
    }

    fn terms<'a>(&self, allocation: &'a Allocation) -> CoreResult<&'a BlobberTerms> {
        allocation.terms_for(self.blobber_id()).ok_or_else(|| {
            CoreError::InvalidAllocation(format!(
                "{} has no terms for blobber {}",
                allocation.id,
                self.blobber_id()
            ))
        })
    }

    /// Fetch pools from the ledger and cache them locally right away.
    async fn refresh_pools(
        &self,
        client_id: &ClientId,
        allocation_id: &str,
        timeout: Duration,
    ) -> CoreResult<PoolSnapshot> {
        debug!(allocation_id, client_id = %client_id, "requesting pools from ledger");
        let request = self.ledger.request_pools(client_id, allocation_id);
        let snapshot = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| CoreError::Timeout(format!("ledger pools for {allocation_id}")))??;

        let mut batch = WriteBatch::new();
        batch.put_pools(allocation_id, *client_id, snapshot.clone());
        self.store.commit(batch)?;
        Ok(snapshot)
    }
}

// Pools must outlive the lock window to count.
fn deadline(timeout: Duration) -> Timestamp {
    Timestamp::now().add_secs(i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX))
}
