//! Storage seams for the blobber.
//!
//! The core never talks to a database, a disk, or the network directly. It
//! goes through three narrow interfaces:
//!
//! - [`MetaStore`]: transactional rows for allocations, reference trees,
//!   connections, markers, and pool state. All writes go through
//!   [`MetaStore::commit`] with a [`WriteBatch`] that lands atomically.
//! - [`ByteStore`]: content-addressed file bytes, staged per connection
//!   and promoted on commit.
//! - [`PoolLedger`]: the external ledger that reports a client's pools.
//!
//! In-memory implementations of all three back the tests and the demo node.
//!
//! # Design Rules
//!
//! 1. A batch either lands completely or not at all.
//! 2. Reads never observe a half-applied batch.
//! 3. The byte store is authoritative for content hashes and Merkle roots.

pub mod batch;
pub mod bytes_store;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod traits;

pub use batch::{Mutation, WriteBatch};
pub use bytes_store::{BlockWrite, ByteStore, InMemoryByteStore};
pub use error::{StoreError, StoreResult};
pub use ledger::{InMemoryLedger, PoolLedger};
pub use memory::InMemoryMetaStore;
pub use traits::MetaStore;
