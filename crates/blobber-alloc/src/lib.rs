//! Allocation-side state for the blobber.
//!
//! - [`Allocation`]: a client's capacity lease on this node
//! - [`AllocationChangeCollector`]: the staged changes of one upload
//!   connection
//! - [`Pool`], [`PoolSnapshot`], [`Pending`]: pre-paid token balances and
//!   the not-yet-redeemed amounts charged against them
//! - [`pricing`]: token demand for reads and writes

pub mod allocation;
pub mod collector;
pub mod error;
pub mod pool;
pub mod pricing;

pub use allocation::{Allocation, BlobberTerms};
pub use collector::{AllocationChangeCollector, ConnectionStatus};
pub use error::{AllocError, AllocResult};
pub use pool::{have_read, Pending, Pool, PoolSnapshot};
