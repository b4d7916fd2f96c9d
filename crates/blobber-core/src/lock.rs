//! Named mutual exclusion keyed by (class, id).
//!
//! Commits take the `allocations` lock for their allocation; staging
//! operations take the `allocation_connections` lock for their connection.
//! Entries are created on first use and pruned once nobody holds or waits
//! on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

use crate::error::{CoreError, CoreResult};

pub const ALLOCATION_LOCKS: &str = "allocations";
pub const CONNECTION_LOCKS: &str = "allocation_connections";
pub const READ_MARKER_LOCKS: &str = "read_markers";

type LockKey = (&'static str, String);
type LockMap = HashMap<LockKey, Arc<AsyncMutex<()>>>;

/// Registry of named locks shared by every operation of a node.
#[derive(Clone)]
pub struct LockRegistry {
    entries: Arc<Mutex<LockMap>>,
    wait: Duration,
}

impl LockRegistry {
    /// `wait` bounds how long [`acquire`](Self::acquire) blocks.
    pub fn new(wait: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            wait,
        }
    }

    /// Wait for the lock named `(class, id)`.
    ///
    /// Fails with [`CoreError::Timeout`] once the registry's wait elapses.
    pub async fn acquire(&self, class: &'static str, id: &str) -> CoreResult<ResourceLock> {
        let key = (class, id.to_string());
        let mutex = {
            // The map only holds Arcs; a panic elsewhere cannot leave it torn.
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(key.clone()).or_default())
        };

        match tokio::time::timeout(self.wait, mutex.lock_owned()).await {
            Ok(guard) => {
                trace!(class, id, "lock acquired");
                Ok(ResourceLock {
                    key,
                    entries: Arc::clone(&self.entries),
                    guard: Some(guard),
                })
            }
            Err(_) => {
                self.prune(&key);
                Err(CoreError::Timeout(format!("waiting for {class} lock on {id}")))
            }
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, key: &LockKey) {
        prune_entry(&self.entries, key);
    }
}

impl std::fmt::Debug for LockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockRegistry")
            .field("entries", &self.len())
            .field("wait", &self.wait)
            .finish()
    }
}

// Drop the map entry when the map holds the only reference. Checked under
// the map lock, which is also where new waiters take their reference.
fn prune_entry(entries: &Mutex<LockMap>, key: &LockKey) {
    let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
    if entries
        .get(key)
        .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
    {
        entries.remove(key);
    }
}

/// A held lock. Released on drop.
pub struct ResourceLock {
    key: LockKey,
    entries: Arc<Mutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ResourceLock {
    pub fn class(&self) -> &'static str {
        self.key.0
    }

    pub fn id(&self) -> &str {
        &self.key.1
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune_entry(&self.entries, &self.key);
        trace!(class = self.key.0, id = %self.key.1, "lock released");
    }
}

impl std::fmt::Debug for ResourceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLock")
            .field("class", &self.key.0)
            .field("id", &self.key.1)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_are_pruned_on_release() {
        let locks = LockRegistry::new(Duration::from_secs(1));
        let guard = locks.acquire(ALLOCATION_LOCKS, "a1").await.unwrap();
        assert_eq!(guard.id(), "a1");
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn classes_are_independent() {
        let locks = LockRegistry::new(Duration::from_millis(50));
        let _a = locks.acquire(ALLOCATION_LOCKS, "x").await.unwrap();
        let b = locks.acquire(CONNECTION_LOCKS, "x").await.unwrap();
        assert_eq!(b.class(), CONNECTION_LOCKS);
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn contended_lock_times_out() {
        let locks = LockRegistry::new(Duration::from_millis(20));
        let held = locks.acquire(ALLOCATION_LOCKS, "busy").await.unwrap();
        let err = locks.acquire(ALLOCATION_LOCKS, "busy").await.unwrap_err();
        assert!(matches!(err, CoreError::Timeout(_)));
        // The timed-out waiter must not evict the held entry.
        assert_eq!(locks.len(), 1);
        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn waiter_gets_lock_after_release() {
        let locks = LockRegistry::new(Duration::from_secs(2));
        let held = locks.acquire(ALLOCATION_LOCKS, "q").await.unwrap();
        let other = locks.clone();
        let waiter =
            tokio::spawn(async move { other.acquire(ALLOCATION_LOCKS, "q").await.map(|_| ()) });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        waiter.await.unwrap().unwrap();
        assert!(locks.is_empty());
    }
}
