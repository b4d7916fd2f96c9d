use serde::{Deserialize, Serialize};
use tracing::debug;

use blobber_reftree::{AllocationChange, ReferenceTree};
use blobber_types::{ClientId, Timestamp};

use crate::error::{AllocError, AllocResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Open,
    Committed,
    Aborted,
}

/// Staged changes of one upload connection.
///
/// A connection is bound to one allocation and one client for its whole
/// life. `size` is always the sum of the staged changes' size
/// contributions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationChangeCollector {
    pub connection_id: String,
    pub allocation_id: String,
    pub client_id: ClientId,
    pub size: i64,
    pub changes: Vec<AllocationChange>,
    pub status: ConnectionStatus,
}

impl AllocationChangeCollector {
    pub fn new(
        connection_id: impl Into<String>,
        allocation_id: impl Into<String>,
        client_id: ClientId,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            allocation_id: allocation_id.into(),
            client_id,
            size: 0,
            changes: Vec::new(),
            status: ConnectionStatus::Open,
        }
    }

    /// Check that the connection belongs to `allocation_id`/`client_id`
    /// and can still take changes.
    pub fn validate(&self, allocation_id: &str, client_id: &ClientId) -> AllocResult<()> {
        if self.allocation_id != allocation_id || self.client_id != *client_id {
            return Err(AllocError::ConnectionMismatch {
                connection_id: self.connection_id.clone(),
            });
        }
        if self.status != ConnectionStatus::Open {
            return Err(AllocError::ConnectionClosed(self.connection_id.clone()));
        }
        Ok(())
    }

    pub fn add_change(&mut self, change: AllocationChange) {
        self.size += change.size;
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Replay every staged change against `tree`, in staged order.
    ///
    /// Stops at the first failure; the caller must discard `tree` in that
    /// case.
    pub fn apply_changes(&self, tree: &mut ReferenceTree, at: Timestamp) -> AllocResult<()> {
        if self.is_empty() {
            return Err(AllocError::EmptyConnection(self.connection_id.clone()));
        }
        for (index, change) in self.changes.iter().enumerate() {
            tree.apply_change(change, at)
                .map_err(|source| AllocError::ChangeFailed { index, source })?;
        }
        debug!(
            connection_id = %self.connection_id,
            changes = self.changes.len(),
            size = self.size,
            "connection applied"
        );
        Ok(())
    }

    /// Drop the staged changes and mark the connection committed.
    pub fn mark_committed(&mut self) {
        self.changes.clear();
        self.size = 0;
        self.status = ConnectionStatus::Committed;
    }

    pub fn abort(&mut self) {
        self.changes.clear();
        self.size = 0;
        self.status = ConnectionStatus::Aborted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobber_reftree::{ChangeOp, NewFile, TreeError};
    use blobber_types::Digest;

    fn client() -> ClientId {
        ClientId::from_public_key(b"client")
    }

    fn insert(p: &str, size: u64) -> AllocationChange {
        AllocationChange::new(
            ChangeOp::Insert(NewFile {
                path: p.into(),
                content_hash: Digest::of(p.as_bytes()),
                merkle_root: Digest::of(b"m"),
                size,
                thumbnail_hash: None,
                thumbnail_size: 0,
                mime_type: String::new(),
            }),
            size as i64,
        )
    }

    #[test]
    fn size_tracks_signed_contributions() {
        let mut conn = AllocationChangeCollector::new("c1", "alloc", client());
        conn.add_change(insert("/a", 100));
        conn.add_change(AllocationChange::new(ChangeOp::Delete { path: "/b".into() }, -30));
        conn.add_change(AllocationChange::new(
            ChangeOp::Rename {
                path: "/a".into(),
                new_name: "c".into(),
            },
            0,
        ));
        assert_eq!(conn.size, 70);
        assert_eq!(conn.changes.len(), 3);
    }

    #[test]
    fn validate_rejects_other_owner() {
        let conn = AllocationChangeCollector::new("c1", "alloc", client());
        assert!(conn.validate("alloc", &client()).is_ok());
        assert!(matches!(
            conn.validate("other", &client()),
            Err(AllocError::ConnectionMismatch { .. })
        ));
        assert!(matches!(
            conn.validate("alloc", &ClientId::from_public_key(b"x")),
            Err(AllocError::ConnectionMismatch { .. })
        ));
    }

    #[test]
    fn apply_replays_in_order() {
        let mut conn = AllocationChangeCollector::new("c1", "alloc", client());
        conn.add_change(insert("/a", 1));
        conn.add_change(AllocationChange::new(
            ChangeOp::Rename {
                path: "/a".into(),
                new_name: "b".into(),
            },
            0,
        ));
        let mut tree = ReferenceTree::new("alloc", 64);
        conn.apply_changes(&mut tree, Timestamp::from_secs(1)).unwrap();
        assert!(tree.get("/b").is_some());
        assert!(tree.get("/a").is_none());
    }

    #[test]
    fn apply_surfaces_first_failure() {
        let mut conn = AllocationChangeCollector::new("c1", "alloc", client());
        conn.add_change(insert("/a", 1));
        conn.add_change(insert("/a", 1));
        let mut tree = ReferenceTree::new("alloc", 64);
        let err = conn.apply_changes(&mut tree, Timestamp::from_secs(1)).unwrap_err();
        assert_eq!(
            err,
            AllocError::ChangeFailed {
                index: 1,
                source: TreeError::AlreadyExists("/a".into())
            }
        );
    }

    #[test]
    fn empty_connection_cannot_apply() {
        let conn = AllocationChangeCollector::new("c1", "alloc", client());
        let mut tree = ReferenceTree::new("alloc", 64);
        assert!(matches!(
            conn.apply_changes(&mut tree, Timestamp::from_secs(1)),
            Err(AllocError::EmptyConnection(_))
        ));
    }

    #[test]
    fn committed_connection_is_closed() {
        let mut conn = AllocationChangeCollector::new("c1", "alloc", client());
        conn.add_change(insert("/a", 1));
        conn.mark_committed();
        assert!(conn.is_empty());
        assert_eq!(conn.size, 0);
        assert!(matches!(
            conn.validate("alloc", &client()),
            Err(AllocError::ConnectionClosed(_))
        ));
    }
}
