//! Per-file annotations: collaborators and commit-meta transactions.
//!
//! These edit committed files in place. They are not staged changes and
//! leave every hash, and therefore the allocation root, untouched.

use blobber_types::ClientId;

use crate::error::{TreeError, TreeResult};
use crate::node::{CommitMetaTxn, RefNode};
use crate::path;
use crate::tree::ReferenceTree;

impl ReferenceTree {
    /// Grant `client_id` metadata access to a file. Returns `false` when
    /// it already had it.
    pub fn add_collaborator(&mut self, file_path: &str, client_id: ClientId) -> TreeResult<bool> {
        let node = self.file_mut(file_path)?;
        if node.collaborators.contains(&client_id) {
            return Ok(false);
        }
        node.collaborators.push(client_id);
        Ok(true)
    }

    /// Returns `false` when `client_id` was not a collaborator.
    pub fn remove_collaborator(
        &mut self,
        file_path: &str,
        client_id: &ClientId,
    ) -> TreeResult<bool> {
        let node = self.file_mut(file_path)?;
        let before = node.collaborators.len();
        node.collaborators.retain(|c| c != client_id);
        Ok(node.collaborators.len() != before)
    }

    pub fn add_commit_meta_txn(&mut self, file_path: &str, txn: CommitMetaTxn) -> TreeResult<()> {
        self.file_mut(file_path)?.commit_meta_txns.push(txn);
        Ok(())
    }

    fn file_mut(&mut self, file_path: &str) -> TreeResult<&mut RefNode> {
        let normalized = path::normalize(file_path)?;
        let idx = self
            .index_of(&normalized)
            .ok_or_else(|| TreeError::NotFound(normalized.clone()))?;
        let node = &mut self.slot_mut(idx).node;
        if !node.is_file() {
            return Err(TreeError::NotAFile(normalized));
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{AllocationChange, ChangeOp};
    use crate::node::NewFile;
    use blobber_types::{Digest, Timestamp};

    fn tree_with(paths: &[&str]) -> ReferenceTree {
        let mut tree = ReferenceTree::new("alloc", 64);
        for p in paths {
            let file = NewFile {
                path: (*p).into(),
                content_hash: Digest::of_str(p),
                merkle_root: Digest::of_str(p),
                size: 10,
                thumbnail_hash: None,
                thumbnail_size: 0,
                mime_type: String::new(),
            };
            tree.apply_change(
                &AllocationChange::new(ChangeOp::Insert(file), 10),
                Timestamp::from_secs(1),
            )
            .unwrap();
        }
        tree.compute_root(false);
        tree
    }

    #[test]
    fn collaborators_are_a_set() {
        let mut tree = tree_with(&["/docs/a.txt"]);
        let collab = ClientId::from_public_key(b"collab");
        assert!(tree.add_collaborator("/docs/a.txt", collab).unwrap());
        assert!(!tree.add_collaborator("/docs/a.txt", collab).unwrap());
        assert_eq!(tree.get("/docs/a.txt").unwrap().collaborators, vec![collab]);

        assert!(tree.remove_collaborator("/docs/a.txt", &collab).unwrap());
        assert!(!tree.remove_collaborator("/docs/a.txt", &collab).unwrap());
        assert!(tree.get("/docs/a.txt").unwrap().collaborators.is_empty());
    }

    #[test]
    fn annotations_do_not_change_hashes() {
        let mut tree = tree_with(&["/docs/a.txt"]);
        let root = tree.root_hash();
        tree.add_collaborator("/docs/a.txt", ClientId::from_public_key(b"c"))
            .unwrap();
        tree.add_commit_meta_txn(
            "/docs/a.txt",
            CommitMetaTxn {
                txn_id: "txn-1".into(),
                created_at: Timestamp::from_secs(2),
            },
        )
        .unwrap();
        assert_eq!(tree.compute_root(true), root);
        assert_eq!(tree.get("/docs/a.txt").unwrap().commit_meta_txns.len(), 1);
    }

    #[test]
    fn only_files_take_annotations() {
        let mut tree = tree_with(&["/docs/a.txt"]);
        let collab = ClientId::from_public_key(b"c");
        assert_eq!(
            tree.add_collaborator("/docs", collab),
            Err(TreeError::NotAFile("/docs".into()))
        );
        assert_eq!(
            tree.add_collaborator("/nope.txt", collab),
            Err(TreeError::NotFound("/nope.txt".into()))
        );
    }

    #[test]
    fn rename_keeps_and_copy_drops_annotations() {
        let mut tree = tree_with(&["/docs/a.txt"]);
        let collab = ClientId::from_public_key(b"c");
        tree.add_collaborator("/docs/a.txt", collab).unwrap();

        let at = Timestamp::from_secs(3);
        tree.apply_change(
            &AllocationChange::new(
                ChangeOp::Copy {
                    src_path: "/docs/a.txt".into(),
                    dest_path: "/".into(),
                },
                10,
            ),
            at,
        )
        .unwrap();
        tree.apply_change(
            &AllocationChange::new(
                ChangeOp::Rename {
                    path: "/docs/a.txt".into(),
                    new_name: "b.txt".into(),
                },
                0,
            ),
            at,
        )
        .unwrap();

        assert_eq!(tree.get("/docs/b.txt").unwrap().collaborators, vec![collab]);
        assert!(tree.get("/a.txt").unwrap().collaborators.is_empty());
    }
}
