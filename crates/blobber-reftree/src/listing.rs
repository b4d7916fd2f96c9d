//! Nested listings assembled from the arena without recursion.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use blobber_types::Digest;

use crate::error::{TreeError, TreeResult};
use crate::node::RefNode;
use crate::path;
use crate::tree::{ReferenceTree, ROOT_IDX};

/// A node with (possibly) its expanded children.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencePath {
    pub meta: RefNode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub list: Vec<ReferencePath>,
}

impl ReferencePath {
    fn leaf(meta: RefNode) -> Self {
        Self { meta, list: vec![] }
    }

    /// Find a nested entry by path.
    pub fn find(&self, target: &str) -> Option<&ReferencePath> {
        let mut stack = vec![self];
        while let Some(entry) = stack.pop() {
            if entry.meta.path == target {
                return Some(entry);
            }
            stack.extend(entry.list.iter());
        }
        None
    }
}

/// Location of a block inside the allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectPath {
    pub root_hash: Digest,
    /// The file holding the block.
    pub meta: RefNode,
    /// Root listing with every directory on the way to the file expanded.
    pub path: ReferencePath,
    /// Index of the block within the file.
    pub file_block_num: u64,
}

impl ReferenceTree {
    /// Root listing with every ancestor of each requested path expanded.
    ///
    /// Requested directories are expanded as well, so the caller sees
    /// their direct children.
    pub fn reference_path(&self, paths: &[String]) -> TreeResult<ReferencePath> {
        let mut expand = HashSet::from([ROOT_IDX]);
        for requested in paths {
            let normalized = path::normalize(requested)?;
            for ancestor in path::ancestors(&normalized) {
                if let Some(idx) = self.index_of(&ancestor) {
                    expand.insert(idx);
                }
            }
            if let Some(idx) = self.index_of(&normalized) {
                if self.slot(idx).node.is_dir() {
                    expand.insert(idx);
                }
            }
        }
        Ok(self.assemble(ROOT_IDX, &expand))
    }

    /// The subtree at `node_path`, fully expanded.
    pub fn object_tree(&self, node_path: &str) -> TreeResult<ReferencePath> {
        let normalized = path::normalize(node_path)?;
        let idx = self
            .index_of(&normalized)
            .ok_or(TreeError::NotFound(normalized))?;
        let expand: HashSet<usize> = self.preorder(idx).into_iter().collect();
        Ok(self.assemble(idx, &expand))
    }

    /// A node and its direct children.
    pub fn list(&self, node_path: &str) -> TreeResult<ReferencePath> {
        let normalized = path::normalize(node_path)?;
        let idx = self
            .index_of(&normalized)
            .ok_or(TreeError::NotFound(normalized))?;
        Ok(self.assemble(idx, &HashSet::from([idx])))
    }

    /// Resolve the `block_num`-th block (zero based) of the allocation.
    ///
    /// Blocks are numbered by walking files in path order. Directory hashes
    /// and block counts must be current.
    pub fn object_path(&self, block_num: u64) -> TreeResult<ObjectPath> {
        let total = self.root().num_blocks;
        if block_num >= total {
            return Err(TreeError::BlockOutOfRange { block_num, total });
        }

        let mut remaining = block_num;
        let mut current = ROOT_IDX;
        let mut expand = HashSet::from([ROOT_IDX]);
        while self.slot(current).node.is_dir() {
            let mut next = None;
            for &child in self.slot(current).children.values() {
                let blocks = self.slot(child).node.num_blocks;
                if remaining < blocks {
                    next = Some(child);
                    break;
                }
                remaining -= blocks;
            }
            current = next.ok_or(TreeError::BlockOutOfRange { block_num, total })?;
            expand.insert(current);
        }

        Ok(ObjectPath {
            root_hash: self.root_hash(),
            meta: self.slot(current).node.clone(),
            path: self.assemble(ROOT_IDX, &expand),
            file_block_num: remaining,
        })
    }

    /// Build the nested listing rooted at `top`, expanding the indices in
    /// `expand`. Processes a preorder in reverse so every child is built
    /// before its parent.
    fn assemble(&self, top: usize, expand: &HashSet<usize>) -> ReferencePath {
        let mut order = Vec::new();
        let mut stack = vec![top];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            if expand.contains(&idx) {
                stack.extend(self.slot(idx).children.values().copied());
            }
        }

        let mut built: HashMap<usize, ReferencePath> = HashMap::new();
        for &idx in order.iter().rev() {
            let slot = self.slot(idx);
            let list = if expand.contains(&idx) {
                slot.children
                    .values()
                    .map(|child| {
                        built
                            .remove(child)
                            .unwrap_or_else(|| ReferencePath::leaf(self.slot(*child).node.clone()))
                    })
                    .collect()
            } else {
                vec![]
            };
            built.insert(
                idx,
                ReferencePath {
                    meta: slot.node.clone(),
                    list,
                },
            );
        }
        built
            .remove(&top)
            .unwrap_or_else(|| ReferencePath::leaf(self.slot(top).node.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{AllocationChange, ChangeOp};
    use crate::node::NewFile;
    use blobber_types::Timestamp;

    fn tree_with(files: &[(&str, u64)]) -> ReferenceTree {
        let mut tree = ReferenceTree::new("alloc", 10);
        for (p, size) in files {
            let file = NewFile {
                path: p.to_string(),
                content_hash: Digest::of(p.as_bytes()),
                merkle_root: Digest::of(b"m"),
                size: *size,
                thumbnail_hash: None,
                thumbnail_size: 0,
                mime_type: String::new(),
            };
            tree.apply_change(
                &AllocationChange::new(ChangeOp::Insert(file), *size as i64),
                Timestamp::from_secs(1),
            )
            .unwrap();
        }
        tree.compute_root(false);
        tree
    }

    fn names(entry: &ReferencePath) -> Vec<&str> {
        entry.list.iter().map(|e| e.meta.name.as_str()).collect()
    }

    #[test]
    fn reference_path_expands_ancestors_only() {
        let tree = tree_with(&[("/a/b/c.txt", 1), ("/a/x.txt", 1), ("/z/y.txt", 1)]);
        let listing = tree.reference_path(&["/a/b/c.txt".into()]).unwrap();

        assert_eq!(listing.meta.path, "/");
        assert_eq!(names(&listing), vec!["a", "z"]);
        let a = listing.find("/a").unwrap();
        assert_eq!(names(a), vec!["b", "x.txt"]);
        let b = listing.find("/a/b").unwrap();
        assert_eq!(names(b), vec!["c.txt"]);
        assert!(listing.find("/z").unwrap().list.is_empty());
    }

    #[test]
    fn reference_path_expands_requested_directory() {
        let tree = tree_with(&[("/d/f", 1)]);
        let listing = tree.reference_path(&["/d".into()]).unwrap();
        assert_eq!(names(listing.find("/d").unwrap()), vec!["f"]);
    }

    #[test]
    fn object_tree_expands_everything() {
        let tree = tree_with(&[("/d/e/f", 1), ("/d/g", 1), ("/other", 1)]);
        let subtree = tree.object_tree("/d").unwrap();
        assert_eq!(subtree.meta.path, "/d");
        assert_eq!(names(&subtree), vec!["e", "g"]);
        assert_eq!(names(subtree.find("/d/e").unwrap()), vec!["f"]);
        assert!(subtree.find("/other").is_none());
        assert!(matches!(tree.object_tree("/missing"), Err(TreeError::NotFound(_))));
    }

    #[test]
    fn list_returns_direct_children() {
        let tree = tree_with(&[("/d/e/f", 1), ("/d/g", 1)]);
        let listing = tree.list("/d").unwrap();
        assert_eq!(names(&listing), vec!["e", "g"]);
        assert!(listing.list[0].list.is_empty());
    }

    #[test]
    fn object_path_walks_blocks_in_name_order() {
        // chunk size 10: /a has 2 blocks, /b/c has 3 blocks.
        let tree = tree_with(&[("/b/c", 25), ("/a", 15)]);
        assert_eq!(tree.root().num_blocks, 5);

        let first = tree.object_path(1).unwrap();
        assert_eq!(first.meta.path, "/a");
        assert_eq!(first.file_block_num, 1);

        let later = tree.object_path(4).unwrap();
        assert_eq!(later.meta.path, "/b/c");
        assert_eq!(later.file_block_num, 2);
        assert_eq!(later.root_hash, tree.root_hash());
        assert_eq!(names(later.path.find("/b").unwrap()), vec!["c"]);

        assert_eq!(
            tree.object_path(5),
            Err(TreeError::BlockOutOfRange {
                block_num: 5,
                total: 5
            })
        );
    }
}
