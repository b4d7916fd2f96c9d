//! Arena-backed reference tree and change application.

use std::collections::{BTreeMap, HashMap};

use blobber_crypto::hash_joined;
use blobber_types::{Digest, Timestamp};
use tracing::debug;

use crate::change::{AllocationChange, ChangeOp};
use crate::error::{TreeError, TreeResult};
use crate::node::{NewFile, RefNode};
use crate::path;

pub(crate) const ROOT_IDX: usize = 0;

#[derive(Clone, Debug)]
pub(crate) struct Slot {
    pub(crate) node: RefNode,
    pub(crate) parent: Option<usize>,
    pub(crate) children: BTreeMap<String, usize>,
    dirty: bool,
}

/// The namespace of one allocation.
///
/// Nodes are stored in a `Vec` arena and addressed by index. Deleted nodes
/// leave a `None` hole; the path and lookup indexes only ever point at live
/// slots. The tree is acyclic by construction: a node is attached exactly
/// once, under a parent that already exists.
#[derive(Clone)]
pub struct ReferenceTree {
    allocation_id: String,
    chunk_size: u64,
    pub(crate) slots: Vec<Option<Slot>>,
    by_path: HashMap<String, usize>,
    by_lookup: HashMap<Digest, usize>,
    pub(crate) deleted: Vec<RefNode>,
}

impl ReferenceTree {
    /// An empty tree containing only the root directory.
    pub fn new(allocation_id: impl Into<String>, chunk_size: u64) -> Self {
        let allocation_id = allocation_id.into();
        let root = RefNode::directory(&allocation_id, path::ROOT, Timestamp::default());
        let mut tree = Self {
            allocation_id,
            chunk_size,
            slots: Vec::new(),
            by_path: HashMap::new(),
            by_lookup: HashMap::new(),
            deleted: Vec::new(),
        };
        tree.push_slot(None, root);
        tree
    }

    pub fn allocation_id(&self) -> &str {
        &self.allocation_id
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of live nodes, including the root.
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Returns `true` if only the root exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }

    pub fn root(&self) -> &RefNode {
        &self.slot(ROOT_IDX).node
    }

    /// Hash of `/` as of the last [`compute_root`](Self::compute_root).
    pub fn root_hash(&self) -> Digest {
        self.root().hash
    }

    /// Look up a node by path.
    pub fn get(&self, node_path: &str) -> Option<&RefNode> {
        let normalized = path::normalize(node_path).ok()?;
        self.index_of(&normalized).map(|idx| &self.slot(idx).node)
    }

    /// Look up a node by its lookup hash, bypassing path traversal.
    pub fn get_by_lookup(&self, lookup_hash: &Digest) -> Option<&RefNode> {
        self.by_lookup
            .get(lookup_hash)
            .map(|&idx| &self.slot(idx).node)
    }

    /// Like [`get`](Self::get) but fails with `NotFound`.
    pub fn lookup(&self, node_path: &str) -> TreeResult<&RefNode> {
        self.get(node_path)
            .ok_or_else(|| TreeError::NotFound(node_path.to_string()))
    }

    /// Direct children of a directory, in name order.
    pub fn children(&self, node_path: &str) -> TreeResult<Vec<&RefNode>> {
        let normalized = path::normalize(node_path)?;
        let idx = self
            .index_of(&normalized)
            .ok_or_else(|| TreeError::NotFound(normalized.clone()))?;
        Ok(self
            .slot(idx)
            .children
            .values()
            .map(|&child| &self.slot(child).node)
            .collect())
    }

    /// Every live node, parents before children.
    pub fn nodes(&self) -> impl Iterator<Item = &RefNode> + '_ {
        self.preorder(ROOT_IDX)
            .into_iter()
            .map(move |idx| &self.slot(idx).node)
    }

    /// Files removed by committed deletes.
    pub fn deleted(&self) -> &[RefNode] {
        &self.deleted
    }

    // ---------------------------------------------------------------
    // Change application
    // ---------------------------------------------------------------

    /// Apply one staged change. On error the tree may be partially
    /// modified; callers apply to a scratch clone.
    pub fn apply_change(&mut self, change: &AllocationChange, at: Timestamp) -> TreeResult<()> {
        debug!(
            allocation_id = %self.allocation_id,
            kind = ?change.kind(),
            path = change.op.path(),
            "applying change"
        );
        match &change.op {
            ChangeOp::Insert(file) => self.insert(file, at),
            ChangeOp::Update(file) => self.update(file, at),
            ChangeOp::Delete { path } => self.delete(path, at),
            ChangeOp::Rename { path, new_name } => self.rename(path, new_name, at),
            ChangeOp::Copy {
                src_path,
                dest_path,
            } => self.copy(src_path, dest_path, at),
        }
    }

    fn insert(&mut self, file: &NewFile, at: Timestamp) -> TreeResult<()> {
        let file_path = path::normalize(&file.path)?;
        if file_path == path::ROOT {
            return Err(TreeError::InvalidPath(file_path));
        }
        if self.by_path.contains_key(&file_path) {
            return Err(TreeError::AlreadyExists(file_path));
        }
        let parent = self.ensure_dir(path::parent(&file_path), at)?;
        let node = RefNode::file(&self.allocation_id, &file_path, file, self.chunk_size, at);
        self.attach(parent, node);
        Ok(())
    }

    fn update(&mut self, file: &NewFile, at: Timestamp) -> TreeResult<()> {
        let file_path = path::normalize(&file.path)?;
        let idx = self
            .index_of(&file_path)
            .ok_or_else(|| TreeError::NotFound(file_path.clone()))?;
        let chunk_size = self.chunk_size;
        let slot = self.slot_mut(idx);
        if !slot.node.is_file() {
            return Err(TreeError::InvalidPath(file_path));
        }
        slot.node.set_content(file, chunk_size);
        slot.node.updated_at = at;
        let parent = slot.parent;
        self.mark_dirty(parent);
        Ok(())
    }

    fn delete(&mut self, node_path: &str, at: Timestamp) -> TreeResult<()> {
        let node_path = path::normalize(node_path)?;
        if node_path == path::ROOT {
            return Err(TreeError::InvalidPath(node_path));
        }
        let idx = self
            .index_of(&node_path)
            .ok_or_else(|| TreeError::NotFound(node_path.clone()))?;
        let name = self.slot(idx).node.name.clone();
        let parent = self.slot(idx).parent;

        for removed in self.preorder(idx) {
            if let Some(slot) = self.slots[removed].take() {
                self.by_path.remove(&slot.node.path);
                self.by_lookup.remove(&slot.node.lookup_hash);
                if slot.node.is_file() {
                    let mut tombstone = slot.node;
                    tombstone.updated_at = at;
                    self.deleted.push(tombstone);
                }
            }
        }
        if let Some(parent) = parent {
            self.slot_mut(parent).children.remove(&name);
        }
        self.mark_dirty(parent);
        Ok(())
    }

    fn rename(&mut self, node_path: &str, new_name: &str, at: Timestamp) -> TreeResult<()> {
        path::validate_name(new_name)?;
        let node_path = path::normalize(node_path)?;
        if node_path == path::ROOT {
            return Err(TreeError::InvalidPath(node_path));
        }
        let idx = self
            .index_of(&node_path)
            .ok_or_else(|| TreeError::NotFound(node_path.clone()))?;
        let old_name = self.slot(idx).node.name.clone();
        if old_name == new_name {
            return Ok(());
        }
        let parent = self.slot(idx).parent.unwrap_or(ROOT_IDX);
        let new_path = path::join(&self.slot(parent).node.path, new_name);
        if self.slot(parent).children.contains_key(new_name) {
            return Err(TreeError::AlreadyExists(new_path));
        }

        let siblings = &mut self.slot_mut(parent).children;
        siblings.remove(&old_name);
        siblings.insert(new_name.to_string(), idx);

        self.relocate_subtree(idx, new_path);
        self.slot_mut(idx).node.updated_at = at;
        self.mark_dirty(Some(parent));
        Ok(())
    }

    fn copy(&mut self, src_path: &str, dest_path: &str, at: Timestamp) -> TreeResult<()> {
        let src_path = path::normalize(src_path)?;
        let dest_path = path::normalize(dest_path)?;
        let src = self
            .index_of(&src_path)
            .ok_or_else(|| TreeError::NotFound(src_path.clone()))?;
        let dest = match self.index_of(&dest_path) {
            Some(idx) if self.slot(idx).node.is_dir() => idx,
            _ => return Err(TreeError::InvalidDestination(dest_path)),
        };
        if src == ROOT_IDX || path::is_within(&dest_path, &src_path) {
            return Err(TreeError::InvalidDestination(dest_path));
        }
        let target = path::join(&dest_path, &self.slot(src).node.name);
        if self.by_path.contains_key(&target) {
            return Err(TreeError::AlreadyExists(target));
        }

        let mut stack = vec![(src, dest)];
        while let Some((from, under)) = stack.pop() {
            let mut node = self.slot(from).node.clone();
            let new_path = path::join(&self.slot(under).node.path, &node.name);
            node.relocate(&self.allocation_id, &new_path);
            // Annotations belong to the original file.
            node.collaborators.clear();
            node.commit_meta_txns.clear();
            node.created_at = at;
            node.updated_at = at;
            let copied = self.attach(under, node);
            let children: Vec<usize> = self.slot(from).children.values().copied().collect();
            stack.extend(children.into_iter().map(|child| (child, copied)));
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Hashing
    // ---------------------------------------------------------------

    /// Recompute directory hashes bottom-up and return the root hash.
    ///
    /// With `recursive == false` only directories touched since the last
    /// computation are rehashed; `true` forces every directory.
    pub fn compute_root(&mut self, recursive: bool) -> Digest {
        let order = self.preorder(ROOT_IDX);
        for &idx in order.iter().rev() {
            let slot = self.slot(idx);
            if !slot.node.is_dir() || !(recursive || slot.dirty) {
                continue;
            }
            let mut entries = Vec::with_capacity(slot.children.len());
            let mut size = 0u64;
            let mut num_blocks = 0u64;
            for &child in slot.children.values() {
                let child = &self.slot(child).node;
                entries.push(child.hash_entry());
                size += child.size;
                num_blocks += child.num_blocks;
            }
            let parts: Vec<&str> = entries.iter().map(String::as_str).collect();
            let hash = hash_joined(&parts);

            let slot = self.slot_mut(idx);
            slot.node.hash = hash;
            slot.node.size = size;
            slot.node.num_blocks = num_blocks;
            slot.dirty = false;
        }
        self.root_hash()
    }

    // ---------------------------------------------------------------
    // Arena plumbing
    // ---------------------------------------------------------------

    pub(crate) fn index_of(&self, normalized: &str) -> Option<usize> {
        self.by_path.get(normalized).copied()
    }

    pub(crate) fn slot(&self, idx: usize) -> &Slot {
        self.slots[idx]
            .as_ref()
            .expect("indexed arena slot is live")
    }

    pub(crate) fn slot_mut(&mut self, idx: usize) -> &mut Slot {
        self.slots[idx]
            .as_mut()
            .expect("indexed arena slot is live")
    }

    /// Live indices of the subtree at `start`, parents before children,
    /// siblings in name order.
    pub(crate) fn preorder(&self, start: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            out.push(idx);
            stack.extend(self.slot(idx).children.values().rev().copied());
        }
        out
    }

    fn push_slot(&mut self, parent: Option<usize>, node: RefNode) -> usize {
        let idx = self.slots.len();
        self.by_path.insert(node.path.clone(), idx);
        self.by_lookup.insert(node.lookup_hash, idx);
        self.slots.push(Some(Slot {
            node,
            parent,
            children: BTreeMap::new(),
            dirty: true,
        }));
        idx
    }

    fn attach(&mut self, parent: usize, node: RefNode) -> usize {
        let name = node.name.clone();
        let idx = self.push_slot(Some(parent), node);
        self.slot_mut(parent).children.insert(name, idx);
        self.mark_dirty(Some(parent));
        idx
    }

    /// Walk `dir` from the root, creating missing directories.
    fn ensure_dir(&mut self, dir: &str, at: Timestamp) -> TreeResult<usize> {
        let mut current = ROOT_IDX;
        let mut current_path = String::from(path::ROOT);
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            current_path = path::join(&current_path, segment);
            current = match self.slot(current).children.get(segment).copied() {
                Some(idx) if self.slot(idx).node.is_dir() => idx,
                Some(_) => return Err(TreeError::InvalidDestination(current_path)),
                None => {
                    let node = RefNode::directory(&self.allocation_id, &current_path, at);
                    self.attach(current, node)
                }
            };
        }
        Ok(current)
    }

    fn mark_dirty(&mut self, from: Option<usize>) {
        let mut cursor = from;
        while let Some(idx) = cursor {
            let slot = self.slot_mut(idx);
            slot.dirty = true;
            cursor = slot.parent;
        }
    }

    fn relocate_subtree(&mut self, top: usize, new_path: String) {
        let mut stack = vec![(top, new_path)];
        while let Some((idx, target)) = stack.pop() {
            let old_path = self.slot(idx).node.path.clone();
            let old_lookup = self.slot(idx).node.lookup_hash;
            self.by_path.remove(&old_path);
            self.by_lookup.remove(&old_lookup);

            let allocation_id = self.allocation_id.clone();
            let slot = self.slot_mut(idx);
            slot.node.relocate(&allocation_id, &target);
            let new_lookup = slot.node.lookup_hash;
            let children: Vec<(String, usize)> = slot
                .children
                .iter()
                .map(|(name, &child)| (path::join(&target, name), child))
                .collect();

            self.by_path.insert(target, idx);
            self.by_lookup.insert(new_lookup, idx);
            stack.extend(children.into_iter().map(|(p, child)| (child, p)));
        }
    }
}

impl std::fmt::Debug for ReferenceTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceTree")
            .field("allocation_id", &self.allocation_id)
            .field("nodes", &self.len())
            .field("deleted", &self.deleted.len())
            .field("root", &self.root_hash())
            .finish()
    }
}
