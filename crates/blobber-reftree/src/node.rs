use serde::{Deserialize, Serialize};

use blobber_crypto::{hash_joined, lookup_hash};
use blobber_types::{ClientId, Digest, Timestamp};

use crate::path;

/// Whether a reference is a file leaf or a directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    File,
    Directory,
}

/// Content description of a file being inserted or updated.
///
/// The hashes come from the byte store, which is authoritative for them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFile {
    pub path: String,
    pub content_hash: Digest,
    pub merkle_root: Digest,
    pub size: u64,
    #[serde(default)]
    pub thumbnail_hash: Option<Digest>,
    #[serde(default)]
    pub thumbnail_size: u64,
    #[serde(default)]
    pub mime_type: String,
}

/// A ledger transaction a client attached to a file after committing it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMetaTxn {
    pub txn_id: String,
    pub created_at: Timestamp,
}

/// One file or directory in an allocation.
///
/// `collaborators` and `commit_meta_txns` annotate files only and never
/// feed into a hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefNode {
    #[serde(rename = "type")]
    pub ref_type: RefType,
    pub name: String,
    pub path: String,
    pub parent_path: String,
    pub lookup_hash: Digest,
    pub hash: Digest,
    pub content_hash: Option<Digest>,
    pub merkle_root: Option<Digest>,
    pub thumbnail_hash: Option<Digest>,
    pub thumbnail_size: u64,
    pub mime_type: String,
    pub size: u64,
    pub num_blocks: u64,
    pub level: usize,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collaborators: Vec<ClientId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commit_meta_txns: Vec<CommitMetaTxn>,
}

impl RefNode {
    /// An empty directory at `dir_path`.
    pub fn directory(allocation_id: &str, dir_path: &str, at: Timestamp) -> Self {
        Self {
            ref_type: RefType::Directory,
            name: path::name(dir_path).to_string(),
            path: dir_path.to_string(),
            parent_path: path::parent(dir_path).to_string(),
            lookup_hash: lookup_hash(allocation_id, dir_path),
            hash: Digest::of_str(""),
            content_hash: None,
            merkle_root: None,
            thumbnail_hash: None,
            thumbnail_size: 0,
            mime_type: String::new(),
            size: 0,
            num_blocks: 0,
            level: path::level(dir_path),
            created_at: at,
            updated_at: at,
            collaborators: Vec::new(),
            commit_meta_txns: Vec::new(),
        }
    }

    /// A file leaf described by `file`, stored at `file_path`.
    pub fn file(
        allocation_id: &str,
        file_path: &str,
        file: &NewFile,
        chunk_size: u64,
        at: Timestamp,
    ) -> Self {
        let mut node = Self::directory(allocation_id, file_path, at);
        node.ref_type = RefType::File;
        node.set_content(file, chunk_size);
        node
    }

    pub fn is_file(&self) -> bool {
        self.ref_type == RefType::File
    }

    pub fn is_dir(&self) -> bool {
        self.ref_type == RefType::Directory
    }

    /// Replace content fields and recompute the leaf hash.
    pub fn set_content(&mut self, file: &NewFile, chunk_size: u64) {
        self.content_hash = Some(file.content_hash);
        self.merkle_root = Some(file.merkle_root);
        self.thumbnail_hash = file.thumbnail_hash;
        self.thumbnail_size = file.thumbnail_size;
        self.mime_type = file.mime_type.clone();
        self.size = file.size;
        self.num_blocks = block_count(file.size, chunk_size);
        self.hash = file_hash(&file.content_hash, &file.merkle_root, file.size);
    }

    /// Move the node to `new_path`, re-deriving every path-derived field.
    pub(crate) fn relocate(&mut self, allocation_id: &str, new_path: &str) {
        self.name = path::name(new_path).to_string();
        self.path = new_path.to_string();
        self.parent_path = path::parent(new_path).to_string();
        self.lookup_hash = lookup_hash(allocation_id, new_path);
        self.level = path::level(new_path);
    }

    /// The `name:hash:size` tuple a parent directory hashes over.
    pub(crate) fn hash_entry(&self) -> String {
        format!("{}:{}:{}", self.name, self.hash, self.size)
    }
}

/// Leaf hash of a file. Depends only on content.
pub fn file_hash(content_hash: &Digest, merkle_root: &Digest, size: u64) -> Digest {
    hash_joined(&[
        &content_hash.to_hex(),
        &merkle_root.to_hex(),
        &size.to_string(),
    ])
}

/// Number of `chunk_size` blocks needed to hold `size` bytes.
pub fn block_count(size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size)
}
