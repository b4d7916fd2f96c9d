use blobber_types::Digest;

/// Binary Merkle tree over the fixed-size chunks of a file.
///
/// Leaves are the digests of each chunk; an internal node is the hash of the
/// concatenated hex of its two children. An odd node at any level is paired
/// with itself.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    root: Digest,
    leaf_count: usize,
}

impl MerkleTree {
    /// Build a tree from leaf digests.
    ///
    /// An empty list produces a null root. A single leaf is its own root.
    pub fn from_leaves(leaves: Vec<Digest>) -> Self {
        let leaf_count = leaves.len();
        if leaves.is_empty() {
            return Self {
                root: Digest::null(),
                leaf_count,
            };
        }

        let mut current = leaves;
        while current.len() > 1 {
            current = current
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect();
        }

        Self {
            root: current[0],
            leaf_count,
        }
    }

    /// Split `data` into `chunk_size` pieces and build the tree over them.
    ///
    /// A `chunk_size` of zero is treated as one chunk holding all of `data`.
    pub fn from_chunks(data: &[u8], chunk_size: usize) -> Self {
        if data.is_empty() {
            return Self::from_leaves(vec![]);
        }
        let size = if chunk_size == 0 { data.len() } else { chunk_size };
        Self::from_leaves(data.chunks(size).map(Digest::of).collect())
    }

    pub fn root(&self) -> Digest {
        self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }
}

fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    Digest::of_str(&format!("{}{}", left.to_hex(), right.to_hex()))
}
