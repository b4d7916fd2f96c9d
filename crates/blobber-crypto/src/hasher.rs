use blobber_types::{Digest, Timestamp};

/// Hash the `:`-joined concatenation of `parts`.
///
/// This is the canonical form for every composite hash the node exposes,
/// so changing the separator breaks compatibility with stored roots.
pub fn hash_joined(parts: &[&str]) -> Digest {
    Digest::of_str(&parts.join(":"))
}

/// Deterministic lookup key for a path inside an allocation.
pub fn lookup_hash(allocation_id: &str, path: &str) -> Digest {
    hash_joined(&[allocation_id, path])
}

/// Allocation root binding a reference-tree root hash to a marker timestamp.
///
/// `hash(rootHashHex + ":" + decimalTimestamp)`.
pub fn allocation_root(root_hash: &Digest, timestamp: Timestamp) -> Digest {
    hash_joined(&[&root_hash.to_hex(), &timestamp.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_hash_is_deterministic() {
        assert_eq!(lookup_hash("alloc", "/a/b"), lookup_hash("alloc", "/a/b"));
        assert_ne!(lookup_hash("alloc", "/a/b"), lookup_hash("alloc", "/a/c"));
        assert_ne!(lookup_hash("alloc1", "/a"), lookup_hash("alloc2", "/a"));
    }

    #[test]
    fn lookup_hash_matches_joined_form() {
        assert_eq!(lookup_hash("alloc", "/x"), Digest::of_str("alloc:/x"));
    }

    #[test]
    fn allocation_root_formula() {
        let root = Digest::of(b"tree");
        let ts = Timestamp::from_secs(1_700_000_000);
        let expected = Digest::of_str(&format!("{}:1700000000", root.to_hex()));
        assert_eq!(allocation_root(&root, ts), expected);
    }

    #[test]
    fn allocation_root_binds_timestamp() {
        let root = Digest::of(b"tree");
        assert_ne!(
            allocation_root(&root, Timestamp::from_secs(1)),
            allocation_root(&root, Timestamp::from_secs(2))
        );
    }
}
