use blobber_types::Digest;

/// One link in an allocation-root chain (a committed write marker).
pub trait RootLink {
    /// The root this link committed.
    fn root(&self) -> Digest;
    /// The root it was built on (`None` for the first commit).
    fn previous_root(&self) -> Option<Digest>;
}

/// Allocation-root chain verifier.
///
/// A sequence of committed markers is valid when the first one starts from
/// an empty allocation and every later one names its predecessor's root.
pub struct RootChainVerifier;

impl RootChainVerifier {
    pub fn verify_chain(links: &[impl RootLink]) -> Result<(), ChainError> {
        let Some(first) = links.first() else {
            return Ok(());
        };
        if first.previous_root().is_some() {
            return Err(ChainError::GenesisHasPrevious);
        }

        for (i, pair) in links.windows(2).enumerate() {
            let index = i + 1;
            match pair[1].previous_root() {
                Some(prev) if prev == pair[0].root() => {}
                Some(_) => return Err(ChainError::BrokenLink { index }),
                None => return Err(ChainError::MissingPrevious { index }),
            }
        }
        Ok(())
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("first marker names a previous root (should be empty)")]
    GenesisHasPrevious,

    #[error("broken link at index {index}: previous root does not match")]
    BrokenLink { index: usize },

    #[error("missing previous root at index {index}")]
    MissingPrevious { index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Link {
        root: Digest,
        prev: Option<Digest>,
    }

    impl RootLink for Link {
        fn root(&self) -> Digest {
            self.root
        }
        fn previous_root(&self) -> Option<Digest> {
            self.prev
        }
    }

    fn build_chain(count: u8) -> Vec<Link> {
        let mut prev = None;
        (0..count)
            .map(|i| {
                let root = Digest::of(&[i]);
                let link = Link { root, prev };
                prev = Some(root);
                link
            })
            .collect()
    }

    #[test]
    fn empty_chain_is_valid() {
        let chain: Vec<Link> = vec![];
        assert!(RootChainVerifier::verify_chain(&chain).is_ok());
    }

    #[test]
    fn multi_link_chain() {
        assert!(RootChainVerifier::verify_chain(&build_chain(8)).is_ok());
    }

    #[test]
    fn genesis_with_previous_fails() {
        let mut chain = build_chain(1);
        chain[0].prev = Some(Digest::of(b"x"));
        assert_eq!(
            RootChainVerifier::verify_chain(&chain),
            Err(ChainError::GenesisHasPrevious)
        );
    }

    #[test]
    fn broken_link_detected() {
        let mut chain = build_chain(3);
        chain[2].prev = Some(Digest::of(b"stale"));
        assert_eq!(
            RootChainVerifier::verify_chain(&chain),
            Err(ChainError::BrokenLink { index: 2 })
        );
    }

    #[test]
    fn missing_previous_detected() {
        let mut chain = build_chain(3);
        chain[1].prev = None;
        assert_eq!(
            RootChainVerifier::verify_chain(&chain),
            Err(ChainError::MissingPrevious { index: 1 })
        );
    }
}
