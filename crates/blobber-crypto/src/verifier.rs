use blobber_types::Digest;

use crate::signer::{Signature, VerifyingKey};

/// Checks client signatures over message hashes.
///
/// Write markers, read markers, auth tickets, and signed requests all sign
/// the lowercase hex rendering of a [`Digest`].
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, public_key: &VerifyingKey, signature: &Signature, message_hash: &Digest)
        -> bool;
}

/// Ed25519 verifier over the hex form of the message hash.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(
        &self,
        public_key: &VerifyingKey,
        signature: &Signature,
        message_hash: &Digest,
    ) -> bool {
        public_key
            .verify(message_hash.to_hex().as_bytes(), signature)
            .is_ok()
    }
}
