//! Centralized cryptographic operations.
//!
//! All BLAKE3 hashing, Ed25519 signing and verification, the service-key
//! MAC, and secret generation go through this module, giving a single
//! audit surface for cryptographic correctness.
//!
//! | Primitive | Algorithm         | Purpose                                  |
//! |-----------|-------------------|------------------------------------------|
//! | Cid       | BLAKE3 (32 B)     | Content addressing, edge fingerprints    |
//! | Signature | Ed25519 (64 B)    | Request signing, record signing          |
//! | Mac       | keyed BLAKE3      | Sealing record nodes under a service key |
//! | PeerId    | BLAKE3 of pub key | Caller identity derivation               |

use crate::types::{Cid, Key, PeerId, PubKey, Signature};

/// Length of the keyed MAC appended to sealed record nodes.
pub const MAC_LEN: usize = 32;

/// Compute the BLAKE3 content hash of arbitrary bytes.
#[inline]
pub fn content_hash(data: &[u8]) -> Cid {
    Cid(*blake3::hash(data).as_bytes())
}

/// Derive a peer id from an Ed25519 public key.
///
/// The fingerprint is the BLAKE3 hash of the raw key bytes; two peers
/// agree on each other's ids without any side channel.
#[inline]
pub fn derive_peer_id(pub_key: &PubKey) -> PeerId {
    PeerId(*blake3::hash(pub_key.as_bytes()).as_bytes())
}

/// Sign a BLAKE3 content hash with an Ed25519 signing key.
///
/// The canonical signing pattern: compute `blake3(content)`, then sign
/// the 32-byte digest. Requests and records both use this.
pub fn sign_hash(signing_key: &ed25519_dalek::SigningKey, hash: &Cid) -> Signature {
    use ed25519_dalek::Signer;
    let sig = signing_key.sign(hash.as_bytes());
    Signature(sig.to_bytes())
}

/// Verify an Ed25519 signature over a BLAKE3 content hash.
///
/// Uses `verify()` (cofactored). Suitable for request headers.
pub fn verify_hash(pub_key: &PubKey, hash: &Cid, signature: &Signature) -> Result<(), CryptoError> {
    use ed25519_dalek::Verifier;
    let vk = verifying_key(pub_key)?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify(hash.as_bytes(), &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Verify an Ed25519 signature over a BLAKE3 content hash (strict).
///
/// Uses `verify_strict()` (rejects small-order keys, checks canonical S).
/// Used for record signatures, which outlive any single connection.
pub fn verify_hash_strict(
    pub_key: &PubKey,
    hash: &Cid,
    signature: &Signature,
) -> Result<(), CryptoError> {
    let vk = verifying_key(pub_key)?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify_strict(hash.as_bytes(), &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Deserialize a `PubKey` into an Ed25519 `VerifyingKey`.
///
/// Fails if the 32 bytes are not a valid curve point.
pub fn verifying_key(pub_key: &PubKey) -> Result<ed25519_dalek::VerifyingKey, CryptoError> {
    ed25519_dalek::VerifyingKey::from_bytes(&pub_key.0).map_err(|_| CryptoError::InvalidPublicKey)
}

/// Keyed BLAKE3 MAC under a symmetric thread key.
///
/// Seals record nodes so that only holders of the thread's service key
/// can produce or accept them for relay.
pub fn keyed_mac(key: &Key, data: &[u8]) -> [u8; MAC_LEN] {
    *blake3::keyed_hash(key.as_bytes(), data).as_bytes()
}

/// Generate 32 bytes of cryptographically secure randomness.
pub fn random_bytes() -> [u8; 32] {
    use rand::RngCore;
    let mut out = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

/// Cryptographic operation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid Ed25519 signature")]
    InvalidSignature,

    #[error("invalid Ed25519 public key")]
    InvalidPublicKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let sk = ed25519_dalek::SigningKey::from_bytes(&random_bytes());
        let pk = PubKey(sk.verifying_key().to_bytes());
        let hash = content_hash(b"payload");

        let sig = sign_hash(&sk, &hash);
        assert!(verify_hash(&pk, &hash, &sig).is_ok());
        assert!(verify_hash_strict(&pk, &hash, &sig).is_ok());

        let other = content_hash(b"other payload");
        assert_eq!(
            verify_hash(&pk, &other, &sig),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn mac_depends_on_key() {
        let a = Key::random();
        let b = Key::random();
        assert_ne!(keyed_mac(&a, b"data"), keyed_mac(&b, b"data"));
        assert_eq!(keyed_mac(&a, b"data"), keyed_mac(&a, b"data"));
    }

    #[test]
    fn peer_id_is_stable() {
        let pk = PubKey([3u8; 32]);
        assert_eq!(derive_peer_id(&pk), derive_peer_id(&pk));
        assert_ne!(derive_peer_id(&pk), PeerId(pk.0));
    }
}
