//! Node identity: the Ed25519 keypair a peer signs with.
//!
//! The same key backs the transport identity (QUIC endpoint), the log
//! the node authors, and every request header it emits.

use crate::crypto;
use crate::types::{Cid, PeerId, PubKey, Signature};

/// A node's signing identity.
#[derive(Clone)]
pub struct Identity {
    signing_key: ed25519_dalek::SigningKey,
}

impl Identity {
    /// Generate a fresh identity from the system CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&crypto::random_bytes()),
        }
    }

    /// Restore an identity from raw secret key bytes.
    pub fn from_bytes(secret: [u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&secret),
        }
    }

    pub fn pub_key(&self) -> PubKey {
        PubKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId::from_pub_key(&self.pub_key())
    }

    /// Sign a content hash with this identity.
    pub fn sign_hash(&self, hash: &Cid) -> Signature {
        crypto::sign_hash(&self.signing_key, hash)
    }

    /// The underlying signing key, for transports that bind the same
    /// identity to the wire (e.g. an iroh endpoint).
    pub fn signing_key(&self) -> &ed25519_dalek::SigningKey {
        &self.signing_key
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("peer_id", &self.peer_id())
            .finish_non_exhaustive()
    }
}
