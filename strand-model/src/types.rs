//! Strong types for fixed-size byte arrays
//!
//! Semantic newtypes for the identifiers that flow through the whole
//! system, replacing raw `[u8; N]`.

use std::fmt;

macro_rules! byte_type {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(pub [u8; $len]);

        impl Default for $name {
            fn default() -> Self {
                Self([0u8; $len])
            }
        }

        impl $name {
            pub const LEN: usize = $len;

            /// The inner bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl From<$name> for [u8; $len] {
            fn from(v: $name) -> [u8; $len] {
                v.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;
            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                Ok(Self(<[u8; $len]>::try_from(slice)?))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

byte_type!(Cid, 32, "32-byte BLAKE3 content id of a sealed record node");
byte_type!(PubKey, 32, "32-byte Ed25519 public key");
byte_type!(Signature, 64, "64-byte Ed25519 signature");
byte_type!(Key, 32, "32-byte symmetric thread key (service or read)");
byte_type!(ThreadId, 32, "Random 32-byte thread identifier");
byte_type!(PeerId, 32, "32-byte peer identifier (fingerprint of a public key)");

impl ThreadId {
    /// Generate a fresh random thread id.
    pub fn random() -> Self {
        Self(crate::crypto::random_bytes())
    }
}

impl Key {
    /// Generate a fresh random symmetric key.
    pub fn random() -> Self {
        Self(crate::crypto::random_bytes())
    }
}

impl PeerId {
    /// Derive a peer id from the peer's public key.
    pub fn from_pub_key(pub_key: &PubKey) -> Self {
        crate::crypto::derive_peer_id(pub_key)
    }
}
