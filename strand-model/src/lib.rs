//! Strand Model
//!
//! Pure data types for the strand replicated log database, decoupled
//! from storage engines and network stacks: strong byte types, the
//! cryptographic primitives, node identity, thread/log metadata, and
//! the sealed record model.

pub mod crypto;
pub mod identity;
pub mod record;
pub mod thread;
pub mod types;

pub use crypto::CryptoError;
pub use identity::Identity;
pub use record::{Record, RecordError};
pub use thread::{canonical_addrs, LogInfo, ThreadInfo, ThreadKey};
pub use types::{Cid, Key, PeerId, PubKey, Signature, ThreadId};
