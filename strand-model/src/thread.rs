//! Thread and log metadata.
//!
//! A thread is a collection of per-writer logs; each log is identified
//! by its author's peer id and carries the author's public key, dial
//! addresses, and the head of the record chain.

use crate::types::{Cid, Key, PeerId, PubKey, ThreadId};

/// The symmetric key set of a thread.
///
/// A thread known only by its service key is *followable*: the node can
/// relay and store records but not decrypt their bodies. The read key
/// additionally makes it *readable*; this core never uses it for
/// decryption, only stores and forwards it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadKey {
    pub service: Option<Key>,
    pub read: Option<Key>,
}

impl ThreadKey {
    /// A followable key set (service key only).
    pub fn new_service(service: Key) -> Self {
        Self {
            service: Some(service),
            read: None,
        }
    }

    /// A fresh, fully readable key set.
    pub fn random() -> Self {
        Self {
            service: Some(Key::random()),
            read: Some(Key::random()),
        }
    }

    /// Whether any syncable key material is present.
    pub fn defined(&self) -> bool {
        self.service.is_some()
    }

    /// Whether record bodies could be decrypted by a holder.
    pub fn can_read(&self) -> bool {
        self.read.is_some()
    }
}

/// Metadata of one writer's log within a thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogInfo {
    /// The author's peer id; a log id never differs from it.
    pub id: PeerId,
    /// Public key verifying the author's record signatures.
    pub pub_key: PubKey,
    /// Dial hints for reaching the author. Order carries no meaning.
    pub addrs: Vec<String>,
    /// Most recent record cid; `None` means the log is empty.
    pub head: Option<Cid>,
}

impl LogInfo {
    /// A new, empty log for the given author.
    pub fn new(pub_key: PubKey) -> Self {
        Self {
            id: PeerId::from_pub_key(&pub_key),
            pub_key,
            addrs: Vec::new(),
            head: None,
        }
    }
}

/// Canonical form of an address set: sorted and deduplicated.
///
/// Both ends must hash the same bytes when computing the addrs edge, so
/// every address list is canonicalized before storage or hashing.
pub fn canonical_addrs(addrs: &[String]) -> Vec<String> {
    let mut out: Vec<String> = addrs.to_vec();
    out.sort();
    out.dedup();
    out
}

/// Full metadata of a thread as held locally.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub key: ThreadKey,
    pub logs: Vec<LogInfo>,
}

impl ThreadInfo {
    pub fn new(id: ThreadId, key: ThreadKey) -> Self {
        Self {
            id,
            key,
            logs: Vec::new(),
        }
    }

    pub fn log(&self, id: PeerId) -> Option<&LogInfo> {
        self.logs.iter().find(|l| l.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_set_states() {
        let none = ThreadKey::default();
        assert!(!none.defined());
        assert!(!none.can_read());

        let follow = ThreadKey::new_service(Key::random());
        assert!(follow.defined());
        assert!(!follow.can_read());

        let full = ThreadKey::random();
        assert!(full.defined());
        assert!(full.can_read());
    }

    #[test]
    fn addrs_canonicalization() {
        let addrs = vec![
            "/ip4/10.0.0.2/udp/4001".to_string(),
            "/ip4/10.0.0.1/udp/4001".to_string(),
            "/ip4/10.0.0.2/udp/4001".to_string(),
        ];
        let canon = canonical_addrs(&addrs);
        assert_eq!(
            canon,
            vec![
                "/ip4/10.0.0.1/udp/4001".to_string(),
                "/ip4/10.0.0.2/udp/4001".to_string(),
            ]
        );
    }
}
