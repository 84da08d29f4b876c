//! Peer session tracking.
//!
//! Volatile network-layer state: which public key backs a verified
//! caller id, and when the peer was last heard from. Handlers record
//! every verified caller here so queued background work can dial the
//! originator later. Reset on restart, never persisted.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;
use strand_model::{PeerId, PubKey};

struct PeerSession {
    pub_key: PubKey,
    last_seen: Instant,
}

/// Tracks verified callers and their keys.
#[derive(Default)]
pub struct PeerRegistry {
    sessions: RwLock<HashMap<PeerId, PeerSession>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a verified caller. Returns true for a new session.
    pub fn mark_seen(&self, peer: PeerId, pub_key: PubKey) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions
            .insert(
                peer,
                PeerSession {
                    pub_key,
                    last_seen: Instant::now(),
                },
            )
            .is_none()
    }

    /// The public key behind a verified caller id.
    pub fn pub_key(&self, peer: PeerId) -> Option<PubKey> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(&peer).map(|s| s.pub_key)
    }

    pub fn last_seen(&self, peer: PeerId) -> Option<Instant> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(&peer).map(|s| s.last_seen)
    }

    pub fn peers(&self) -> Vec<PeerId> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.keys().copied().collect()
    }
}
