//! Edge fingerprints: cheap divergence detection for thread state.
//!
//! An edge is a 64-bit fingerprint of either the (log, head) set or the
//! (log, addresses) set of a thread. Two peers compare edges to decide
//! whether reconciliation is needed without shipping full metadata.
//! Per-entry hashes are folded with XOR, so the result is independent
//! of iteration order; the empty set hashes to zero.
//!
//! Equality is treated as set equality for sync decisions: a mismatch
//! always triggers reconciliation, a match only skips work, so a
//! 64-bit collision never loses data.

use strand_model::thread::canonical_addrs;
use strand_model::{Cid, LogInfo, PeerId};

/// One (log, head) pair of a thread's heads set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogHead {
    pub id: PeerId,
    pub head: Cid,
}

fn fold(hasher: blake3::Hasher) -> u64 {
    let mut out = [0u8; 8];
    out.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
    u64::from_le_bytes(out)
}

/// Fingerprint of a set of log heads.
pub fn heads_edge(heads: &[LogHead]) -> u64 {
    let mut edge = 0u64;
    for lh in heads {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"head");
        hasher.update(lh.id.as_bytes());
        hasher.update(lh.head.as_bytes());
        edge ^= fold(hasher);
    }
    edge
}

/// Fingerprint of the (log, addresses) set of a thread.
///
/// Addresses are canonicalized (sorted, deduplicated) and length-framed
/// before hashing so both ends agree regardless of ordering.
pub fn addrs_edge(logs: &[LogInfo]) -> u64 {
    let mut edge = 0u64;
    for lg in logs {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"addrs");
        hasher.update(lg.id.as_bytes());
        for addr in canonical_addrs(&lg.addrs) {
            hasher.update(&(addr.len() as u32).to_le_bytes());
            hasher.update(addr.as_bytes());
        }
        edge ^= fold(hasher);
    }
    edge
}
