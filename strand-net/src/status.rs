//! Thread-status registry: per-(peer, thread) sync observability.
//!
//! Handlers report transitions as they happen; the registry folds them
//! into a readable summary table. Reporting is non-blocking and lossy
//! under back-pressure — this is observability, not durability — and
//! the registry is optional everywhere: handlers check presence before
//! emitting.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use strand_model::{PeerId, ThreadId};
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 256;

/// A sync transition observed for one (peer, thread).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    DownloadStarted,
    DownloadDone,
    DownloadFailed,
    UploadStarted,
    UploadDone,
    UploadFailed,
}

/// Folded state of one sync direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Unknown,
    InProgress,
    Done,
    Failed,
}

/// Folded summary of both directions for a (peer, thread) pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeerThreadStatus {
    pub down: SyncState,
    pub up: SyncState,
}

impl PeerThreadStatus {
    fn apply(&mut self, status: ThreadStatus) {
        match status {
            ThreadStatus::DownloadStarted => self.down = SyncState::InProgress,
            ThreadStatus::DownloadDone => self.down = SyncState::Done,
            ThreadStatus::DownloadFailed => self.down = SyncState::Failed,
            ThreadStatus::UploadStarted => self.up = SyncState::InProgress,
            ThreadStatus::UploadDone => self.up = SyncState::Done,
            ThreadStatus::UploadFailed => self.up = SyncState::Failed,
        }
    }
}

/// Process-wide sink for thread-status transitions.
pub struct ThreadStatusRegistry {
    tx: mpsc::Sender<(PeerId, ThreadId, ThreadStatus)>,
    table: Arc<RwLock<HashMap<(PeerId, ThreadId), PeerThreadStatus>>>,
}

impl ThreadStatusRegistry {
    pub fn new() -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        let table: Arc<RwLock<HashMap<(PeerId, ThreadId), PeerThreadStatus>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let fold_table = table.clone();
        tokio::spawn(async move {
            while let Some((peer, tid, status)) = rx.recv().await {
                let mut table = fold_table.write().unwrap_or_else(|e| e.into_inner());
                table.entry((peer, tid)).or_default().apply(status);
            }
        });

        Arc::new(Self { tx, table })
    }

    /// Report a transition. Never blocks; drops on back-pressure.
    pub fn apply(&self, peer: PeerId, tid: ThreadId, status: ThreadStatus) {
        if self.tx.try_send((peer, tid, status)).is_err() {
            tracing::trace!(peer = %peer, thread = %tid, status = ?status, "thread status dropped");
        }
    }

    /// Folded summary for a (peer, thread), if any transition was seen.
    pub fn status(&self, peer: PeerId, tid: ThreadId) -> Option<PeerThreadStatus> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table.get(&(peer, tid)).copied()
    }
}

/// Scoped terminal-status emitter for a download.
///
/// Emits `DownloadStarted` on construction and a terminal status on
/// every exit path: `DownloadFailed` unless [`DownloadGuard::succeed`]
/// was called first.
pub struct DownloadGuard {
    registry: Option<Arc<ThreadStatusRegistry>>,
    peer: PeerId,
    tid: ThreadId,
    terminal: ThreadStatus,
}

impl DownloadGuard {
    pub fn start(registry: Option<Arc<ThreadStatusRegistry>>, peer: PeerId, tid: ThreadId) -> Self {
        if let Some(registry) = &registry {
            registry.apply(peer, tid, ThreadStatus::DownloadStarted);
        }
        Self {
            registry,
            peer,
            tid,
            terminal: ThreadStatus::DownloadFailed,
        }
    }

    /// Promote the terminal status to `DownloadDone`.
    pub fn succeed(&mut self) {
        self.terminal = ThreadStatus::DownloadDone;
    }
}

impl Drop for DownloadGuard {
    fn drop(&mut self) {
        if let Some(registry) = &self.registry {
            registry.apply(self.peer, self.tid, self.terminal);
        }
    }
}
