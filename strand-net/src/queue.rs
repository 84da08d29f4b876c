//! The call queue: de-duplicating, two-priority scheduler for
//! background sync work.
//!
//! Remote-initiated handlers must reply quickly, but their consequences
//! (follow-up fetches from the peer) are long-running. Handlers drop
//! that work here; a fixed pool of workers drains it. Entries are
//! keyed by (peer, thread, operation), so a burst of peers reporting
//! the same divergence collapses into one pending call, and at most
//! one invocation per key is ever in flight.

use crate::error::NetError;
use futures_util::future::BoxFuture;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use strand_model::{PeerId, ThreadId};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Identity of a scheduled function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncOp {
    UpdateLogs,
    UpdateRecords,
    /// Update logs, then join the thread's pubsub topic; used when a
    /// previously unknown thread is discovered.
    UpdateLogsAndSubscribe,
}

/// Priority class of a queued call. An entry may be upgraded from
/// `Low` to `High` while queued, never downgraded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CallPriority {
    Low,
    High,
}

type QueueKey = (PeerId, ThreadId, SyncOp);

/// A queued unit of work, constructed once scheduling succeeds.
pub type Job = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), NetError>> + Send>;

struct Entry {
    priority: CallPriority,
    job: Job,
}

#[derive(Default)]
struct State {
    entries: HashMap<QueueKey, Entry>,
    order: VecDeque<QueueKey>,
    running: HashSet<QueueKey>,
}

/// De-duplicating priority scheduler; see the module docs.
pub struct CallQueue {
    state: Mutex<State>,
    notify: Notify,
}

impl CallQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        })
    }

    /// Enqueue work for `(peer, thread, op)` unless an equal or higher
    /// priority entry is already queued. Returns true iff this call
    /// changed queue state (inserted or upgraded).
    pub fn schedule(
        &self,
        peer: PeerId,
        tid: ThreadId,
        priority: CallPriority,
        op: SyncOp,
        job: Job,
    ) -> bool {
        let key = (peer, tid, op);
        let changed = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match state.entries.get_mut(&key) {
                Some(entry) => {
                    if priority > entry.priority {
                        entry.priority = priority;
                        true
                    } else {
                        false
                    }
                }
                None => {
                    state.entries.insert(key, Entry { priority, job });
                    state.order.push_back(key);
                    true
                }
            }
        };
        if changed {
            self.notify.notify_one();
        }
        changed
    }

    /// Whether an entry is currently queued (not merely running).
    pub fn is_queued(&self, peer: PeerId, tid: ThreadId, op: SyncOp) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.contains_key(&(peer, tid, op))
    }

    /// Priority of a queued entry, if any.
    pub fn queued_priority(&self, peer: PeerId, tid: ThreadId, op: SyncOp) -> Option<CallPriority> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.get(&(peer, tid, op)).map(|e| e.priority)
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the best eligible entry: first high-priority in FIFO
    /// order, else first low-priority, skipping keys already running.
    fn pop(&self) -> Option<(QueueKey, Job)> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut chosen: Option<usize> = None;
        for (idx, key) in state.order.iter().enumerate() {
            if state.running.contains(key) {
                continue;
            }
            let Some(entry) = state.entries.get(key) else {
                continue;
            };
            match entry.priority {
                CallPriority::High => {
                    chosen = Some(idx);
                    break;
                }
                CallPriority::Low => {
                    if chosen.is_none() {
                        chosen = Some(idx);
                    }
                }
            }
        }
        let idx = chosen?;
        let key = state.order.remove(idx)?;
        let entry = state.entries.remove(&key)?;
        state.running.insert(key);
        Some((key, entry.job))
    }

    fn finish(&self, key: &QueueKey) {
        let pending = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.running.remove(key);
            !state.entries.is_empty()
        };
        if pending {
            self.notify.notify_one();
        }
    }

    /// Spawn `count` worker tasks draining the queue until cancelled.
    pub fn spawn_workers(self: &Arc<Self>, count: usize, shutdown: CancellationToken) {
        for _ in 0..count {
            let queue = self.clone();
            let token = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    while let Some((key, job)) = queue.pop() {
                        let (peer, tid, op) = key;
                        if let Err(e) = job().await {
                            tracing::warn!(
                                peer = %peer,
                                thread = %tid,
                                op = ?op,
                                error = %e,
                                "background sync call failed"
                            );
                        }
                        queue.finish(&key);
                    }
                    tokio::select! {
                        _ = token.cancelled() => return,
                        _ = queue.notify.notified() => {}
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn noop() -> Job {
        Box::new(|| Box::pin(async { Ok(()) }))
    }

    fn key() -> (PeerId, ThreadId) {
        (PeerId([1; 32]), ThreadId([2; 32]))
    }

    #[tokio::test]
    async fn schedule_deduplicates() {
        let q = CallQueue::new();
        let (peer, tid) = key();
        assert!(q.schedule(peer, tid, CallPriority::Low, SyncOp::UpdateRecords, noop()));
        assert!(!q.schedule(peer, tid, CallPriority::Low, SyncOp::UpdateRecords, noop()));
        assert_eq!(q.len(), 1);

        // A different op under the same (peer, thread) is distinct.
        assert!(q.schedule(peer, tid, CallPriority::Low, SyncOp::UpdateLogs, noop()));
        assert_eq!(q.len(), 2);
    }

    #[tokio::test]
    async fn upgrade_but_never_downgrade() {
        let q = CallQueue::new();
        let (peer, tid) = key();
        q.schedule(peer, tid, CallPriority::Low, SyncOp::UpdateRecords, noop());

        assert!(q.schedule(peer, tid, CallPriority::High, SyncOp::UpdateRecords, noop()));
        assert_eq!(
            q.queued_priority(peer, tid, SyncOp::UpdateRecords),
            Some(CallPriority::High)
        );

        assert!(!q.schedule(peer, tid, CallPriority::Low, SyncOp::UpdateRecords, noop()));
        assert_eq!(
            q.queued_priority(peer, tid, SyncOp::UpdateRecords),
            Some(CallPriority::High)
        );
    }

    #[tokio::test]
    async fn workers_run_high_priority_first() {
        let q = CallQueue::new();
        let ran = Arc::new(Mutex::new(Vec::new()));
        let (peer, tid) = key();
        let other = ThreadId([3; 32]);

        for (tid, priority, tag) in [
            (tid, CallPriority::Low, "low"),
            (other, CallPriority::High, "high"),
        ] {
            let ran = ran.clone();
            q.schedule(
                peer,
                tid,
                priority,
                SyncOp::UpdateRecords,
                Box::new(move || {
                    Box::pin(async move {
                        ran.lock().unwrap().push(tag);
                        Ok(())
                    })
                }),
            );
        }

        let token = CancellationToken::new();
        q.spawn_workers(1, token.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();

        assert_eq!(*ran.lock().unwrap(), vec!["high", "low"]);
    }

    #[tokio::test]
    async fn at_most_one_in_flight_per_key() {
        let q = CallQueue::new();
        let (peer, tid) = key();
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let make_job = |concurrent: Arc<AtomicUsize>,
                        peak: Arc<AtomicUsize>,
                        runs: Arc<AtomicUsize>|
         -> Job {
            Box::new(move || {
                Box::pin(async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
        };

        let token = CancellationToken::new();
        q.spawn_workers(4, token.clone());

        q.schedule(
            peer,
            tid,
            CallPriority::Low,
            SyncOp::UpdateRecords,
            make_job(concurrent.clone(), peak.clone(), runs.clone()),
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
        // Re-scheduled while the first run is in flight: queued, not
        // run concurrently.
        q.schedule(
            peer,
            tid,
            CallPriority::Low,
            SyncOp::UpdateRecords,
            make_job(concurrent.clone(), peak.clone(), runs.clone()),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        token.cancel();

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
