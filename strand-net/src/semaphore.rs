//! Per-thread semaphores.
//!
//! Conflicting mutators on one thread are serialized through a bounded
//! counting semaphore while unrelated threads proceed in parallel.
//! Releasing a semaphore that is not held is a programming error and
//! panics. `stop()` drains the pool: it acquires every semaphore and
//! never releases, so all subsequent mutators block for good.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use strand_model::ThreadId;

/// A bounded counting semaphore for one thread's mutators.
pub struct ThreadSemaphore {
    permits: tokio::sync::Semaphore,
    held: AtomicUsize,
}

impl ThreadSemaphore {
    fn new(capacity: usize) -> Self {
        Self {
            permits: tokio::sync::Semaphore::new(capacity),
            held: AtomicUsize::new(0),
        }
    }

    /// Blocking acquire.
    pub async fn acquire(&self) {
        match self.permits.acquire().await {
            Ok(permit) => permit.forget(),
            // The semaphore is never closed.
            Err(_) => unreachable!("thread semaphore closed"),
        }
        self.held.fetch_add(1, Ordering::SeqCst);
    }

    /// Non-blocking acquire.
    pub fn try_acquire(&self) -> bool {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.held.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(_) => false,
        }
    }

    pub fn release(&self) {
        let balanced = self
            .held
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |h| h.checked_sub(1));
        if balanced.is_err() {
            panic!("thread semaphore inconsistency: release before acquire");
        }
        self.permits.add_permits(1);
    }
}

/// Holds one acquisition; releases on drop.
pub struct SemaphoreGuard {
    sem: Arc<ThreadSemaphore>,
}

impl Drop for SemaphoreGuard {
    fn drop(&mut self) {
        self.sem.release();
    }
}

/// Lazily built map of thread id → semaphore.
pub struct SemaphorePool {
    semaphores: Mutex<HashMap<ThreadId, Arc<ThreadSemaphore>>>,
    capacity: usize,
}

impl SemaphorePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphores: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// The semaphore for a thread, created on first use.
    pub fn get(&self, tid: ThreadId) -> Arc<ThreadSemaphore> {
        let mut map = self.semaphores.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(tid)
            .or_insert_with(|| Arc::new(ThreadSemaphore::new(self.capacity)))
            .clone()
    }

    /// Acquire a thread's semaphore, releasing when the guard drops.
    pub async fn acquire(&self, tid: ThreadId) -> SemaphoreGuard {
        let sem = self.get(tid);
        sem.acquire().await;
        SemaphoreGuard { sem }
    }

    /// Drain the pool: acquire every semaphore and hold forever.
    pub async fn stop(&self) {
        let all: Vec<Arc<ThreadSemaphore>> = {
            let map = self.semaphores.lock().unwrap_or_else(|e| e.into_inner());
            map.values().cloned().collect()
        };
        for sem in all {
            sem.acquire().await;
        }
    }
}
