//! The logstore facade.
//!
//! Everything the replication core persists — thread metadata, log
//! descriptors, symmetric keys, and record chains — goes through this
//! trait. The network layer holds it as `Arc<dyn Logstore>` and never
//! touches a storage engine directly.

use crate::error::LogstoreError;
use async_trait::async_trait;
use strand_model::{Cid, Key, LogInfo, PeerId, PubKey, Record, ThreadId, ThreadInfo};

#[async_trait]
pub trait Logstore: Send + Sync {
    /// Ids of all locally known threads.
    async fn threads(&self) -> Result<Vec<ThreadId>, LogstoreError>;

    /// Full metadata of a thread.
    async fn thread_info(&self, tid: ThreadId) -> Result<ThreadInfo, LogstoreError>;

    /// Create a thread with its key set and initial logs.
    async fn add_thread(&self, info: ThreadInfo) -> Result<(), LogstoreError>;

    /// Store a service key, creating the thread entry if absent.
    async fn add_service_key(&self, tid: ThreadId, key: Key) -> Result<(), LogstoreError>;

    /// Store a read key for an existing thread.
    async fn add_read_key(&self, tid: ThreadId, key: Key) -> Result<(), LogstoreError>;

    async fn service_key(&self, tid: ThreadId) -> Result<Option<Key>, LogstoreError>;

    async fn read_key(&self, tid: ThreadId) -> Result<Option<Key>, LogstoreError>;

    /// Add a log to an existing thread. Addresses are canonicalized.
    async fn add_log(&self, tid: ThreadId, log: LogInfo) -> Result<(), LogstoreError>;

    /// Merge addresses into an existing log's address set.
    async fn update_addrs(
        &self,
        tid: ThreadId,
        lid: PeerId,
        addrs: &[String],
    ) -> Result<(), LogstoreError>;

    /// The public key of a log, if the log is known.
    async fn log_pub_key(&self, tid: ThreadId, lid: PeerId)
        -> Result<Option<PubKey>, LogstoreError>;

    /// Current head of a log. `None` for an empty or unknown log.
    async fn head(&self, tid: ThreadId, lid: PeerId) -> Result<Option<Cid>, LogstoreError>;

    /// Whether a record cid is stored anywhere locally.
    async fn is_known(&self, cid: Cid) -> Result<bool, LogstoreError>;

    /// Append a record to a log and advance its head.
    ///
    /// Atomic per (thread, log): either the record lands and the head
    /// moves to it, or nothing changes. A known cid is a no-op; a
    /// record whose `prev` is not the current head fails with
    /// [`LogstoreError::HeadMismatch`].
    async fn put_record(
        &self,
        tid: ThreadId,
        lid: PeerId,
        record: Record,
    ) -> Result<(), LogstoreError>;

    /// Records strictly after `offset` in chain order, up to `limit`.
    ///
    /// `None` reads from the start of the chain. An offset that is not
    /// on the chain fails with [`LogstoreError::OffsetMissing`].
    async fn records_after(
        &self,
        tid: ThreadId,
        lid: PeerId,
        offset: Option<Cid>,
        limit: usize,
    ) -> Result<Vec<Record>, LogstoreError>;

    /// Addresses edge of a thread.
    ///
    /// Fails with [`LogstoreError::ThreadNotFound`] when the thread is
    /// unknown or holds no logs to fingerprint.
    async fn addrs_edge(&self, tid: ThreadId) -> Result<u64, LogstoreError>;

    /// Heads edge of a thread.
    ///
    /// Fails with [`LogstoreError::ThreadNotFound`] when no log of the
    /// thread has a head yet; callers distinguish this from the addrs
    /// edge failing, which means the whole thread is unknown.
    async fn heads_edge(&self, tid: ThreadId) -> Result<u64, LogstoreError>;
}
