//! The network service.
//!
//! `Net` owns everything the replication core needs — the logstore
//! handle, the transport, the two call queues and their workers, the
//! per-thread semaphores, the optional status registry, and the
//! optional pubsub relay — and implements the background operations
//! the server handlers schedule.

use crate::auth;
use crate::convert;
use crate::error::NetError;
use crate::peers::PeerRegistry;
use crate::proto;
use crate::pubsub::PubsubRelay;
use crate::queue::{CallPriority, CallQueue, SyncOp};
use crate::semaphore::SemaphorePool;
use crate::status::{DownloadGuard, ThreadStatusRegistry};
use std::sync::Arc;
use strand_logstore::{Logstore, LogstoreError};
use strand_model::{Identity, LogInfo, PeerId, Record, ThreadId, ThreadInfo, ThreadKey};
use strand_net_types::{PubsubLayer, Transport};
use tokio_util::sync::CancellationToken;

/// Default cap on the total records returned by one `GetRecords`.
pub const DEFAULT_MAX_PULL_LIMIT: usize = 10_000;

/// Tunables of the network service.
#[derive(Clone, Debug)]
pub struct NetConfig {
    /// Total per-request record budget; each log's share shrinks as
    /// the log count grows.
    pub max_pull_limit: usize,
    /// Workers per call queue.
    pub queue_workers: usize,
    /// Concurrent mutators allowed per thread.
    pub semaphore_capacity: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            max_pull_limit: DEFAULT_MAX_PULL_LIMIT,
            queue_workers: 4,
            semaphore_capacity: 1,
        }
    }
}

/// The network service; see the module docs.
pub struct Net<T: Transport> {
    pub(crate) identity: Identity,
    pub(crate) store: Arc<dyn Logstore>,
    pub(crate) transport: T,
    pub(crate) config: NetConfig,
    pub(crate) queue_get_logs: Arc<CallQueue>,
    pub(crate) queue_get_records: Arc<CallQueue>,
    pub(crate) semaphores: SemaphorePool,
    pub(crate) status: Option<Arc<ThreadStatusRegistry>>,
    pub(crate) pubsub: Option<PubsubRelay>,
    pub(crate) peers: PeerRegistry,
    pub(crate) shutdown: CancellationToken,
}

impl<T: Transport> Net<T> {
    /// Build the service, spawn its queue workers, and join the pubsub
    /// topics of every stored thread.
    pub async fn new(
        identity: Identity,
        store: Arc<dyn Logstore>,
        transport: T,
        pubsub: Option<Arc<dyn PubsubLayer>>,
        status: Option<Arc<ThreadStatusRegistry>>,
        config: NetConfig,
    ) -> Result<Arc<Self>, NetError> {
        if transport.public_key() != identity.pub_key() {
            return Err(NetError::InvalidArgument(
                "transport identity does not match node identity".into(),
            ));
        }

        let shutdown = CancellationToken::new();
        let net = Arc::new(Self {
            identity,
            store,
            transport,
            semaphores: SemaphorePool::new(config.semaphore_capacity),
            queue_get_logs: CallQueue::new(),
            queue_get_records: CallQueue::new(),
            status,
            pubsub: pubsub.map(PubsubRelay::new),
            peers: PeerRegistry::new(),
            shutdown: shutdown.clone(),
            config,
        });

        net.queue_get_logs
            .spawn_workers(net.config.queue_workers, shutdown.child_token());
        net.queue_get_records
            .spawn_workers(net.config.queue_workers, shutdown.child_token());

        if net.pubsub.is_some() {
            for tid in net.store.threads().await.map_err(NetError::internal)? {
                net.subscribe_thread(tid).await?;
            }
        }

        Ok(net)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn peer_id(&self) -> PeerId {
        self.identity.peer_id()
    }

    pub fn store(&self) -> &Arc<dyn Logstore> {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn status(&self) -> Option<&Arc<ThreadStatusRegistry>> {
        self.status.as_ref()
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn queue_get_logs(&self) -> &CallQueue {
        &self.queue_get_logs
    }

    pub fn queue_get_records(&self) -> &CallQueue {
        &self.queue_get_records
    }

    /// Stop the service: cancel workers and topic loops, shut the
    /// pubsub layer down, then drain every thread semaphore and hold —
    /// in-flight mutators finish, new ones block forever.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        if let Some(relay) = &self.pubsub {
            relay.layer.shutdown().await;
        }
        self.semaphores.stop().await;
    }

    // ==================== Scheduling ====================

    pub(crate) fn schedule_update_records(
        self: &Arc<Self>,
        peer: PeerId,
        tid: ThreadId,
        priority: CallPriority,
    ) -> bool {
        let weak = Arc::downgrade(self);
        self.queue_get_records.schedule(
            peer,
            tid,
            priority,
            SyncOp::UpdateRecords,
            Box::new(move || {
                Box::pin(async move {
                    let Some(net) = weak.upgrade() else {
                        return Ok(());
                    };
                    net.update_records_from_peer(peer, tid).await
                })
            }),
        )
    }

    pub(crate) fn schedule_update_logs(
        self: &Arc<Self>,
        peer: PeerId,
        tid: ThreadId,
        priority: CallPriority,
    ) -> bool {
        let weak = Arc::downgrade(self);
        self.queue_get_logs.schedule(
            peer,
            tid,
            priority,
            SyncOp::UpdateLogs,
            Box::new(move || {
                Box::pin(async move {
                    let Some(net) = weak.upgrade() else {
                        return Ok(());
                    };
                    net.update_logs_from_peer(peer, tid).await
                })
            }),
        )
    }

    /// High-priority combined call used when a peer reveals a thread
    /// we do not know: fetch its logs, then join its pubsub topic.
    pub(crate) fn schedule_update_logs_and_subscribe(
        self: &Arc<Self>,
        peer: PeerId,
        tid: ThreadId,
    ) -> bool {
        let weak = Arc::downgrade(self);
        self.queue_get_logs.schedule(
            peer,
            tid,
            CallPriority::High,
            SyncOp::UpdateLogsAndSubscribe,
            Box::new(move || {
                Box::pin(async move {
                    let Some(net) = weak.upgrade() else {
                        return Ok(());
                    };
                    net.update_logs_from_peer(peer, tid).await?;
                    net.subscribe_thread(tid).await
                })
            }),
        )
    }

    // ==================== Local writes ====================

    /// Create a thread owned by this node, with a fresh key set and
    /// this node's own (empty) log.
    pub async fn create_thread(self: &Arc<Self>, tid: ThreadId) -> Result<ThreadInfo, NetError> {
        let mut info = ThreadInfo::new(tid, ThreadKey::random());
        info.logs.push(LogInfo::new(self.identity.pub_key()));
        self.store
            .add_thread(info.clone())
            .await
            .map_err(NetError::internal)?;
        self.subscribe_thread(tid).await?;
        Ok(info)
    }

    /// Append a record to this node's own log and announce it on the
    /// thread's pubsub topic.
    pub async fn append_record(
        self: &Arc<Self>,
        tid: ThreadId,
        event_node: Vec<u8>,
        header_node: Vec<u8>,
        body_node: Vec<u8>,
    ) -> Result<Record, NetError> {
        let service_key = self
            .store
            .service_key(tid)
            .await
            .map_err(NetError::internal)?
            .ok_or_else(|| NetError::NotFound("thread not found".into()))?;
        let lid = self.peer_id();

        let record = {
            let _guard = self.semaphores.acquire(tid).await;
            let prev = self.store.head(tid, lid).await.map_err(NetError::internal)?;
            let record = Record::create(
                self.identity.signing_key(),
                &service_key,
                prev,
                event_node,
                header_node,
                body_node,
            );
            self.store
                .put_record(tid, lid, record.clone())
                .await
                .map_err(NetError::internal)?;
            record
        };

        let body = proto::PushRecordBody {
            thread_id: tid.as_bytes().to_vec(),
            log_id: lid.as_bytes().to_vec(),
            record: Some(convert::record_to_wire(&record)),
        };
        let request = proto::PushRecordRequest {
            header: Some(auth::sign_request(&self.identity, &body)),
            body: Some(body),
        };
        self.publish_record(tid, request).await;

        Ok(record)
    }

    // ==================== Background sync operations ====================

    /// Fetch a peer's view of a thread's logs and upsert the result.
    pub async fn update_logs_from_peer(
        self: &Arc<Self>,
        peer: PeerId,
        tid: ThreadId,
    ) -> Result<(), NetError> {
        let logs = self.get_logs_from(peer, tid).await?;
        tracing::debug!(peer = %peer, thread = %tid, logs = logs.len(), "updating logs from peer");
        self.create_external_logs_if_not_exist(tid, logs).await
    }

    /// Pull every log's tail from a peer, starting at the local heads,
    /// and store what comes back.
    pub async fn update_records_from_peer(
        self: &Arc<Self>,
        peer: PeerId,
        tid: ThreadId,
    ) -> Result<(), NetError> {
        let service_key = self
            .store
            .service_key(tid)
            .await
            .map_err(NetError::internal)?
            .ok_or_else(|| NetError::NotFound("thread not found".into()))?;
        let info = self
            .store
            .thread_info(tid)
            .await
            .map_err(NetError::internal)?;

        let queries = info
            .logs
            .iter()
            .map(|l| proto::LogQuery {
                log_id: l.id.as_bytes().to_vec(),
                offset: convert::opt_cid_bytes(l.head),
                limit: self.config.max_pull_limit as u64,
            })
            .collect();

        let mut guard = DownloadGuard::start(self.status.clone(), peer, tid);
        let reply = self
            .get_records_from(peer, tid, &service_key, queries)
            .await?;

        for batch in &reply.logs {
            let lid = convert::peer_id(&batch.log_id)?;
            if let Some(wire_log) = &batch.log {
                let log = convert::log_from_wire(wire_log)?;
                self.create_external_logs_if_not_exist(tid, vec![log])
                    .await?;
            }
            if batch.records.is_empty() {
                continue;
            }
            let log_pub_key = self
                .store
                .log_pub_key(tid, lid)
                .await
                .map_err(NetError::internal)?
                .ok_or_else(|| NetError::NotFound("log not found".into()))?;

            tracing::debug!(
                peer = %peer,
                thread = %tid,
                log = %lid,
                records = batch.records.len(),
                "storing records from peer"
            );
            for wire_record in &batch.records {
                let record = convert::record_from_wire(wire_record, &service_key)?;
                if self
                    .store
                    .is_known(record.cid())
                    .await
                    .map_err(NetError::internal)?
                {
                    continue;
                }
                auth::verify_record(record.clone(), log_pub_key).await?;
                self.put_record(peer, tid, lid, record).await?;
            }
        }

        guard.succeed();
        Ok(())
    }

    /// Upsert externally learned logs under the thread's semaphore.
    ///
    /// Unknown logs are added wholesale; for a log we already track,
    /// only addresses are merged — a remote sender never overwrites the
    /// key or head of an existing log.
    pub async fn create_external_logs_if_not_exist(
        self: &Arc<Self>,
        tid: ThreadId,
        logs: Vec<LogInfo>,
    ) -> Result<(), NetError> {
        let _guard = self.semaphores.acquire(tid).await;
        let info = self
            .store
            .thread_info(tid)
            .await
            .map_err(NetError::internal)?;
        for log in logs {
            match info.log(log.id) {
                None => self
                    .store
                    .add_log(tid, log)
                    .await
                    .map_err(NetError::internal)?,
                Some(_) => {
                    if !log.addrs.is_empty() {
                        self.store
                            .update_addrs(tid, log.id, &log.addrs)
                            .await
                            .map_err(NetError::internal)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Store a record received from `from`, serialized on the thread's
    /// semaphore.
    ///
    /// A record that does not extend the local chain means the sender
    /// is ahead of us: the insert fails, and a high-priority pull from
    /// the sender is scheduled to close the gap.
    pub(crate) async fn put_record(
        self: &Arc<Self>,
        from: PeerId,
        tid: ThreadId,
        lid: PeerId,
        record: Record,
    ) -> Result<(), NetError> {
        let result = {
            let _guard = self.semaphores.acquire(tid).await;
            self.store.put_record(tid, lid, record).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(LogstoreError::HeadMismatch) => {
                if self.schedule_update_records(from, tid, CallPriority::High) {
                    tracing::warn!(
                        peer = %from,
                        thread = %tid,
                        log = %lid,
                        "record does not extend the local chain, pull from peer scheduled"
                    );
                }
                Err(NetError::Internal(
                    "record does not extend the local chain".into(),
                ))
            }
            Err(e) => Err(NetError::internal(e)),
        }
    }
}
