//! Server-side RPC handlers.
//!
//! The five sync operations a peer can call on us. Every handler
//! verifies the request signature first, mutates state only through
//! the logstore and the call queues, and never blocks its reply on
//! long-running synchronization work — follow-ups are scheduled, not
//! awaited.

use crate::auth;
use crate::convert;
use crate::error::NetError;
use crate::net::Net;
use crate::proto;
use crate::queue::CallPriority;
use crate::status::{DownloadGuard, ThreadStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use strand_logstore::edge::{heads_edge, LogHead};
use strand_logstore::LogstoreError;
use strand_model::{PeerId, ThreadId};
use strand_net_types::Transport;

/// Local edge state of a thread, steering `ExchangeEdges`.
enum LocalEdges {
    Both { addrs: u64, heads: u64 },
    /// The thread (or any address to fingerprint) is unknown.
    NoAddrs,
    /// The thread is known and addressed, but no log has a head yet.
    NoHeads,
}

impl<T: Transport> Net<T> {
    /// `GetLogs`: return every local log of a thread to an authorized
    /// caller.
    pub async fn handle_get_logs(
        &self,
        req: proto::GetLogsRequest,
    ) -> Result<proto::GetLogsReply, NetError> {
        let (pid, pk) = auth::verify_request(req.header.as_ref(), req.body.as_ref()).await?;
        let body = req
            .body
            .ok_or_else(|| NetError::InvalidArgument("bad request".into()))?;
        let tid = convert::thread_id(&body.thread_id)?;
        self.peers.mark_seen(pid, pk);
        tracing::debug!(thread = %tid, peer = %pid, "received get logs request");

        self.check_service_key(tid, &body.service_key).await?;

        let info = self
            .store
            .thread_info(tid)
            .await
            .map_err(NetError::internal)?;

        tracing::debug!(thread = %tid, peer = %pid, logs = info.logs.len(), "sending logs to peer");
        Ok(proto::GetLogsReply {
            logs: info.logs.iter().map(convert::log_to_wire).collect(),
        })
    }

    /// `PushLog`: pick up any missing keys, upsert the pushed log, and
    /// schedule a background pull of its records.
    pub async fn handle_push_log(
        self: &Arc<Self>,
        req: proto::PushLogRequest,
    ) -> Result<proto::PushLogReply, NetError> {
        let (pid, pk) = auth::verify_request(req.header.as_ref(), req.body.as_ref()).await?;
        let body = req
            .body
            .ok_or_else(|| NetError::InvalidArgument("bad request".into()))?;
        let tid = convert::thread_id(&body.thread_id)?;
        self.peers.mark_seen(pid, pk);
        tracing::debug!(thread = %tid, peer = %pid, "received push log request");

        // Best-effort key uptake before anything else.
        let key = match self.store.thread_info(tid).await {
            Ok(info) => info.key,
            Err(LogstoreError::ThreadNotFound) => Default::default(),
            Err(e) => return Err(NetError::internal(e)),
        };
        if !key.defined() {
            if body.service_key.is_empty() {
                return Err(NetError::NotFound("thread not found".into()));
            }
            let service_key = convert::key(&body.service_key)?;
            self.store
                .add_service_key(tid, service_key)
                .await
                .map_err(NetError::internal)?;
        } else if !key.can_read() && !body.read_key.is_empty() {
            let read_key = convert::key(&body.read_key)?;
            self.store
                .add_read_key(tid, read_key)
                .await
                .map_err(NetError::internal)?;
        }

        let log = body
            .log
            .as_ref()
            .ok_or_else(|| NetError::InvalidArgument("log is required".into()))?;
        let log = convert::log_from_wire(log)?;
        self.create_external_logs_if_not_exist(tid, vec![log]).await?;

        self.subscribe_thread(tid).await?;

        if self.schedule_update_records(pid, tid, CallPriority::Low) {
            tracing::debug!(thread = %tid, peer = %pid, "record update for thread from peer scheduled");
        }
        Ok(proto::PushLogReply {})
    }

    /// `GetRecords`: ship each local log's tail past the caller's
    /// offsets, bounded by the pull limit.
    pub async fn handle_get_records(
        self: &Arc<Self>,
        req: proto::GetRecordsRequest,
    ) -> Result<proto::GetRecordsReply, NetError> {
        let (pid, pk) = auth::verify_request(req.header.as_ref(), req.body.as_ref()).await?;
        let body = req
            .body
            .ok_or_else(|| NetError::InvalidArgument("bad request".into()))?;
        let tid = convert::thread_id(&body.thread_id)?;
        self.peers.mark_seen(pid, pk);
        tracing::debug!(thread = %tid, peer = %pid, "received get records request");

        self.check_service_key(tid, &body.service_key).await?;

        let mut queries: HashMap<PeerId, &proto::LogQuery> = HashMap::new();
        for query in &body.logs {
            queries.insert(convert::peer_id(&query.log_id)?, query);
        }

        // Fast check: are the requested offsets already our heads?
        if !self.heads_changed(tid, &body.logs).await? {
            return Ok(proto::GetRecordsReply::default());
        }

        let info = match self.store.thread_info(tid).await {
            Ok(info) => info,
            // No local metadata; the caller will learn that through an
            // edge exchange, not from this reply.
            Err(LogstoreError::ThreadNotFound) => return Ok(proto::GetRecordsReply::default()),
            Err(e) => return Err(NetError::internal(e)),
        };
        if info.logs.is_empty() {
            return Ok(proto::GetRecordsReply::default());
        }

        let per_log_limit = self.config.max_pull_limit / info.logs.len();
        let results = Arc::new(tokio::sync::Mutex::new(Vec::with_capacity(info.logs.len())));
        let failures = Arc::new(AtomicU32::new(0));

        let mut tasks = tokio::task::JoinSet::new();
        for log in info.logs {
            let (offset, limit, wire_log) = match queries.get(&log.id) {
                Some(query) => (
                    convert::opt_cid(&query.offset)?,
                    (query.limit as usize).min(per_log_limit),
                    None,
                ),
                // The caller does not know this log; attach its
                // descriptor to the reply.
                None => (None, per_log_limit, Some(convert::log_to_wire(&log))),
            };

            let net = self.clone();
            let results = results.clone();
            let failures = failures.clone();
            tasks.spawn(async move {
                let lid = log.id;
                let records = match net.store.records_after(tid, lid, offset, limit).await {
                    Ok(records) => records,
                    Err(LogstoreError::OffsetMissing) => {
                        failures.fetch_add(1, Ordering::SeqCst);
                        // The peer holds records we do not: it is ahead
                        // of us, not behind.
                        if net.schedule_update_records(pid, tid, CallPriority::High) {
                            tracing::warn!(
                                thread = %tid,
                                log = %lid,
                                peer = %pid,
                                "requested offset not found, record update from peer scheduled"
                            );
                        }
                        return;
                    }
                    Err(e) => {
                        tracing::error!(thread = %tid, log = %lid, error = %e, "getting local records failed");
                        failures.fetch_add(1, Ordering::SeqCst);
                        return;
                    }
                };

                let wire_records: Vec<proto::Record> =
                    records.iter().map(convert::record_to_wire).collect();
                if wire_log.is_none() && wire_records.is_empty() {
                    // Do not include empty logs the caller already knows.
                    return;
                }
                tracing::debug!(
                    thread = %tid,
                    log = %lid,
                    peer = %pid,
                    records = wire_records.len(),
                    "sending records in log to peer"
                );
                results.lock().await.push(proto::LogBatch {
                    log_id: lid.as_bytes().to_vec(),
                    records: wire_records,
                    log: wire_log,
                });
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if joined.is_err() {
                failures.fetch_add(1, Ordering::SeqCst);
            }
        }

        if failures.load(Ordering::SeqCst) == 0 {
            if let Some(registry) = &self.status {
                // The requester receiving our latest records is
                // equivalent to a successful push in the reverse
                // direction.
                registry.apply(pid, tid, ThreadStatus::UploadDone);
            }
        }

        let logs = std::mem::take(&mut *results.lock().await);
        Ok(proto::GetRecordsReply { logs })
    }

    /// `PushRecord`: accept one record for a known log, idempotently.
    pub async fn handle_push_record(
        self: &Arc<Self>,
        req: proto::PushRecordRequest,
    ) -> Result<proto::PushRecordReply, NetError> {
        let (pid, pk) = auth::verify_request(req.header.as_ref(), req.body.as_ref()).await?;
        let body = req
            .body
            .ok_or_else(|| NetError::InvalidArgument("bad request".into()))?;
        let tid = convert::thread_id(&body.thread_id)?;
        let lid = convert::peer_id(&body.log_id)?;
        self.peers.mark_seen(pid, pk);
        tracing::debug!(thread = %tid, log = %lid, peer = %pid, "received push record request");

        // A log is required to accept new records.
        let log_pub_key = self
            .store
            .log_pub_key(tid, lid)
            .await
            .map_err(NetError::internal)?
            .ok_or_else(|| NetError::NotFound("log not found".into()))?;

        // The log is known, so a service key must be present.
        let service_key = self
            .store
            .service_key(tid)
            .await
            .map_err(NetError::internal)?
            .ok_or_else(|| NetError::Internal("service key missing for known log".into()))?;

        let wire_record = body
            .record
            .as_ref()
            .ok_or_else(|| NetError::InvalidArgument("record is required".into()))?;
        let record = convert::record_from_wire(wire_record, &service_key)?;

        if self
            .store
            .is_known(record.cid())
            .await
            .map_err(NetError::internal)?
        {
            if let Some(registry) = &self.status {
                registry.apply(pid, tid, ThreadStatus::DownloadDone);
            }
            return Ok(proto::PushRecordReply {});
        }

        auth::verify_record(record.clone(), log_pub_key).await?;

        // Receiving and successfully processing a record is equivalent
        // to pulling from the peer; the terminal status is failure
        // until the insert lands.
        let mut guard = DownloadGuard::start(self.status.clone(), pid, tid);
        self.put_record(pid, tid, lid, record).await?;
        guard.succeed();

        Ok(proto::PushRecordReply {})
    }

    /// `ExchangeEdges`: compare the caller's edge fingerprints with
    /// ours per thread and schedule whatever reconciliation the
    /// difference calls for.
    pub async fn handle_exchange_edges(
        self: &Arc<Self>,
        req: proto::ExchangeEdgesRequest,
    ) -> Result<proto::ExchangeEdgesReply, NetError> {
        let (pid, pk) = auth::verify_request(req.header.as_ref(), req.body.as_ref()).await?;
        let body = req
            .body
            .ok_or_else(|| NetError::InvalidArgument("bad request".into()))?;
        self.peers.mark_seen(pid, pk);
        tracing::debug!(peer = %pid, threads = body.threads.len(), "received exchange edges request");

        let mut reply = proto::ExchangeEdgesReply::default();
        for entry in &body.threads {
            let tid = convert::thread_id(&entry.thread_id)?;
            match self.local_edges(tid).await? {
                LocalEdges::Both { addrs, heads } => {
                    if addrs != entry.addrs_edge
                        && self.schedule_update_logs(pid, tid, CallPriority::Low)
                    {
                        tracing::debug!(peer = %pid, thread = %tid, "log update for thread from peer scheduled");
                    }
                    if heads != entry.heads_edge {
                        if self.schedule_update_records(pid, tid, CallPriority::Low) {
                            tracing::debug!(peer = %pid, thread = %tid, "record update for thread from peer scheduled");
                        }
                    } else if let Some(registry) = &self.status {
                        // Equal heads read as a completed exchange in
                        // both directions.
                        registry.apply(pid, tid, ThreadStatus::DownloadDone);
                        registry.apply(pid, tid, ThreadStatus::UploadDone);
                    }
                    reply.edges.push(proto::ThreadEdgesStatus {
                        thread_id: entry.thread_id.clone(),
                        exists: true,
                        addrs_edge: addrs,
                        heads_edge: heads,
                    });
                }
                LocalEdges::NoAddrs => {
                    // The requested thread does not exist locally: fetch
                    // its logs and join its topic, ahead of ordinary
                    // updates.
                    tracing::debug!(peer = %pid, thread = %tid, "edges requested for unknown thread");
                    self.schedule_update_logs_and_subscribe(pid, tid);
                    reply.edges.push(proto::ThreadEdgesStatus {
                        thread_id: entry.thread_id.clone(),
                        exists: false,
                        addrs_edge: 0,
                        heads_edge: 0,
                    });
                }
                LocalEdges::NoHeads => {
                    // Thread known, addresses present, but no records
                    // yet: pull them.
                    self.schedule_update_records(pid, tid, CallPriority::Low);
                    reply.edges.push(proto::ThreadEdgesStatus {
                        thread_id: entry.thread_id.clone(),
                        exists: false,
                        addrs_edge: 0,
                        heads_edge: 0,
                    });
                }
            }
        }

        Ok(reply)
    }

    // ==================== Shared checks ====================

    /// Compare a supplied service key with the one stored for the
    /// thread: no local key is `NotFound`, anything but bytewise
    /// equality is `Unauthenticated`.
    pub(crate) async fn check_service_key(
        &self,
        tid: ThreadId,
        supplied: &[u8],
    ) -> Result<(), NetError> {
        if supplied.is_empty() {
            return Err(NetError::Unauthenticated(
                "a service key is required".into(),
            ));
        }
        let stored = self
            .store
            .service_key(tid)
            .await
            .map_err(NetError::internal)?
            .ok_or_else(|| NetError::NotFound("thread not found".into()))?;
        if stored.as_bytes() != supplied {
            return Err(NetError::Unauthenticated("invalid service key".into()));
        }
        Ok(())
    }

    /// Whether our heads differ from the offsets a caller supplied.
    async fn heads_changed(
        &self,
        tid: ThreadId,
        queries: &[proto::LogQuery],
    ) -> Result<bool, NetError> {
        let mut requested = Vec::with_capacity(queries.len());
        for query in queries {
            if let Some(head) = convert::opt_cid(&query.offset)? {
                requested.push(LogHead {
                    id: convert::peer_id(&query.log_id)?,
                    head,
                });
            }
        }
        match self.store.heads_edge(tid).await {
            Ok(edge) => Ok(heads_edge(&requested) != edge),
            // No local heads, but the reply may still carry log info
            // the caller is missing.
            Err(LogstoreError::ThreadNotFound) => Ok(true),
            Err(e) => Err(NetError::internal(e)),
        }
    }

    /// Local addrs/heads edges of a thread, with the two empty states
    /// kept distinct for `ExchangeEdges` branching.
    async fn local_edges(&self, tid: ThreadId) -> Result<LocalEdges, NetError> {
        let addrs = match self.store.addrs_edge(tid).await {
            Ok(edge) => edge,
            Err(LogstoreError::ThreadNotFound) => return Ok(LocalEdges::NoAddrs),
            Err(e) => {
                return Err(NetError::Internal(format!(
                    "address edge for {tid}: {e}"
                )))
            }
        };
        let heads = match self.store.heads_edge(tid).await {
            Ok(edge) => edge,
            Err(LogstoreError::ThreadNotFound) => return Ok(LocalEdges::NoHeads),
            Err(e) => return Err(NetError::Internal(format!("heads edge for {tid}: {e}"))),
        };
        Ok(LocalEdges::Both { addrs, heads })
    }
}
