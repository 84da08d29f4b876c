//! Outbound sync calls.
//!
//! Each call dials the peer, opens a stream, sends one signed request
//! envelope, and reads one reply envelope, mapping the wire status
//! code back into an error. Background operations resolve a verified
//! caller id to its public key through the peer registry before
//! dialing.

use crate::auth;
use crate::convert;
use crate::error::NetError;
use crate::framing::{MessageSink, MessageStream};
use crate::net::Net;
use crate::proto;
use crate::status::ThreadStatus;
use strand_model::{LogInfo, PeerId, PubKey, Record, ThreadId};
use strand_net_types::{BiStream, Connection, Transport};

/// Cutoff for one request/reply exchange.
const RPC_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

impl<T: Transport> Net<T> {
    fn resolve(&self, peer: PeerId) -> Result<PubKey, NetError> {
        self.peers
            .pub_key(peer)
            .ok_or_else(|| NetError::NotFound("peer address unknown".into()))
    }

    async fn rpc(
        &self,
        peer: &PubKey,
        request: proto::RpcRequest,
    ) -> Result<proto::rpc_reply::Reply, NetError> {
        let conn = self.transport.connect(peer).await?;
        let stream = conn.open_bi().await?;
        let (send, recv) = stream.into_split();
        let mut sink: MessageSink<_, proto::RpcRequest> = MessageSink::new(send);
        let mut stream: MessageStream<_, proto::RpcReply> = MessageStream::new(recv);

        sink.send(&request).await?;
        let reply = tokio::time::timeout(RPC_TIMEOUT, stream.recv())
            .await
            .map_err(|_| NetError::Internal("rpc timed out".into()))??
            .ok_or_else(|| NetError::Internal("peer closed stream".into()))?;

        let code = proto::RpcCode::try_from(reply.code)
            .map_err(|_| NetError::Internal(format!("unknown status code {}", reply.code)))?;
        if code != proto::RpcCode::Ok {
            return Err(NetError::from_code(code, reply.message));
        }
        reply
            .reply
            .ok_or_else(|| NetError::Internal("empty reply".into()))
    }

    /// `GetLogs` from a verified caller we have seen before.
    pub async fn get_logs_from(
        &self,
        peer: PeerId,
        tid: ThreadId,
    ) -> Result<Vec<LogInfo>, NetError> {
        let peer_key = self.resolve(peer)?;
        let service_key = self
            .store
            .service_key(tid)
            .await
            .map_err(NetError::internal)?
            .ok_or_else(|| NetError::NotFound("thread not found".into()))?;

        let body = proto::GetLogsBody {
            thread_id: tid.as_bytes().to_vec(),
            service_key: service_key.as_bytes().to_vec(),
        };
        let request = proto::RpcRequest {
            request: Some(proto::rpc_request::Request::GetLogs(proto::GetLogsRequest {
                header: Some(auth::sign_request(&self.identity, &body)),
                body: Some(body),
            })),
        };

        match self.rpc(&peer_key, request).await? {
            proto::rpc_reply::Reply::GetLogs(reply) => {
                reply.logs.iter().map(convert::log_from_wire).collect()
            }
            _ => Err(NetError::Internal("unexpected reply type".into())),
        }
    }

    /// `GetRecords` from a verified caller we have seen before.
    pub(crate) async fn get_records_from(
        &self,
        peer: PeerId,
        tid: ThreadId,
        service_key: &strand_model::Key,
        queries: Vec<proto::LogQuery>,
    ) -> Result<proto::GetRecordsReply, NetError> {
        let peer_key = self.resolve(peer)?;
        let body = proto::GetRecordsBody {
            thread_id: tid.as_bytes().to_vec(),
            service_key: service_key.as_bytes().to_vec(),
            logs: queries,
        };
        let request = proto::RpcRequest {
            request: Some(proto::rpc_request::Request::GetRecords(
                proto::GetRecordsRequest {
                    header: Some(auth::sign_request(&self.identity, &body)),
                    body: Some(body),
                },
            )),
        };

        match self.rpc(&peer_key, request).await? {
            proto::rpc_reply::Reply::GetRecords(reply) => Ok(reply),
            _ => Err(NetError::Internal("unexpected reply type".into())),
        }
    }

    /// Push a log descriptor to a peer, inviting it to the thread:
    /// locally held key material rides along for uptake.
    pub async fn push_log_to(
        &self,
        peer: PubKey,
        tid: ThreadId,
        log: LogInfo,
    ) -> Result<(), NetError> {
        let service_key = self
            .store
            .service_key(tid)
            .await
            .map_err(NetError::internal)?;
        let read_key = self.store.read_key(tid).await.map_err(NetError::internal)?;

        let body = proto::PushLogBody {
            thread_id: tid.as_bytes().to_vec(),
            log: Some(convert::log_to_wire(&log)),
            service_key: service_key.map(|k| k.as_bytes().to_vec()).unwrap_or_default(),
            read_key: read_key.map(|k| k.as_bytes().to_vec()).unwrap_or_default(),
        };
        let request = proto::RpcRequest {
            request: Some(proto::rpc_request::Request::PushLog(proto::PushLogRequest {
                header: Some(auth::sign_request(&self.identity, &body)),
                body: Some(body),
            })),
        };

        match self.rpc(&peer, request).await? {
            proto::rpc_reply::Reply::PushLog(_) => Ok(()),
            _ => Err(NetError::Internal("unexpected reply type".into())),
        }
    }

    /// Push a single record to a peer.
    pub async fn push_record_to(
        &self,
        peer: PubKey,
        tid: ThreadId,
        lid: PeerId,
        record: &Record,
    ) -> Result<(), NetError> {
        let body = proto::PushRecordBody {
            thread_id: tid.as_bytes().to_vec(),
            log_id: lid.as_bytes().to_vec(),
            record: Some(convert::record_to_wire(record)),
        };
        let request = proto::RpcRequest {
            request: Some(proto::rpc_request::Request::PushRecord(
                proto::PushRecordRequest {
                    header: Some(auth::sign_request(&self.identity, &body)),
                    body: Some(body),
                },
            )),
        };

        let peer_id = PeerId::from_pub_key(&peer);
        if let Some(registry) = &self.status {
            registry.apply(peer_id, tid, ThreadStatus::UploadStarted);
        }
        let result = match self.rpc(&peer, request).await {
            Ok(proto::rpc_reply::Reply::PushRecord(_)) => Ok(()),
            Ok(_) => Err(NetError::Internal("unexpected reply type".into())),
            Err(e) => Err(e),
        };
        if let Some(registry) = &self.status {
            let terminal = if result.is_ok() {
                ThreadStatus::UploadDone
            } else {
                ThreadStatus::UploadFailed
            };
            registry.apply(peer_id, tid, terminal);
        }
        result
    }

    /// Exchange edge fingerprints for a set of threads with a peer.
    pub async fn exchange_edges_with(
        &self,
        peer: PubKey,
        threads: &[ThreadId],
    ) -> Result<proto::ExchangeEdgesReply, NetError> {
        let mut entries = Vec::with_capacity(threads.len());
        for tid in threads {
            // A thread with nothing to fingerprint yet reports zero;
            // any peer holding data will see a mismatch and reconcile.
            let addrs_edge = self.store.addrs_edge(*tid).await.unwrap_or(0);
            let heads_edge = self.store.heads_edge(*tid).await.unwrap_or(0);
            entries.push(proto::ThreadEdges {
                thread_id: tid.as_bytes().to_vec(),
                addrs_edge,
                heads_edge,
            });
        }

        let body = proto::ExchangeEdgesBody { threads: entries };
        let request = proto::RpcRequest {
            request: Some(proto::rpc_request::Request::ExchangeEdges(
                proto::ExchangeEdgesRequest {
                    header: Some(auth::sign_request(&self.identity, &body)),
                    body: Some(body),
                },
            )),
        };

        match self.rpc(&peer, request).await? {
            proto::rpc_reply::Reply::ExchangeEdges(reply) => Ok(reply),
            _ => Err(NetError::Internal("unexpected reply type".into())),
        }
    }
}
