//! Stream dispatch for incoming connections.
//!
//! Transport-agnostic: any accept loop (an in-memory harness or a QUIC
//! router shim) hands the two halves of a stream to `dispatch_stream`,
//! which frames request envelopes, runs the matching handler, and
//! writes a reply envelope carrying the status code.

use crate::error::NetError;
use crate::framing::{MessageSink, MessageStream};
use crate::net::Net;
use crate::proto;
use std::sync::Arc;
use strand_model::PeerId;
use strand_net_types::{BiStream, Connection, Transport};
use tokio::io::{AsyncRead, AsyncWrite};

/// Idle cutoff for a request stream.
const STREAM_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

impl<T: Transport> Net<T> {
    /// Accept connections from the transport until shutdown, spawning
    /// a handler per connection. Transports with their own router
    /// (e.g. iroh) skip this and call [`handle_connection`] directly.
    pub async fn run_accept_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                conn = self.transport.accept() => {
                    let Some(conn) = conn else { break };
                    let net = self.clone();
                    tokio::spawn(async move {
                        handle_connection(net, conn).await;
                    });
                }
            }
        }
    }

    /// Route one request envelope to its handler and wrap the outcome.
    pub(crate) async fn dispatch(self: &Arc<Self>, req: proto::RpcRequest) -> proto::RpcReply {
        use proto::rpc_reply::Reply;
        use proto::rpc_request::Request;

        let Some(request) = req.request else {
            return error_reply(&NetError::InvalidArgument("empty request".into()));
        };
        match request {
            Request::GetLogs(r) => wrap(self.handle_get_logs(r).await, Reply::GetLogs),
            Request::PushLog(r) => wrap(self.handle_push_log(r).await, Reply::PushLog),
            Request::GetRecords(r) => wrap(self.handle_get_records(r).await, Reply::GetRecords),
            Request::PushRecord(r) => wrap(self.handle_push_record(r).await, Reply::PushRecord),
            Request::ExchangeEdges(r) => {
                wrap(self.handle_exchange_edges(r).await, Reply::ExchangeEdges)
            }
        }
    }
}

fn wrap<R>(
    result: Result<R, NetError>,
    into_reply: impl FnOnce(R) -> proto::rpc_reply::Reply,
) -> proto::RpcReply {
    match result {
        Ok(reply) => proto::RpcReply {
            code: proto::RpcCode::Ok as i32,
            message: String::new(),
            reply: Some(into_reply(reply)),
        },
        Err(e) => error_reply(&e),
    }
}

fn error_reply(err: &NetError) -> proto::RpcReply {
    proto::RpcReply {
        code: err.code() as i32,
        message: err.to_string(),
        reply: None,
    }
}

/// Serve one inbound connection: keep accepting streams and dispatch
/// each on its own task.
pub async fn handle_connection<T: Transport>(net: Arc<Net<T>>, conn: T::Connection) {
    let remote = conn.remote_public_key();
    tracing::debug!(peer = %PeerId::from_pub_key(&remote), "incoming connection");

    loop {
        match conn.open_bi().await {
            Ok(stream) => {
                let (send, recv) = stream.into_split();
                let net = net.clone();
                tokio::spawn(async move {
                    if let Err(e) = dispatch_stream(net, send, recv).await {
                        tracing::debug!(error = %e, "stream handler ended");
                    }
                });
            }
            Err(e) => {
                tracing::debug!(error = %e, "connection closed");
                break;
            }
        }
    }
}

/// Serve one request stream until it closes or idles out. Returns the
/// writer for transport-specific finalization.
pub async fn dispatch_stream<T, W, R>(
    net: Arc<Net<T>>,
    send: W,
    recv: R,
) -> Result<W, NetError>
where
    T: Transport,
    W: AsyncWrite + Send + Unpin,
    R: AsyncRead + Send + Unpin,
{
    let mut sink: MessageSink<W, proto::RpcReply> = MessageSink::new(send);
    let mut stream: MessageStream<R, proto::RpcRequest> = MessageStream::new(recv);

    loop {
        let request = match tokio::time::timeout(STREAM_TIMEOUT, stream.recv()).await {
            Ok(Ok(Some(request))) => request,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "stream recv failed");
                break;
            }
            Err(_) => {
                tracing::debug!("stream idle timeout");
                break;
            }
        };
        let reply = net.dispatch(request).await;
        sink.send(&reply).await?;
    }

    Ok(sink.into_inner())
}
