//! Iroh router protocol handler.
//!
//! Accepts connections on the strand ALPN and delegates each stream to
//! the transport-agnostic dispatch in `strand-net`.

use crate::transport::{IrohTransport, STRAND_ALPN};
use iroh::endpoint::Connection;
use iroh::protocol::{AcceptError, ProtocolHandler, Router};
use std::sync::Arc;
use strand_model::PubKey;
use strand_net::Net;

/// Protocol handler for [`STRAND_ALPN`], used with iroh's `Router`.
pub struct SyncProtocol {
    net: Arc<Net<IrohTransport>>,
}

impl SyncProtocol {
    pub fn new(net: Arc<Net<IrohTransport>>) -> Self {
        Self { net }
    }
}

impl std::fmt::Debug for SyncProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncProtocol").finish()
    }
}

impl ProtocolHandler for SyncProtocol {
    fn accept(
        &self,
        conn: Connection,
    ) -> impl std::future::Future<Output = Result<(), AcceptError>> + Send {
        let net = self.net.clone();
        Box::pin(async move {
            handle_connection(net, conn).await;
            Ok(())
        })
    }
}

/// Spawn a router serving sync and gossip for this node.
pub fn spawn_router(
    net: Arc<Net<IrohTransport>>,
    transport: &IrohTransport,
    pubsub: Option<&crate::IrohPubsub>,
) -> Router {
    let mut builder = Router::builder(transport.endpoint().clone())
        .accept(STRAND_ALPN, SyncProtocol::new(net));
    if let Some(pubsub) = pubsub {
        builder = builder.accept(iroh_gossip::ALPN, pubsub.gossip().clone());
    }
    builder.spawn()
}

/// Serve one inbound iroh connection: keep accepting streams, dispatch
/// each, and finish the QUIC send stream when the handler is done.
pub async fn handle_connection(net: Arc<Net<IrohTransport>>, conn: Connection) {
    let remote = PubKey::from(
        *conn
            .remote_node_id()
            .expect("connected peer presents a node id")
            .as_bytes(),
    );
    tracing::debug!(peer = %remote, "incoming iroh connection");

    loop {
        match conn.accept_bi().await {
            Ok((send, recv)) => {
                let net = net.clone();
                tokio::spawn(async move {
                    match strand_net::dispatch_stream(net, send, recv).await {
                        Ok(mut send_stream) => {
                            if let Err(e) = send_stream.finish() {
                                tracing::debug!(error = %e, "stream finish failed");
                            }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "stream handler failed");
                        }
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
