//! ChannelTransport: in-memory `Transport` implementation.
//!
//! `tokio::io::DuplexStream` provides the bidirectional byte streams;
//! a shared `ChannelNetwork` broker routes connections between
//! transports by public key. Enables multi-node sync tests without any
//! sockets.

use std::collections::HashMap;
use std::sync::Arc;
use strand_model::PubKey;
use strand_net_types::{BiStream, Connection, Transport, TransportError};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex};

const DUPLEX_BUF_SIZE: usize = 64 * 1024;

/// Shared broker routing connections between transports.
#[derive(Clone, Default)]
pub struct ChannelNetwork {
    peers: Arc<Mutex<HashMap<PubKey, mpsc::Sender<ChannelConnection>>>>,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, pub_key: PubKey, accept_tx: mpsc::Sender<ChannelConnection>) {
        self.peers.lock().await.insert(pub_key, accept_tx);
    }
}

/// In-memory transport bound to one node's public key.
#[derive(Clone)]
pub struct ChannelTransport {
    pub_key: PubKey,
    network: ChannelNetwork,
    accept_rx: Arc<Mutex<mpsc::Receiver<ChannelConnection>>>,
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("pub_key", &self.pub_key)
            .finish()
    }
}

impl ChannelTransport {
    pub async fn new(pub_key: PubKey, network: &ChannelNetwork) -> Self {
        let (accept_tx, accept_rx) = mpsc::channel(64);
        network.register(pub_key, accept_tx).await;
        Self {
            pub_key,
            network: network.clone(),
            accept_rx: Arc::new(Mutex::new(accept_rx)),
        }
    }
}

impl Transport for ChannelTransport {
    type Connection = ChannelConnection;

    fn public_key(&self) -> PubKey {
        self.pub_key
    }

    fn connect(
        &self,
        peer: &PubKey,
    ) -> impl std::future::Future<Output = Result<Self::Connection, TransportError>> + Send {
        let network = self.network.clone();
        let local = self.pub_key;
        let remote = *peer;

        async move {
            let accept_tx = {
                let peers = network.peers.lock().await;
                peers
                    .get(&remote)
                    .ok_or_else(|| {
                        TransportError::Connect(format!("peer {remote} not found in network"))
                    })?
                    .clone()
            };

            // The initiator pushes one duplex end per opened stream.
            let (stream_tx, stream_rx) = mpsc::channel::<DuplexStream>(8);

            accept_tx
                .send(ChannelConnection {
                    remote: local,
                    role: Role::Responder(Arc::new(Mutex::new(stream_rx))),
                })
                .await
                .map_err(|_| {
                    TransportError::Connect(format!("peer {remote} accept channel closed"))
                })?;

            Ok(ChannelConnection {
                remote,
                role: Role::Initiator(stream_tx),
            })
        }
    }

    fn accept(&self) -> impl std::future::Future<Output = Option<Self::Connection>> + Send {
        let accept_rx = self.accept_rx.clone();
        async move { accept_rx.lock().await.recv().await }
    }
}

enum Role {
    /// Creates duplex pairs and hands one end to the peer.
    Initiator(mpsc::Sender<DuplexStream>),
    /// Receives duplex ends from the initiator.
    Responder(Arc<Mutex<mpsc::Receiver<DuplexStream>>>),
}

/// In-memory connection between two transports.
pub struct ChannelConnection {
    remote: PubKey,
    role: Role,
}

impl std::fmt::Debug for ChannelConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("remote", &self.remote)
            .finish()
    }
}

impl Connection for ChannelConnection {
    type Stream = ChannelBiStream;

    fn open_bi(
        &self,
    ) -> impl std::future::Future<Output = Result<Self::Stream, TransportError>> + Send {
        let role = match &self.role {
            Role::Initiator(tx) => Role::Initiator(tx.clone()),
            Role::Responder(rx) => Role::Responder(rx.clone()),
        };
        async move {
            let stream = match role {
                Role::Initiator(tx) => {
                    let (local, peer) = tokio::io::duplex(DUPLEX_BUF_SIZE);
                    tx.send(peer).await.map_err(|_| {
                        TransportError::Stream("connection closed by peer".into())
                    })?;
                    local
                }
                Role::Responder(rx) => rx
                    .lock()
                    .await
                    .recv()
                    .await
                    .ok_or_else(|| TransportError::Stream("connection closed by peer".into()))?,
            };
            let (recv, send) = tokio::io::split(stream);
            Ok(ChannelBiStream { send, recv })
        }
    }

    fn remote_public_key(&self) -> PubKey {
        self.remote
    }
}

/// Split halves of one in-memory stream.
pub struct ChannelBiStream {
    send: WriteHalf<DuplexStream>,
    recv: ReadHalf<DuplexStream>,
}

impl BiStream for ChannelBiStream {
    type SendStream = WriteHalf<DuplexStream>;
    type RecvStream = ReadHalf<DuplexStream>;

    fn into_split(self) -> (Self::SendStream, Self::RecvStream) {
        (self.send, self.recv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn connect_accept_exchange() {
        let network = ChannelNetwork::new();
        let a_key = PubKey([1; 32]);
        let b_key = PubKey([2; 32]);
        let a = ChannelTransport::new(a_key, &network).await;
        let b = ChannelTransport::new(b_key, &network).await;

        let conn_a = a.connect(&b_key).await.unwrap();
        let conn_b = b.accept().await.unwrap();
        assert_eq!(conn_a.remote_public_key(), b_key);
        assert_eq!(conn_b.remote_public_key(), a_key);

        let (mut send_a, _recv_a) = conn_a.open_bi().await.unwrap().into_split();
        let (_send_b, mut recv_b) = conn_b.open_bi().await.unwrap().into_split();

        send_a.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        recv_b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn connect_to_unknown_peer_fails() {
        let network = ChannelNetwork::new();
        let a = ChannelTransport::new(PubKey([1; 32]), &network).await;
        let err = a.connect(&PubKey([9; 32])).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
