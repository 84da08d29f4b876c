//! Iroh transport.
//!
//! Creates an iroh endpoint from the node's Ed25519 secret key, so the
//! same identity backs the QUIC connection and every signed request.
//! Discovery: static provider (direct peer addition, useful in tests),
//! mDNS (local network), and DNS (internet).

use iroh::discovery::dns::DnsDiscovery;
use iroh::discovery::mdns::MdnsDiscovery;
use iroh::discovery::static_provider::StaticProvider;
use iroh::endpoint::BindError;
use iroh::Endpoint;
pub use iroh::PublicKey;

use strand_model::types::PubKey;
use strand_net_types::{BiStream, Connection as TransportConnection, Transport, TransportError};

/// ALPN protocol identifier for strand sync.
pub const STRAND_ALPN: &[u8] = b"strand-sync/1";

/// Wrapper around an iroh endpoint bound to the node identity.
#[derive(Clone)]
pub struct IrohTransport {
    endpoint: Endpoint,
    /// For adding peer addresses directly, bypassing discovery.
    static_discovery: StaticProvider,
}

impl std::fmt::Debug for IrohTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrohTransport")
            .field("public_key", &self.endpoint.secret_key().public())
            .finish()
    }
}

impl IrohTransport {
    /// Bind an endpoint on the node's signing key.
    pub async fn new(signing_key: &ed25519_dalek::SigningKey) -> Result<Self, BindError> {
        let secret_key = iroh::SecretKey::from(signing_key.to_bytes());

        let static_discovery = StaticProvider::new();
        let mdns = MdnsDiscovery::builder();
        let dns = DnsDiscovery::n0_dns();

        let endpoint = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(vec![STRAND_ALPN.to_vec(), iroh_gossip::ALPN.to_vec()])
            .discovery(static_discovery.clone())
            .discovery(mdns)
            .discovery(dns)
            .bind()
            .await?;

        Ok(Self {
            endpoint,
            static_discovery,
        })
    }

    /// The underlying endpoint, for router and gossip wiring.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// This endpoint's address info, for out-of-band sharing.
    pub async fn addr(&self) -> iroh::NodeAddr {
        use iroh::Watcher;
        self.endpoint.node_addr().initialized().await
    }

    /// Add a peer's address directly, bypassing discovery.
    pub fn add_peer_addr(&self, addr: iroh::NodeAddr) {
        self.static_discovery.add_node_info(addr);
    }
}

impl Transport for IrohTransport {
    type Connection = IrohConnection;

    fn public_key(&self) -> PubKey {
        PubKey::from(*self.endpoint.secret_key().public().as_bytes())
    }

    fn connect(
        &self,
        peer: &PubKey,
    ) -> impl std::future::Future<Output = Result<Self::Connection, TransportError>> + Send {
        let endpoint = self.endpoint.clone();
        let peer = *peer;
        async move {
            let peer_id = PublicKey::from_bytes(peer.as_bytes())
                .map_err(|e| TransportError::Connect(format!("invalid peer key: {e}")))?;
            let inner = endpoint
                .connect(peer_id, STRAND_ALPN)
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            Ok(IrohConnection { inner })
        }
    }

    fn accept(&self) -> impl std::future::Future<Output = Option<Self::Connection>> + Send {
        let endpoint = self.endpoint.clone();
        async move {
            loop {
                let incoming = endpoint.accept().await?;
                match incoming.await {
                    Ok(inner) => return Some(IrohConnection { inner }),
                    Err(e) => {
                        tracing::debug!(error = %e, "incoming connection failed");
                        continue;
                    }
                }
            }
        }
    }
}

/// Adapter: iroh bi-stream → `BiStream`.
pub struct IrohBiStream {
    pub send: iroh::endpoint::SendStream,
    pub recv: iroh::endpoint::RecvStream,
}

impl BiStream for IrohBiStream {
    type SendStream = iroh::endpoint::SendStream;
    type RecvStream = iroh::endpoint::RecvStream;

    fn into_split(self) -> (Self::SendStream, Self::RecvStream) {
        (self.send, self.recv)
    }
}

/// Adapter: iroh connection → `Connection`.
pub struct IrohConnection {
    pub inner: iroh::endpoint::Connection,
}

impl TransportConnection for IrohConnection {
    type Stream = IrohBiStream;

    fn open_bi(
        &self,
    ) -> impl std::future::Future<Output = Result<Self::Stream, TransportError>> + Send {
        let inner = self.inner.clone();
        async move {
            let (send, recv) = inner
                .open_bi()
                .await
                .map_err(|e| TransportError::Stream(e.to_string()))?;
            Ok(IrohBiStream { send, recv })
        }
    }

    fn remote_public_key(&self) -> PubKey {
        PubKey::from(
            *self
                .inner
                .remote_node_id()
                .expect("connected peer presents a node id")
                .as_bytes(),
        )
    }
}
