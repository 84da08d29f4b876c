//! Transport abstraction for strand networking.
//!
//! Decouples the sync path from any concrete QUIC stack. Production
//! uses the iroh-backed transport; tests run over in-memory channels.
//! Identity is the Ed25519 public key: connecting to a peer means
//! connecting to whoever holds the matching secret.

use std::fmt;
use strand_model::PubKey;

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("accept failed: {0}")]
    Accept(String),

    #[error("stream failed: {0}")]
    Stream(String),
}

/// A bidirectional byte stream (send + receive half).
///
/// Both halves must be independently usable; the framing layer wraps
/// them in length-delimited message codecs.
pub trait BiStream: Send + 'static {
    type SendStream: tokio::io::AsyncWrite + Send + Unpin;
    type RecvStream: tokio::io::AsyncRead + Send + Unpin;

    /// Split into send and receive halves.
    fn into_split(self) -> (Self::SendStream, Self::RecvStream);
}

/// A connection to a remote peer that can open bidirectional streams.
pub trait Connection: Send + Sync + 'static {
    type Stream: BiStream;

    /// Open the next bidirectional stream on this connection.
    fn open_bi(
        &self,
    ) -> impl std::future::Future<Output = Result<Self::Stream, TransportError>> + Send;

    /// The remote peer's public key.
    fn remote_public_key(&self) -> PubKey;
}

/// Transport layer abstraction: peer identity, outbound dials, and
/// inbound connection acceptance.
pub trait Transport: Send + Sync + fmt::Debug + 'static {
    type Connection: Connection;

    /// This node's public key.
    fn public_key(&self) -> PubKey;

    /// Connect to a remote peer by public key.
    fn connect(
        &self,
        peer: &PubKey,
    ) -> impl std::future::Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// Accept an incoming connection; `None` means the transport shut
    /// down.
    fn accept(&self) -> impl std::future::Future<Output = Option<Self::Connection>> + Send;
}
