//! Message framing for stream transports.
//!
//! Length-delimited prost messages over any `AsyncWrite`/`AsyncRead`
//! pair, decoupled from the concrete transport. Requests and replies
//! are distinct top-level messages, so both wrappers are generic over
//! the message type they carry.

use crate::error::NetError;
use futures_util::{SinkExt, StreamExt};
use std::marker::PhantomData;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// Framed writer for sending one message type over a stream.
pub struct MessageSink<W: AsyncWrite + Send + Unpin, M> {
    inner: FramedWrite<W, LengthDelimitedCodec>,
    _msg: PhantomData<M>,
}

impl<W: AsyncWrite + Send + Unpin, M: prost::Message> MessageSink<W, M> {
    pub fn new(stream: W) -> Self {
        Self {
            inner: FramedWrite::new(stream, LengthDelimitedCodec::new()),
            _msg: PhantomData,
        }
    }

    /// Send a message, length-prefixed.
    pub async fn send(&mut self, msg: &M) -> Result<(), NetError> {
        let bytes = msg.encode_to_vec();
        self.inner
            .send(bytes.into())
            .await
            .map_err(NetError::from)
    }

    /// Consume the sink and return the underlying writer, for
    /// transport-specific finalization (e.g. a QUIC `finish()`).
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

/// Framed reader for receiving one message type from a stream.
pub struct MessageStream<R: AsyncRead + Send + Unpin, M> {
    inner: FramedRead<R, LengthDelimitedCodec>,
    _msg: PhantomData<M>,
}

impl<R: AsyncRead + Send + Unpin, M: prost::Message + Default> MessageStream<R, M> {
    pub fn new(stream: R) -> Self {
        Self {
            inner: FramedRead::new(stream, LengthDelimitedCodec::new()),
            _msg: PhantomData,
        }
    }

    /// Receive the next message, or `None` once the stream closes.
    pub async fn recv(&mut self) -> Result<Option<M>, NetError> {
        match self.inner.next().await {
            Some(Ok(bytes)) => M::decode(&bytes[..]).map(Some).map_err(NetError::from),
            Some(Err(e)) => Err(NetError::from(e)),
            None => Ok(None),
        }
    }
}
