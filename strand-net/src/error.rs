//! Error types for the replication core.

use crate::proto::RpcCode;
use strand_net_types::TransportError;
use thiserror::Error;

/// Network layer errors.
///
/// The first four variants map one-to-one onto the canonical wire
/// status codes; everything else surfaces as `Internal` when it has to
/// cross the wire.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl NetError {
    /// The wire status code this error is reported as.
    pub fn code(&self) -> RpcCode {
        match self {
            NetError::InvalidArgument(_) => RpcCode::InvalidArgument,
            NetError::NotFound(_) => RpcCode::NotFound,
            NetError::Unauthenticated(_) => RpcCode::Unauthenticated,
            NetError::Internal(_)
            | NetError::Transport(_)
            | NetError::Io(_)
            | NetError::Decode(_) => RpcCode::Internal,
        }
    }

    /// Rebuild an error from a reply's status code and message.
    pub fn from_code(code: RpcCode, message: String) -> Self {
        match code {
            RpcCode::InvalidArgument => NetError::InvalidArgument(message),
            RpcCode::NotFound => NetError::NotFound(message),
            RpcCode::Unauthenticated => NetError::Unauthenticated(message),
            RpcCode::Internal | RpcCode::Ok => NetError::Internal(message),
        }
    }

    /// Local storage failures surface as `Internal`.
    pub(crate) fn internal(err: impl std::fmt::Display) -> Self {
        NetError::Internal(err.to_string())
    }
}
