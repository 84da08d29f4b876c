//! Error types for logstore operations.

use thiserror::Error;

/// Failure modes of the logstore facade.
#[derive(Debug, Error)]
pub enum LogstoreError {
    /// The thread is unknown, or the queried aspect of it is empty
    /// (both edge computations report this when their underlying set
    /// holds nothing to fingerprint).
    #[error("thread not found")]
    ThreadNotFound,

    #[error("log not found")]
    LogNotFound,

    /// A records query named an offset that is not on the local chain;
    /// the caller holds records we do not.
    #[error("offset not found in log")]
    OffsetMissing,

    /// A record neither extends the current head nor is already known.
    #[error("record does not extend the log head")]
    HeadMismatch,

    #[error("storage failure: {0}")]
    Storage(String),
}
