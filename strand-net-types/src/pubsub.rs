//! Pubsub layer abstraction.
//!
//! One topic per thread, raw bytes on the wire. Protocol-level
//! concerns (what the bytes mean, signature checks, idempotence) stay
//! in the network core; implementations only move bytes between
//! subscribers of a topic.

use async_trait::async_trait;
use strand_model::{PubKey, ThreadId};
use tokio::sync::broadcast;

/// Error type for pubsub operations.
#[derive(Debug, thiserror::Error)]
pub enum PubsubError {
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("publish failed: {0}")]
    Publish(String),
}

/// A pubsub fabric with one topic per thread id.
#[async_trait]
pub trait PubsubLayer: Send + Sync {
    /// Join the topic for a thread. Delivered items carry the sender's
    /// public key; a node's own messages may or may not be echoed back,
    /// subscribers must skip them.
    async fn subscribe(
        &self,
        tid: ThreadId,
    ) -> Result<broadcast::Receiver<(PubKey, Vec<u8>)>, PubsubError>;

    /// Publish bytes to a thread's topic.
    async fn publish(&self, tid: ThreadId, data: Vec<u8>) -> Result<(), PubsubError>;

    /// Leave a thread's topic.
    async fn unsubscribe(&self, tid: ThreadId);

    /// Tear down all subscriptions.
    async fn shutdown(&self);
}
