//! BroadcastPubsub: in-memory `PubsubLayer` implementation.
//!
//! A shared `PubsubNetwork` broker holds one `tokio::sync::broadcast`
//! channel per thread topic; every subscribed node shares it, so
//! publishing is all-to-all. Published messages echo back to the
//! publisher, who is expected to skip its own.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use strand_model::{PubKey, ThreadId};
use strand_net_types::{PubsubError, PubsubLayer};
use tokio::sync::{broadcast, Mutex, RwLock};

const TOPIC_CAPACITY: usize = 256;

/// Shared fabric connecting `BroadcastPubsub` instances.
#[derive(Clone, Default)]
pub struct PubsubNetwork {
    topics: Arc<RwLock<HashMap<ThreadId, broadcast::Sender<(PubKey, Vec<u8>)>>>>,
}

impl PubsubNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get_or_create(&self, tid: ThreadId) -> broadcast::Sender<(PubKey, Vec<u8>)> {
        let mut topics = self.topics.write().await;
        topics
            .entry(tid)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

/// One node's handle on the in-memory pubsub fabric.
pub struct BroadcastPubsub {
    pub_key: PubKey,
    network: PubsubNetwork,
    joined: Mutex<HashMap<ThreadId, broadcast::Sender<(PubKey, Vec<u8>)>>>,
}

impl BroadcastPubsub {
    pub fn new(pub_key: PubKey, network: &PubsubNetwork) -> Self {
        Self {
            pub_key,
            network: network.clone(),
            joined: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PubsubLayer for BroadcastPubsub {
    async fn subscribe(
        &self,
        tid: ThreadId,
    ) -> Result<broadcast::Receiver<(PubKey, Vec<u8>)>, PubsubError> {
        let sender = self.network.get_or_create(tid).await;
        let receiver = sender.subscribe();
        self.joined.lock().await.insert(tid, sender);
        Ok(receiver)
    }

    async fn publish(&self, tid: ThreadId, data: Vec<u8>) -> Result<(), PubsubError> {
        let joined = self.joined.lock().await;
        let sender = joined
            .get(&tid)
            .ok_or_else(|| PubsubError::Publish(format!("not subscribed to {tid}")))?;
        // Send errors only mean nobody is listening right now.
        let _ = sender.send((self.pub_key, data));
        Ok(())
    }

    async fn unsubscribe(&self, tid: ThreadId) {
        self.joined.lock().await.remove(&tid);
    }

    async fn shutdown(&self) {
        self.joined.lock().await.clear();
    }
}
