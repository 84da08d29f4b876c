//! Iroh-gossip pubsub.
//!
//! Thin `PubsubLayer` implementation over `iroh_gossip::Gossip`: one
//! topic per thread, raw bytes only. What the bytes mean and whether a
//! sender is trusted stays in the network core.

use async_trait::async_trait;
use iroh_gossip::api::GossipSender;
use iroh_gossip::net::Gossip;
use std::collections::HashMap;
use std::sync::Arc;
use strand_model::{PubKey, ThreadId};
use strand_net_types::{PubsubError, PubsubLayer};
use tokio::sync::{broadcast, RwLock};

/// Derive the gossip topic of a thread.
pub fn topic_for_thread(tid: ThreadId) -> iroh_gossip::proto::TopicId {
    iroh_gossip::proto::TopicId::from_bytes(
        *blake3::hash(format!("strand/{tid}").as_bytes()).as_bytes(),
    )
}

/// `PubsubLayer` over iroh-gossip.
pub struct IrohPubsub {
    gossip: Gossip,
    senders: Arc<RwLock<HashMap<ThreadId, GossipSender>>>,
}

impl IrohPubsub {
    pub fn new(transport: &crate::IrohTransport) -> Self {
        Self {
            gossip: Gossip::builder().spawn(transport.endpoint().clone()),
            senders: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The gossip instance, for router registration.
    pub fn gossip(&self) -> &Gossip {
        &self.gossip
    }

    /// Introduce known peers into a thread's swarm. Gossip needs at
    /// least one neighbor before messages propagate; the embedder
    /// feeds it whatever peers it learned out of band.
    pub async fn join_peers(&self, tid: ThreadId, peers: Vec<PubKey>) -> Result<(), PubsubError> {
        let senders = self.senders.read().await;
        if let Some(sender) = senders.get(&tid) {
            let iroh_peers: Vec<iroh::PublicKey> = peers
                .iter()
                .filter_map(|p| iroh::PublicKey::from_bytes(p.as_bytes()).ok())
                .collect();
            if !iroh_peers.is_empty() {
                sender
                    .join_peers(iroh_peers)
                    .await
                    .map_err(|e| PubsubError::Subscribe(e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PubsubLayer for IrohPubsub {
    async fn subscribe(
        &self,
        tid: ThreadId,
    ) -> Result<broadcast::Receiver<(PubKey, Vec<u8>)>, PubsubError> {
        let topic = topic_for_thread(tid);
        let gossip_topic = self
            .gossip
            .subscribe(topic, Vec::new())
            .await
            .map_err(|e| PubsubError::Subscribe(e.to_string()))?;

        let (sender, mut receiver) = gossip_topic.split();
        self.senders.write().await.insert(tid, sender);

        let (inbound_tx, inbound_rx) = broadcast::channel(256);
        tokio::spawn(async move {
            use futures_util::StreamExt;
            while let Some(Ok(event)) = receiver.next().await {
                match event {
                    iroh_gossip::api::Event::Received(msg) => {
                        let from = PubKey::from(*msg.delivered_from.as_bytes());
                        let _ = inbound_tx.send((from, msg.content.to_vec()));
                    }
                    iroh_gossip::api::Event::Lagged => {
                        tracing::warn!(thread = %tid, "gossip receiver lagged");
                    }
                    _ => {}
                }
            }
            tracing::debug!(thread = %tid, "gossip receiver ended");
        });

        Ok(inbound_rx)
    }

    async fn publish(&self, tid: ThreadId, data: Vec<u8>) -> Result<(), PubsubError> {
        let senders = self.senders.read().await;
        if let Some(sender) = senders.get(&tid) {
            sender
                .broadcast(data.into())
                .await
                .map_err(|e| PubsubError::Publish(e.to_string()))?;
        }
        Ok(())
    }

    async fn unsubscribe(&self, tid: ThreadId) {
        // Dropping the sender leaves the topic.
        self.senders.write().await.remove(&tid);
    }

    async fn shutdown(&self) {
        self.senders.write().await.clear();
    }
}
