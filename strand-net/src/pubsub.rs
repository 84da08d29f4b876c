//! Pubsub relay: record delivery alongside direct RPC.
//!
//! One topic per thread carries wire-encoded `PushRecordRequest`
//! payloads. Received pushes run through the same `PushRecord` handler
//! as direct calls; a record that beats its log over the topic is
//! logged and dropped, never retried — the authoritative copy arrives
//! by direct RPC right after the log does.

use crate::error::NetError;
use crate::net::Net;
use crate::proto;
use prost::Message;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use strand_model::{PubKey, ThreadId};
use strand_net_types::{PubsubLayer, Transport};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Per-thread topic state over an injected pubsub layer.
pub(crate) struct PubsubRelay {
    pub(crate) layer: Arc<dyn PubsubLayer>,
    topics: Mutex<HashMap<ThreadId, CancellationToken>>,
}

impl PubsubRelay {
    pub(crate) fn new(layer: Arc<dyn PubsubLayer>) -> Self {
        Self {
            layer,
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn has_topic(&self, tid: ThreadId) -> bool {
        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.contains_key(&tid)
    }

    /// Register a topic loop's token; a racing registration wins and
    /// the late token is returned for cancellation.
    fn register(&self, tid: ThreadId, token: CancellationToken) -> Option<CancellationToken> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        if topics.contains_key(&tid) {
            return Some(token);
        }
        topics.insert(tid, token);
        None
    }
}

impl<T: Transport> Net<T> {
    /// Join a thread's pubsub topic and start relaying received
    /// records into the `PushRecord` path. No-op without a pubsub
    /// layer or when already subscribed.
    pub async fn subscribe_thread(self: &Arc<Self>, tid: ThreadId) -> Result<(), NetError> {
        let Some(relay) = &self.pubsub else {
            return Ok(());
        };
        if relay.has_topic(tid) {
            return Ok(());
        }

        let rx = relay
            .layer
            .subscribe(tid)
            .await
            .map_err(NetError::internal)?;

        let token = self.shutdown.child_token();
        if let Some(late) = relay.register(tid, token.clone()) {
            late.cancel();
            return Ok(());
        }
        tracing::debug!(thread = %tid, "subscribed to thread topic");

        let net = Arc::downgrade(self);
        let own_key = self.identity.pub_key();
        tokio::spawn(run_topic_loop(net, own_key, tid, rx, token));
        Ok(())
    }

    /// Announce a locally produced record push on the thread's topic.
    /// Best-effort: failures are logged, the direct RPC path is the
    /// durable one.
    pub async fn publish_record(&self, tid: ThreadId, request: proto::PushRecordRequest) {
        let Some(relay) = &self.pubsub else {
            return;
        };
        if let Err(e) = relay.layer.publish(tid, request.encode_to_vec()).await {
            tracing::warn!(thread = %tid, error = %e, "publishing record failed");
        }
    }
}

async fn run_topic_loop<T: Transport>(
    net: Weak<Net<T>>,
    own_key: PubKey,
    tid: ThreadId,
    mut rx: broadcast::Receiver<(PubKey, Vec<u8>)>,
    token: CancellationToken,
) {
    loop {
        let (from, data) = tokio::select! {
            _ = token.cancelled() => break,
            received = rx.recv() => match received {
                Ok(item) => item,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(thread = %tid, skipped = n, "pubsub receiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        if from == own_key {
            continue;
        }
        let Some(net) = net.upgrade() else { break };

        let request = match proto::PushRecordRequest::decode(&data[..]) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(thread = %tid, error = %e, "undecodable pubsub record");
                continue;
            }
        };
        match net.handle_push_record(request).await {
            Ok(_) => {}
            // The record beat its log over the topic; the same record
            // arrives via direct RPC once the log lands.
            Err(NetError::NotFound(_)) => {
                tracing::debug!(thread = %tid, "pubsub record arrived before its log");
            }
            Err(e) => {
                tracing::error!(thread = %tid, error = %e, "handling pubsub record failed");
            }
        }
    }
    tracing::debug!(thread = %tid, "thread topic loop ended");
}
