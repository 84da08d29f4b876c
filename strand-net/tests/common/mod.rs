// Each integration test compiles as a separate binary including this
// module via `mod common;`; not every binary uses every helper.
#![allow(dead_code)]
//! Shared test utilities for strand-net integration tests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use strand_logstore::MemLogstore;
use strand_net::{auth, proto, Net, NetConfig, ThreadStatusRegistry};
use strand_net_sim::{BroadcastPubsub, ChannelNetwork, ChannelTransport, PubsubNetwork};
use strand_net_types::PubsubLayer;
use strand_model::{Identity, PeerId, PubKey, ThreadId};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("strand_net=debug")
        .try_init();
}

/// One in-memory node: a `Net` over `ChannelTransport` + `MemLogstore`.
pub struct TestNode {
    pub net: Arc<Net<ChannelTransport>>,
    pub store: Arc<MemLogstore>,
}

impl TestNode {
    pub fn peer_id(&self) -> PeerId {
        self.net.peer_id()
    }

    pub fn pub_key(&self) -> PubKey {
        self.net.identity().pub_key()
    }
}

/// Build a node wired into the shared channel network, with an accept
/// loop running. `queue_workers: 0` keeps scheduled calls queued so
/// tests can inspect them.
pub async fn build_node_with(
    network: &ChannelNetwork,
    pubsub: Option<&PubsubNetwork>,
    config: NetConfig,
) -> TestNode {
    let identity = Identity::generate();
    let store = Arc::new(MemLogstore::new());
    let transport = ChannelTransport::new(identity.pub_key(), network).await;
    let pubsub_layer = pubsub.map(|fabric| {
        Arc::new(BroadcastPubsub::new(identity.pub_key(), fabric)) as Arc<dyn PubsubLayer>
    });

    let net = Net::new(
        identity,
        store.clone(),
        transport,
        pubsub_layer,
        Some(ThreadStatusRegistry::new()),
        config,
    )
    .await
    .expect("build net");

    tokio::spawn(net.clone().run_accept_loop());
    TestNode { net, store }
}

pub async fn build_node(network: &ChannelNetwork) -> TestNode {
    build_node_with(network, None, NetConfig::default()).await
}

/// A node whose call queues are never drained, for queue inspection.
pub async fn build_idle_node(network: &ChannelNetwork) -> TestNode {
    build_node_with(
        network,
        None,
        NetConfig {
            queue_workers: 0,
            ..NetConfig::default()
        },
    )
    .await
}

/// Poll an async predicate until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if predicate().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// ==================== Signed request builders ====================

pub fn get_logs_request(
    caller: &Identity,
    tid: ThreadId,
    service_key: &[u8],
) -> proto::GetLogsRequest {
    let body = proto::GetLogsBody {
        thread_id: tid.as_bytes().to_vec(),
        service_key: service_key.to_vec(),
    };
    proto::GetLogsRequest {
        header: Some(auth::sign_request(caller, &body)),
        body: Some(body),
    }
}

pub fn get_records_request(
    caller: &Identity,
    tid: ThreadId,
    service_key: &[u8],
    logs: Vec<proto::LogQuery>,
) -> proto::GetRecordsRequest {
    let body = proto::GetRecordsBody {
        thread_id: tid.as_bytes().to_vec(),
        service_key: service_key.to_vec(),
        logs,
    };
    proto::GetRecordsRequest {
        header: Some(auth::sign_request(caller, &body)),
        body: Some(body),
    }
}

pub fn push_record_request(
    caller: &Identity,
    tid: ThreadId,
    lid: PeerId,
    record: proto::Record,
) -> proto::PushRecordRequest {
    let body = proto::PushRecordBody {
        thread_id: tid.as_bytes().to_vec(),
        log_id: lid.as_bytes().to_vec(),
        record: Some(record),
    };
    proto::PushRecordRequest {
        header: Some(auth::sign_request(caller, &body)),
        body: Some(body),
    }
}

pub fn exchange_edges_request(
    caller: &Identity,
    entries: Vec<proto::ThreadEdges>,
) -> proto::ExchangeEdgesRequest {
    let body = proto::ExchangeEdgesBody { threads: entries };
    proto::ExchangeEdgesRequest {
        header: Some(auth::sign_request(caller, &body)),
        body: Some(body),
    }
}
