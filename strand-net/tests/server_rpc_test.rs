//! Handler-level tests for the five sync RPCs, driven directly
//! against a live node.

mod common;

use common::*;
use strand_logstore::Logstore;
use strand_model::{Identity, Key, LogInfo, Record, ThreadId, ThreadInfo, ThreadKey};
use strand_net::{convert, CallPriority, NetError, SyncOp, SyncState};
use strand_net_sim::ChannelNetwork;

/// A thread with a service key and no logs.
async fn keyed_thread(node: &TestNode) -> (ThreadId, Key) {
    let tid = ThreadId::random();
    let key = Key::random();
    node.store
        .add_thread(ThreadInfo::new(tid, ThreadKey::new_service(key)))
        .await
        .unwrap();
    (tid, key)
}

#[tokio::test]
async fn get_logs_on_empty_thread_is_authorized_and_empty() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let caller = Identity::generate();
    let (tid, key) = keyed_thread(&node).await;

    let reply = node
        .net
        .handle_get_logs(get_logs_request(&caller, tid, key.as_bytes()))
        .await
        .unwrap();
    assert!(reply.logs.is_empty());
}

#[tokio::test]
async fn get_logs_with_wrong_key_is_unauthenticated() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let caller = Identity::generate();
    let (tid, _key) = keyed_thread(&node).await;

    let err = node
        .net
        .handle_get_logs(get_logs_request(&caller, tid, Key::random().as_bytes()))
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::Unauthenticated(_)));
}

#[tokio::test]
async fn get_logs_on_unknown_thread_is_not_found() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let caller = Identity::generate();

    let err = node
        .net
        .handle_get_logs(get_logs_request(
            &caller,
            ThreadId::random(),
            Key::random().as_bytes(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::NotFound(_)));
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let caller = Identity::generate();
    let (tid, key) = keyed_thread(&node).await;

    let mut req = get_logs_request(&caller, tid, key.as_bytes());
    if let Some(header) = &mut req.header {
        header.signature[0] ^= 0xff;
    }
    let err = node.net.handle_get_logs(req).await.unwrap_err();
    assert!(matches!(err, NetError::Unauthenticated(_)));
}

#[tokio::test]
async fn get_records_fast_path_on_equal_heads() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let caller = Identity::generate();

    let tid = ThreadId::random();
    node.net.create_thread(tid).await.unwrap();
    let key = node.store.service_key(tid).await.unwrap().unwrap();
    let record = node
        .net
        .append_record(tid, b"e".to_vec(), b"h".to_vec(), b"b".to_vec())
        .await
        .unwrap();

    // Caller already holds our head: empty reply, no fan-out.
    let reply = node
        .net
        .handle_get_records(get_records_request(
            &caller,
            tid,
            key.as_bytes(),
            vec![strand_net::proto::LogQuery {
                log_id: node.peer_id().as_bytes().to_vec(),
                offset: record.cid().as_bytes().to_vec(),
                limit: 100,
            }],
        ))
        .await
        .unwrap();
    assert!(reply.logs.is_empty());

    // Caller knows nothing: the log descriptor and the record come back.
    let reply = node
        .net
        .handle_get_records(get_records_request(&caller, tid, key.as_bytes(), vec![]))
        .await
        .unwrap();
    assert_eq!(reply.logs.len(), 1);
    let batch = &reply.logs[0];
    assert!(batch.log.is_some());
    assert_eq!(batch.records.len(), 1);
    let got = convert::record_from_wire(&batch.records[0], &key).unwrap();
    assert_eq!(got.cid(), record.cid());
}

#[tokio::test]
async fn get_records_with_unknown_offset_schedules_high_priority_pull() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let caller = Identity::generate();

    let tid = ThreadId::random();
    node.net.create_thread(tid).await.unwrap();
    let key = node.store.service_key(tid).await.unwrap().unwrap();
    node.net
        .append_record(tid, b"e".to_vec(), b"h".to_vec(), b"b".to_vec())
        .await
        .unwrap();

    // The caller names an offset we have never seen: it is ahead of us.
    let reply = node
        .net
        .handle_get_records(get_records_request(
            &caller,
            tid,
            key.as_bytes(),
            vec![strand_net::proto::LogQuery {
                log_id: node.peer_id().as_bytes().to_vec(),
                offset: strand_model::crypto::content_hash(b"their head").as_bytes().to_vec(),
                limit: 100,
            }],
        ))
        .await
        .unwrap();
    assert!(reply.logs.is_empty());
    assert_eq!(
        node.net.queue_get_records().queued_priority(
            caller.peer_id(),
            tid,
            SyncOp::UpdateRecords
        ),
        Some(CallPriority::High)
    );
}

#[tokio::test]
async fn push_log_uptakes_key_and_schedules_pull() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let caller = Identity::generate();

    let tid = ThreadId::random();
    let key = Key::random();
    let log = LogInfo::new(caller.pub_key());

    let body = strand_net::proto::PushLogBody {
        thread_id: tid.as_bytes().to_vec(),
        log: Some(convert::log_to_wire(&log)),
        service_key: key.as_bytes().to_vec(),
        read_key: vec![],
    };
    let req = strand_net::proto::PushLogRequest {
        header: Some(strand_net::auth::sign_request(&caller, &body)),
        body: Some(body),
    };
    node.net.handle_push_log(req).await.unwrap();

    assert_eq!(node.store.service_key(tid).await.unwrap(), Some(key));
    let info = node.store.thread_info(tid).await.unwrap();
    assert!(info.log(caller.peer_id()).is_some());
    assert_eq!(
        node.net
            .queue_get_records()
            .queued_priority(caller.peer_id(), tid, SyncOp::UpdateRecords),
        Some(CallPriority::Low)
    );
}

#[tokio::test]
async fn push_log_without_key_to_unknown_thread_is_not_found() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let caller = Identity::generate();

    let body = strand_net::proto::PushLogBody {
        thread_id: ThreadId::random().as_bytes().to_vec(),
        log: Some(convert::log_to_wire(&LogInfo::new(caller.pub_key()))),
        service_key: vec![],
        read_key: vec![],
    };
    let req = strand_net::proto::PushLogRequest {
        header: Some(strand_net::auth::sign_request(&caller, &body)),
        body: Some(body),
    };
    let err = node.net.handle_push_log(req).await.unwrap_err();
    assert!(matches!(err, NetError::NotFound(_)));
}

#[tokio::test]
async fn push_record_to_unknown_log_is_not_found() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let author = Identity::generate();
    let (tid, key) = keyed_thread(&node).await;

    let record = Record::create(
        author.signing_key(),
        &key,
        None,
        b"e".to_vec(),
        b"h".to_vec(),
        b"b".to_vec(),
    );
    let err = node
        .net
        .handle_push_record(push_record_request(
            &author,
            tid,
            author.peer_id(),
            convert::record_to_wire(&record),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::NotFound(_)));
}

#[tokio::test]
async fn concurrent_push_record_is_idempotent() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let author = Identity::generate();
    let (tid, key) = keyed_thread(&node).await;
    node.store
        .add_log(tid, LogInfo::new(author.pub_key()))
        .await
        .unwrap();

    let record = Record::create(
        author.signing_key(),
        &key,
        None,
        b"e".to_vec(),
        b"h".to_vec(),
        b"b".to_vec(),
    );
    let wire = convert::record_to_wire(&record);

    let net_a = node.net.clone();
    let net_b = node.net.clone();
    let req_a = push_record_request(&author, tid, author.peer_id(), wire.clone());
    let req_b = push_record_request(&author, tid, author.peer_id(), wire);

    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { net_a.handle_push_record(req_a).await }),
        tokio::spawn(async move { net_b.handle_push_record(req_b).await }),
    );
    ra.unwrap().unwrap();
    rb.unwrap().unwrap();

    // Exactly one stored copy, head advanced once.
    let chain = node
        .store
        .records_after(tid, author.peer_id(), None, 10)
        .await
        .unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(
        node.store.head(tid, author.peer_id()).await.unwrap(),
        Some(record.cid())
    );

    // Both replies produced a DownloadDone transition.
    let status = node.net.status().unwrap().clone();
    let peer = author.peer_id();
    assert!(
        eventually(|| {
            let status = status.clone();
            async move {
                status
                    .status(peer, tid)
                    .map(|s| s.down == SyncState::Done)
                    .unwrap_or(false)
            }
        })
        .await
    );
}

#[tokio::test]
async fn push_record_with_bad_author_signature_is_unauthenticated() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let author = Identity::generate();
    let (tid, key) = keyed_thread(&node).await;
    node.store
        .add_log(tid, LogInfo::new(author.pub_key()))
        .await
        .unwrap();

    // Record sealed under the right service key but signed by a
    // different key than the log's.
    let impostor = Identity::generate();
    let record = Record::create(
        impostor.signing_key(),
        &key,
        None,
        b"e".to_vec(),
        b"h".to_vec(),
        b"b".to_vec(),
    );
    let err = node
        .net
        .handle_push_record(push_record_request(
            &author,
            tid,
            author.peer_id(),
            convert::record_to_wire(&record),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::Unauthenticated(_)));
}

#[tokio::test]
async fn exchange_edges_divergent_heads_schedules_pull() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let caller = Identity::generate();

    let tid = ThreadId::random();
    node.net.create_thread(tid).await.unwrap();
    node.net
        .append_record(tid, b"e".to_vec(), b"h".to_vec(), b"b".to_vec())
        .await
        .unwrap();

    let local_addrs = node.store.addrs_edge(tid).await.unwrap();
    let local_heads = node.store.heads_edge(tid).await.unwrap();

    let reply = node
        .net
        .handle_exchange_edges(exchange_edges_request(
            &caller,
            vec![strand_net::proto::ThreadEdges {
                thread_id: tid.as_bytes().to_vec(),
                addrs_edge: local_addrs,
                heads_edge: local_heads.wrapping_add(1),
            }],
        ))
        .await
        .unwrap();

    assert_eq!(reply.edges.len(), 1);
    assert!(reply.edges[0].exists);
    assert_eq!(reply.edges[0].addrs_edge, local_addrs);
    assert_eq!(reply.edges[0].heads_edge, local_heads);
    assert_eq!(
        node.net
            .queue_get_records()
            .queued_priority(caller.peer_id(), tid, SyncOp::UpdateRecords),
        Some(CallPriority::Low)
    );
    assert!(!node
        .net
        .queue_get_logs()
        .is_queued(caller.peer_id(), tid, SyncOp::UpdateLogs));
}

#[tokio::test]
async fn exchange_edges_unknown_thread_schedules_combined_high_priority() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let caller = Identity::generate();
    let tid = ThreadId::random();

    let reply = node
        .net
        .handle_exchange_edges(exchange_edges_request(
            &caller,
            vec![strand_net::proto::ThreadEdges {
                thread_id: tid.as_bytes().to_vec(),
                addrs_edge: 42,
                heads_edge: 43,
            }],
        ))
        .await
        .unwrap();

    assert_eq!(reply.edges.len(), 1);
    assert!(!reply.edges[0].exists);
    assert_eq!(
        node.net.queue_get_logs().queued_priority(
            caller.peer_id(),
            tid,
            SyncOp::UpdateLogsAndSubscribe
        ),
        Some(CallPriority::High)
    );
}

#[tokio::test]
async fn exchange_edges_equal_edges_reports_done_both_ways() {
    let network = ChannelNetwork::new();
    let node = build_idle_node(&network).await;
    let caller = Identity::generate();

    let tid = ThreadId::random();
    node.net.create_thread(tid).await.unwrap();
    node.net
        .append_record(tid, b"e".to_vec(), b"h".to_vec(), b"b".to_vec())
        .await
        .unwrap();

    let local_addrs = node.store.addrs_edge(tid).await.unwrap();
    let local_heads = node.store.heads_edge(tid).await.unwrap();

    let reply = node
        .net
        .handle_exchange_edges(exchange_edges_request(
            &caller,
            vec![strand_net::proto::ThreadEdges {
                thread_id: tid.as_bytes().to_vec(),
                addrs_edge: local_addrs,
                heads_edge: local_heads,
            }],
        ))
        .await
        .unwrap();
    assert!(reply.edges[0].exists);
    assert!(node.net.queue_get_records().is_empty());
    assert!(node.net.queue_get_logs().is_empty());

    let status = node.net.status().unwrap().clone();
    let peer = caller.peer_id();
    assert!(
        eventually(|| {
            let status = status.clone();
            async move {
                status
                    .status(peer, tid)
                    .map(|s| s.down == SyncState::Done && s.up == SyncState::Done)
                    .unwrap_or(false)
            }
        })
        .await
    );
}
