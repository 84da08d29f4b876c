//! Multi-node replication tests over in-memory channels: the full
//! loop of handlers, call queues, workers, and the outbound client.

mod common;

use common::*;
use strand_logstore::Logstore;
use strand_model::ThreadId;
use strand_net_sim::ChannelNetwork;

#[tokio::test]
async fn push_log_triggers_record_pull() {
    init_tracing();
    let network = ChannelNetwork::new();
    let a = build_node(&network).await;
    let b = build_node(&network).await;

    let tid = ThreadId::random();
    a.net.create_thread(tid).await.unwrap();
    let mut cids = Vec::new();
    for i in 0..3u8 {
        let rec = a
            .net
            .append_record(tid, vec![i], b"h".to_vec(), b"b".to_vec())
            .await
            .unwrap();
        cids.push(rec.cid());
    }

    // Invite B: push our log (and keys) to it. B schedules a pull of
    // our records and catches up in the background.
    let a_info = a.store.thread_info(tid).await.unwrap();
    let a_log = a_info.log(a.peer_id()).unwrap().clone();
    a.net.push_log_to(b.pub_key(), tid, a_log).await.unwrap();

    let b_store = b.store.clone();
    let (a_pid, head) = (a.peer_id(), cids[2]);
    assert!(
        eventually(|| {
            let b_store = b_store.clone();
            async move { b_store.head(tid, a_pid).await.unwrap() == Some(head) }
        })
        .await,
        "B never caught up to A's head"
    );

    // Every record landed exactly once, in chain order.
    let chain = b.store.records_after(tid, a.peer_id(), None, 10).await.unwrap();
    assert_eq!(
        chain.iter().map(|r| r.cid()).collect::<Vec<_>>(),
        cids
    );

    // Both ends now agree on the heads edge.
    assert_eq!(
        a.store.heads_edge(tid).await.unwrap(),
        b.store.heads_edge(tid).await.unwrap()
    );
}

#[tokio::test]
async fn direct_record_push() {
    init_tracing();
    let network = ChannelNetwork::new();
    let a = build_node(&network).await;
    let b = build_node(&network).await;

    let tid = ThreadId::random();
    a.net.create_thread(tid).await.unwrap();
    let a_info = a.store.thread_info(tid).await.unwrap();
    let a_log = a_info.log(a.peer_id()).unwrap().clone();
    a.net.push_log_to(b.pub_key(), tid, a_log).await.unwrap();

    let record = a
        .net
        .append_record(tid, b"event".to_vec(), b"h".to_vec(), b"b".to_vec())
        .await
        .unwrap();
    a.net
        .push_record_to(b.pub_key(), tid, a.peer_id(), &record)
        .await
        .unwrap();

    // The push path is synchronous: the record is stored by the time
    // the reply comes back.
    assert!(b.store.is_known(record.cid()).await.unwrap());
    assert_eq!(
        b.store.head(tid, a.peer_id()).await.unwrap(),
        Some(record.cid())
    );
}

#[tokio::test]
async fn gapped_push_triggers_recovery_pull() {
    init_tracing();
    let network = ChannelNetwork::new();
    let a = build_node(&network).await;
    let b = build_node(&network).await;

    let tid = ThreadId::random();
    a.net.create_thread(tid).await.unwrap();
    let a_info = a.store.thread_info(tid).await.unwrap();
    let a_log = a_info.log(a.peer_id()).unwrap().clone();

    // B already tracks the thread and A's log, but no records; no pull
    // is pending.
    let key = a.store.service_key(tid).await.unwrap().unwrap();
    b.store.add_service_key(tid, key).await.unwrap();
    b.store.add_log(tid, a_log).await.unwrap();

    // B never sees the first record directly.
    let first = a
        .net
        .append_record(tid, b"one".to_vec(), b"h".to_vec(), b"b".to_vec())
        .await
        .unwrap();
    let second = a
        .net
        .append_record(tid, b"two".to_vec(), b"h".to_vec(), b"b".to_vec())
        .await
        .unwrap();

    // Pushing only the tip cannot extend B's chain; B refuses it and
    // schedules a pull from A instead.
    let err = a
        .net
        .push_record_to(b.pub_key(), tid, a.peer_id(), &second)
        .await
        .unwrap_err();
    assert!(matches!(err, strand_net::NetError::Internal(_)));

    let b_store = b.store.clone();
    let (a_pid, head) = (a.peer_id(), second.cid());
    assert!(
        eventually(|| {
            let b_store = b_store.clone();
            async move { b_store.head(tid, a_pid).await.unwrap() == Some(head) }
        })
        .await,
        "B never recovered from the gap"
    );
    assert!(b.store.is_known(first.cid()).await.unwrap());
}

#[tokio::test]
async fn exchange_edges_reconciles_divergence() {
    init_tracing();
    let network = ChannelNetwork::new();
    let a = build_node(&network).await;
    let b = build_node(&network).await;

    let tid = ThreadId::random();
    a.net.create_thread(tid).await.unwrap();
    a.net
        .append_record(tid, b"one".to_vec(), b"h".to_vec(), b"b".to_vec())
        .await
        .unwrap();

    let a_info = a.store.thread_info(tid).await.unwrap();
    let a_log = a_info.log(a.peer_id()).unwrap().clone();
    a.net.push_log_to(b.pub_key(), tid, a_log).await.unwrap();

    let b_store = b.store.clone();
    let a_pid = a.peer_id();
    assert!(
        eventually(|| {
            let b_store = b_store.clone();
            async move { b_store.head(tid, a_pid).await.unwrap().is_some() }
        })
        .await
    );

    // A moves ahead while B is not told directly.
    let tip = a
        .net
        .append_record(tid, b"two".to_vec(), b"h".to_vec(), b"b".to_vec())
        .await
        .unwrap();

    // A announces its edges; B sees the heads mismatch and pulls.
    let reply = a.net.exchange_edges_with(b.pub_key(), &[tid]).await.unwrap();
    assert_eq!(reply.edges.len(), 1);
    assert!(reply.edges[0].exists);

    let b_store = b.store.clone();
    let head = tip.cid();
    assert!(
        eventually(|| {
            let b_store = b_store.clone();
            async move { b_store.head(tid, a_pid).await.unwrap() == Some(head) }
        })
        .await,
        "B never reconciled after edge exchange"
    );
}

#[tokio::test]
async fn exchange_edges_discovers_unknown_thread() {
    init_tracing();
    let network = ChannelNetwork::new();
    let a = build_node(&network).await;
    let b = build_node(&network).await;

    let tid = ThreadId::random();
    a.net.create_thread(tid).await.unwrap();
    a.net
        .append_record(tid, b"one".to_vec(), b"h".to_vec(), b"b".to_vec())
        .await
        .unwrap();

    // B has never heard of the thread and holds no key for it, so its
    // scheduled log fetch cannot authorize; the reply tells A that B
    // lacks the thread entirely.
    let reply = a.net.exchange_edges_with(b.pub_key(), &[tid]).await.unwrap();
    assert!(!reply.edges[0].exists);
    assert!(b.store.thread_info(tid).await.is_err());

    // A reacts by pushing its log, keys riding along; B then catches
    // up on its own.
    let a_info = a.store.thread_info(tid).await.unwrap();
    let a_log = a_info.log(a.peer_id()).unwrap().clone();
    a.net.push_log_to(b.pub_key(), tid, a_log).await.unwrap();

    let b_store = b.store.clone();
    let a_pid = a.peer_id();
    assert!(
        eventually(|| {
            let b_store = b_store.clone();
            async move { b_store.head(tid, a_pid).await.unwrap().is_some() }
        })
        .await,
        "B never caught up after the log push"
    );
}
