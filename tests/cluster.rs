//! Multi-node tests over the in-process router: election, replication,
//! failover, and the client-visible error surface.

use bytes::Bytes;
use cohort_raft::{
    start_node, CallError, DocumentStore, DocumentUpdate, DocumentUpdateError,
    DocumentUpdateResult, InMemoryStore, LocalRouter, MemberId, NodeConfig, NodeHandle,
    StateMachine, TimeoutConfig,
};
use std::collections::HashMap;
use tokio::time::{sleep, Duration, Instant};

fn discard_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

fn member_ids(names: &[&str]) -> Vec<MemberId> {
    names.iter().map(|n| MemberId::new(*n)).collect()
}

fn start_cluster<M, F>(names: &[&str], machine: F) -> (LocalRouter, HashMap<MemberId, NodeHandle>)
where
    M: StateMachine,
    F: Fn() -> M,
{
    let router = LocalRouter::new();
    let cohort = member_ids(names);
    let mut handles = HashMap::new();

    for id in &cohort {
        let handle = start_node(
            NodeConfig {
                me: id.clone(),
                cohort: cohort.clone(),
                timeouts: TimeoutConfig::default(),
                logger: discard_logger(),
            },
            InMemoryStore::new(machine()),
            router.handle(id.clone()),
        )
        .expect("valid cohort");
        router.attach(id.clone(), handle.client());
        handles.insert(id.clone(), handle);
    }

    (router, handles)
}

/// Retries a command against every (non-skipped) member until some leader
/// commits it, the way a real client hunts for the leader.
async fn call_until_committed(
    handles: &HashMap<MemberId, NodeHandle>,
    skip: Option<&MemberId>,
    value: Bytes,
) -> (MemberId, Bytes) {
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        for (id, handle) in handles {
            if Some(id) == skip {
                continue;
            }
            if let Ok(result) = handle.call(value.clone()).await {
                return (id.clone(), result);
            }
        }
        assert!(
            Instant::now() < deadline,
            "no leader committed {:?} in time",
            value
        );
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn three_members_elect_a_leader_and_replicate() {
    let (_router, handles) = start_cluster(&["a", "b", "c"], cohort_raft::AppendStateMachine::new);

    let (leader, result) = call_until_committed(&handles, None, Bytes::from_static(b"x")).await;
    assert_eq!(result, Bytes::from("x"));

    // The established leader keeps serving; state accumulates in log order.
    let result = handles[&leader]
        .call(Bytes::from_static(b"y"))
        .await
        .expect("leader call");
    assert_eq!(result, Bytes::from("xy"));
}

#[tokio::test]
async fn isolated_leader_is_deposed_and_the_rest_fail_over() {
    let (router, handles) = start_cluster(&["a", "b", "c"], cohort_raft::AppendStateMachine::new);

    let (old_leader, _) = call_until_committed(&handles, None, Bytes::from_static(b"x")).await;
    router.isolate(&old_leader);

    // The majority side elects a fresh leader and keeps committing. The old
    // leader's uncommitted tail is overwritten on reconnect.
    let (new_leader, result) =
        call_until_committed(&handles, Some(&old_leader), Bytes::from_static(b"z")).await;
    assert_ne!(new_leader, old_leader);
    assert!(result.ends_with(b"z"));

    // The isolated node still believes it leads; a command parks on it.
    let stranded = handles[&old_leader].client();
    let pending = tokio::task::spawn(async move { stranded.call(Bytes::from_static(b"y")).await });
    sleep(Duration::from_millis(200)).await;

    // Reconnect: the newer term's heartbeat demotes it and fails the call.
    router.heal(&old_leader);
    let deposed = tokio::time::timeout(Duration::from_secs(10), pending)
        .await
        .expect("pending call resolves after heal")
        .expect("task completes");
    assert_eq!(deposed, Err(cohort_raft::ClientCallError::Deposed));

    // The cohort converges on the surviving history.
    let result = handles[&new_leader]
        .call(Bytes::from_static(b"w"))
        .await
        .expect("new leader call");
    assert_eq!(result, Bytes::from("xzw"));
}

#[tokio::test]
async fn member_without_quorum_never_leads() {
    let router = LocalRouter::new();
    let cohort = member_ids(&["a", "b", "c"]);

    // Only "a" is running; it can campaign forever but never win.
    let handle = start_node(
        NodeConfig {
            me: cohort[0].clone(),
            cohort: cohort.clone(),
            timeouts: TimeoutConfig::default(),
            logger: discard_logger(),
        },
        InMemoryStore::new(cohort_raft::AppendStateMachine::new()),
        router.handle(cohort[0].clone()),
    )
    .expect("valid cohort");
    router.attach(cohort[0].clone(), handle.client());

    sleep(Duration::from_millis(500)).await;
    match handle.call(Bytes::from_static(b"x")).await {
        Err(CallError::NotLeader { .. }) => {}
        other => panic!("expected NotLeader, got {:?}", other),
    }
}

#[tokio::test]
async fn stopped_node_fails_calls_fast() {
    let (_router, handles) = start_cluster(&["a", "b", "c"], cohort_raft::AppendStateMachine::new);
    let (leader, _) = call_until_committed(&handles, None, Bytes::from_static(b"x")).await;

    handles[&leader].stop().await;
    sleep(Duration::from_millis(50)).await;

    match handles[&leader].call(Bytes::from_static(b"y")).await {
        Err(CallError::NodeDown) => {}
        other => panic!("expected NodeDown, got {:?}", other),
    }
}

#[tokio::test]
async fn document_updates_travel_opaquely_and_keep_their_sequencing() {
    let (_router, handles) = start_cluster(&["a", "b", "c"], DocumentStore::new);

    let update = |seq: u64| {
        Bytes::from(
            serde_json::to_vec(&DocumentUpdate {
                key: "doc-1".to_string(),
                seq,
                body: format!("rev-{}", seq),
            })
            .unwrap(),
        )
    };

    let (leader, raw) = call_until_committed(&handles, None, update(1)).await;
    let result: DocumentUpdateResult = serde_json::from_slice(&raw).unwrap();
    assert_eq!(
        result,
        DocumentUpdateResult::Updated {
            key: "doc-1".to_string(),
            seq: 1,
        }
    );

    // A stale sequence is rejected by the state machine, not by consensus:
    // the command still commits, the rejection rides back as the output.
    let raw = handles[&leader].call(update(1)).await.expect("leader call");
    let result: DocumentUpdateResult = serde_json::from_slice(&raw).unwrap();
    assert_eq!(
        result,
        DocumentUpdateResult::Error(DocumentUpdateError::UpdatesOutOfOrder {
            key: "doc-1".to_string(),
            applied_seq: 1,
            requested_seq: 1,
        })
    );

    let raw = handles[&leader].call(update(2)).await.expect("leader call");
    let result: DocumentUpdateResult = serde_json::from_slice(&raw).unwrap();
    assert_eq!(
        result,
        DocumentUpdateResult::Updated {
            key: "doc-1".to_string(),
            seq: 2,
        }
    );
}
