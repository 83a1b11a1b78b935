//! Gossip and consensus across running nodes

mod common;

use common::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use swirl_core::PeerId;
use swirl_net::{EagerSyncRequest, InmemNetwork, InmemTransport, SyncRequest, Transport};
use swirld::{SledStore, Store};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_four_nodes_commit_same_order() {
    let network = InmemNetwork::new();
    let nodes = cluster(&network, 4);

    for i in 0..40 {
        let node = &nodes[i % nodes.len()].node;
        node.submit_transaction(format!("tx{}", i).into_bytes()).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    wait_for("all transactions committed", Duration::from_secs(60), || {
        nodes.iter().all(|n| n.proxy.committed_transactions().len() == 40)
    })
    .await;

    let reference = nodes[0].proxy.committed_transactions();
    for n in &nodes[1..] {
        assert_eq!(n.proxy.committed_transactions(), reference, "{} diverged", n.addr);
    }
    wait_for("same state", Duration::from_secs(10), || {
        nodes.iter().all(|n| n.proxy.state_hash() == nodes[0].proxy.state_hash())
    })
    .await;

    // Blocks agree on their content and round received
    let blocks: Vec<_> = nodes.iter().map(|n| n.proxy.committed_blocks()).collect();
    for other in &blocks[1..] {
        for (a, b) in blocks[0].iter().zip(other) {
            assert_eq!(a.index(), b.index());
            assert_eq!(a.round_received(), b.round_received());
            assert_eq!(a.transactions(), b.transactions());
        }
    }

    let stats = nodes[0].node.stats().unwrap();
    assert_eq!(stats.peers, 4);
    assert_eq!(stats.hashgraph.consensus_transactions, 40);
    assert!(stats.sync.total_syncs > 0);
    shutdown(&nodes).await;
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let network = InmemNetwork::new();
    let nodes = cluster(&network, 1);
    let solo = &nodes[0];
    for i in 0..3 {
        solo.node.submit_transaction(vec![i]).unwrap();
    }
    wait_for("monologue commits", Duration::from_secs(10), || {
        solo.proxy.committed_transactions().len() == 3
    })
    .await;
    // Let the event carrying our block signature go out
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = InmemTransport::new(network.clone(), "client", REQUEST_TIMEOUT);
    let request = SyncRequest {
        from_id: PeerId(99),
        known: BTreeMap::new(),
    };
    let first = client.sync(&solo.addr, request.clone()).await.unwrap();
    let second = client.sync(&solo.addr, request).await.unwrap();
    assert!(!first.events.is_empty());
    assert_eq!(first.events, second.events);
    assert_eq!(first.known, second.known);

    // Pushing back what the node already has changes nothing
    let before = solo.node.stats().unwrap().hashgraph;
    let resp = client
        .eager_sync(
            &solo.addr,
            EagerSyncRequest {
                from_id: PeerId(99),
                events: first.events,
            },
        )
        .await
        .unwrap();
    assert!(resp.success);
    assert_eq!(solo.node.stats().unwrap().hashgraph, before);

    // Known beyond everything: nothing to send
    let resp = client
        .sync(
            &solo.addr,
            SyncRequest {
                from_id: PeerId(99),
                known: first.known,
            },
        )
        .await
        .unwrap();
    assert!(resp.events.is_empty());
    shutdown(&nodes).await;
}

#[tokio::test]
async fn test_restart_replays_store() {
    let dir = tempfile::tempdir().unwrap();
    let genesis = genesis(1);

    let store = Arc::new(SledStore::open(dir.path(), &genesis).unwrap());
    let network = InmemNetwork::new();
    let first = start_with(&network, 0, config(0), store.clone() as Arc<dyn Store>);
    for i in 0..4 {
        first.node.submit_transaction(format!("before-{}", i).into_bytes()).unwrap();
    }
    wait_for("first run commits", Duration::from_secs(10), || {
        first.proxy.committed_transactions().len() == 4
    })
    .await;
    first.node.shutdown().await;
    let before = first.proxy.committed_transactions();
    store.flush().unwrap();
    drop(first);
    drop(store);

    // Same store, fresh application: blocks are replayed on start
    let store = Arc::new(SledStore::open(dir.path(), &genesis).unwrap());
    let network = InmemNetwork::new();
    let second = start_with(&network, 0, config(0), store as Arc<dyn Store>);
    assert_eq!(second.proxy.committed_transactions(), before);

    second.node.submit_transaction(b"after".to_vec()).unwrap();
    wait_for("second run commits", Duration::from_secs(10), || {
        committed(&second, b"after")
    })
    .await;
    second.node.shutdown().await;
}
