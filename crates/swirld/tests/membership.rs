//! Dynamic membership: joining, leaving and fast-forward catch-up

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use swirl_net::InmemNetwork;
use swirld::{InmemStore, NodeState};

/// Peer sets of every node are identical
fn peer_sets_agree(nodes: &[&TestNode]) -> bool {
    let reference = nodes[0].node.all_peer_sets().unwrap();
    nodes
        .iter()
        .all(|n| n.node.all_peer_sets().unwrap() == reference)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_join_running_cluster() {
    let network = InmemNetwork::new();
    let mut nodes = cluster(&network, 4);
    let busy = keep_busy(nodes.iter().map(|n| n.node.clone()).collect(), "warmup");

    wait_for("cluster warms up", Duration::from_secs(30), || {
        nodes[0].proxy.committed_transactions().len() >= 10
    })
    .await;

    // The joiner only knows the genesis peers
    let joiner = start(&network, 4, &genesis(4));
    assert_eq!(joiner.node.state(), NodeState::Joining);

    wait_for("joiner babbling", Duration::from_secs(60), || {
        joiner.node.state() == NodeState::Babbling
    })
    .await;
    wait_for("peer set of five everywhere", Duration::from_secs(60), || {
        let all: Vec<&TestNode> = nodes.iter().chain(std::iter::once(&joiner)).collect();
        all.iter().all(|n| n.node.peers().unwrap().len() == 5) && peer_sets_agree(&all)
    })
    .await;

    // The joiner's own transactions reach every node
    wait_for("joiner member of its own engine", Duration::from_secs(30), || {
        joiner.node.submit_transaction(b"from-joiner".to_vec()).is_ok()
            && committed(&joiner, b"from-joiner")
    })
    .await;
    wait_for("joiner transaction everywhere", Duration::from_secs(60), || {
        nodes.iter().all(|n| committed(n, b"from-joiner"))
    })
    .await;
    busy.abort();

    // Without fast sync the joiner replayed history from genesis
    wait_for("same history", Duration::from_secs(30), || {
        let reference = nodes[0].proxy.committed_transactions();
        nodes
            .iter()
            .chain(std::iter::once(&joiner))
            .all(|n| n.proxy.committed_transactions() == reference)
    })
    .await;

    nodes.push(joiner);
    shutdown(&nodes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fast_forward_join() {
    let network = InmemNetwork::new();
    let nodes = cluster(&network, 4);
    let busy = keep_busy(nodes.iter().map(|n| n.node.clone()).collect(), "history");

    wait_for("anchor block", Duration::from_secs(60), || {
        nodes
            .iter()
            .all(|n| n.node.stats().unwrap().hashgraph.anchor_block.is_some())
    })
    .await;

    let mut config = config(4);
    config.enable_fast_sync = true;
    let joiner = start_with(&network, 4, config, Arc::new(InmemStore::new(&genesis(4))));

    wait_for("joiner babbling", Duration::from_secs(60), || {
        joiner.node.state() == NodeState::Babbling
    })
    .await;
    busy.abort();

    // Quiesce on a marker everyone commits, then compare the suffix
    nodes[0].node.submit_transaction(b"marker".to_vec()).unwrap();
    wait_for("marker everywhere", Duration::from_secs(60), || {
        committed(&joiner, b"marker") && nodes.iter().all(|n| committed(n, b"marker"))
    })
    .await;

    let joined = joiner.proxy.committed_blocks();
    let member = nodes[0].proxy.committed_blocks();
    assert!(!joined.is_empty());
    // The joiner started from an anchor, not from block 0
    assert!(joined[0].index() > 0);
    for block in &joined {
        let theirs = member
            .iter()
            .find(|b| b.index() == block.index())
            .expect("member has every block the joiner committed");
        assert_eq!(block.transactions(), theirs.transactions());
        assert_eq!(block.round_received(), theirs.round_received());
    }

    let mut all = nodes;
    all.push(joiner);
    shutdown(&all).await;
}

/// The last of `n` nodes leaves; the others agree on the peer set history
/// and keep committing without it
async fn leave_one(n: usize) {
    let network = InmemNetwork::new();
    let mut nodes = cluster(&network, n);
    let leaver = nodes.pop().unwrap();
    let busy = keep_busy(nodes.iter().map(|n| n.node.clone()).collect(), "leave");

    wait_for("cluster warms up", Duration::from_secs(30), || {
        nodes[0].proxy.committed_transactions().len() >= 5
    })
    .await;

    within("leave completes", Duration::from_secs(60), leaver.node.leave())
        .await
        .unwrap();
    assert_eq!(leaver.node.state(), NodeState::Shutdown);
    assert!(!network.is_connected(&leaver.addr));

    wait_for("smaller peer set", Duration::from_secs(30), || {
        nodes.iter().all(|node| node.node.peers().unwrap().len() == n - 1)
    })
    .await;
    let remaining: Vec<&TestNode> = nodes.iter().collect();
    assert!(peer_sets_agree(&remaining));
    assert_eq!(nodes[0].node.all_peer_sets().unwrap().len(), 2);
    let leaver_id = leaver.node.id();
    assert!(nodes[0]
        .node
        .peers()
        .unwrap()
        .iter()
        .all(|p| p.id != leaver_id));

    // The remaining nodes still reach consensus
    nodes[0].node.submit_transaction(b"after-leave".to_vec()).unwrap();
    wait_for("commit without the leaver", Duration::from_secs(60), || {
        nodes.iter().all(|node| committed(node, b"after-leave"))
    })
    .await;
    busy.abort();
    shutdown(&nodes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leave_from_two() {
    leave_one(2).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leave_from_three() {
    leave_one(3).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leave_from_four() {
    leave_one(4).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_successive_leaves() {
    let network = InmemNetwork::new();
    let mut nodes = cluster(&network, 4);

    while let Some(leaver) = nodes.pop() {
        let size = nodes.len();
        if size == 0 {
            // Alone: nothing to agree on
            within("last leave", Duration::from_secs(5), leaver.node.leave())
                .await
                .unwrap();
            assert_eq!(leaver.node.state(), NodeState::Shutdown);
            break;
        }

        let busy = keep_busy(nodes.iter().map(|n| n.node.clone()).collect(), "shrink");
        within("leave completes", Duration::from_secs(60), leaver.node.leave())
            .await
            .unwrap();
        assert_eq!(leaver.node.state(), NodeState::Shutdown);

        wait_for("peer set shrinks", Duration::from_secs(30), || {
            nodes.iter().all(|n| n.node.peers().unwrap().len() == size)
        })
        .await;
        let remaining: Vec<&TestNode> = nodes.iter().collect();
        assert!(peer_sets_agree(&remaining));
        // genesis plus one set per departure
        assert_eq!(nodes[0].node.all_peer_sets().unwrap().len(), 1 + 4 - size);

        let marker = format!("with-{}", size).into_bytes();
        nodes[0].node.submit_transaction(marker.clone()).unwrap();
        wait_for("commit after leave", Duration::from_secs(60), || {
            nodes.iter().all(|n| committed(n, &marker))
        })
        .await;
        busy.abort();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_successive_joins() {
    let network = InmemNetwork::new();
    let genesis = genesis(1);
    let mut nodes = vec![start(&network, 0, &genesis)];

    for i in 1..4 {
        let busy = keep_busy(nodes.iter().map(|n| n.node.clone()).collect(), "grow");
        // Every joiner replays history from the same genesis
        let joiner = start(&network, i, &genesis);
        assert_eq!(joiner.node.state(), NodeState::Joining);
        nodes.push(joiner);

        wait_for("joiner babbling", Duration::from_secs(60), || {
            nodes[i].node.state() == NodeState::Babbling
        })
        .await;
        wait_for("peer set grows everywhere", Duration::from_secs(60), || {
            let all: Vec<&TestNode> = nodes.iter().collect();
            all.iter().all(|n| n.node.peers().unwrap().len() == i + 1) && peer_sets_agree(&all)
        })
        .await;
        assert_eq!(nodes[0].node.all_peer_sets().unwrap().len(), i + 1);

        let marker = format!("from-{}", i).into_bytes();
        nodes[i].node.submit_transaction(marker.clone()).unwrap();
        wait_for("joiner transaction everywhere", Duration::from_secs(60), || {
            nodes.iter().all(|n| committed(n, &marker))
        })
        .await;
        busy.abort();
    }

    shutdown(&nodes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_leave_together() {
    let network = InmemNetwork::new();
    let mut nodes = cluster(&network, 4);
    let second = nodes.pop().unwrap();
    let first = nodes.pop().unwrap();
    let busy = keep_busy(nodes.iter().map(|n| n.node.clone()).collect(), "pair");

    wait_for("cluster warms up", Duration::from_secs(30), || {
        nodes[0].proxy.committed_transactions().len() >= 5
    })
    .await;

    let (a, b) = within("both leaves complete", Duration::from_secs(90), async {
        tokio::join!(first.node.leave(), second.node.leave())
    })
    .await;
    a.unwrap();
    b.unwrap();

    wait_for("peer set of two", Duration::from_secs(30), || {
        nodes.iter().all(|n| n.node.peers().unwrap().len() == 2)
    })
    .await;
    assert!(peer_sets_agree(&nodes.iter().collect::<Vec<_>>()));

    nodes[0].node.submit_transaction(b"pair-gone".to_vec()).unwrap();
    wait_for("commit with two", Duration::from_secs(60), || {
        nodes.iter().all(|n| committed(n, b"pair-gone"))
    })
    .await;
    busy.abort();
    shutdown(&nodes).await;
}

#[tokio::test]
async fn test_last_node_leaves_at_once() {
    let network = InmemNetwork::new();
    let nodes = cluster(&network, 1);
    within("leave", Duration::from_secs(5), nodes[0].node.leave())
        .await
        .unwrap();
    assert_eq!(nodes[0].node.state(), NodeState::Shutdown);
}
