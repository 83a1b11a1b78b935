//! Cluster helpers shared by the integration tests: nodes wired over an
//! in-memory network, with short heartbeats.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use swirl_core::{KeyPair, Peer, PeerSet};
use swirl_net::{InmemNetwork, InmemTransport};
use swirld::{InmemAppProxy, InmemStore, Node, NodeConfig, NodeState, Store};
use tokio::task::JoinHandle;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestNode {
    pub node: Arc<Node>,
    pub proxy: Arc<InmemAppProxy>,
    pub addr: String,
}

pub fn key(i: usize) -> KeyPair {
    KeyPair::from_seed(&[i as u8 + 1; 32])
}

pub fn addr(i: usize) -> String {
    format!("node{}", i)
}

pub fn genesis(n: usize) -> PeerSet {
    PeerSet::new(
        (0..n)
            .map(|i| Peer::new(key(i).public_key(), addr(i), addr(i)))
            .collect(),
    )
}

pub fn config(i: usize) -> NodeConfig {
    NodeConfig {
        heartbeat: Duration::from_millis(10),
        join_timeout: JOIN_TIMEOUT,
        moniker: addr(i),
        ..Default::default()
    }
}

/// Start node `i` on `network` over `store`
pub fn start_with(
    network: &Arc<InmemNetwork>,
    i: usize,
    config: NodeConfig,
    store: Arc<dyn Store>,
) -> TestNode {
    let transport = InmemTransport::new(network.clone(), addr(i), REQUEST_TIMEOUT)
        .with_join_timeout(JOIN_TIMEOUT);
    let proxy = Arc::new(InmemAppProxy::new());
    let node = Node::new(config, key(i), store, Arc::new(transport), proxy.clone()).unwrap();
    node.run().unwrap();
    TestNode {
        node,
        proxy,
        addr: addr(i),
    }
}

pub fn start(network: &Arc<InmemNetwork>, i: usize, genesis: &PeerSet) -> TestNode {
    start_with(network, i, config(i), Arc::new(InmemStore::new(genesis)))
}

/// Start `n` genesis nodes
pub fn cluster(network: &Arc<InmemNetwork>, n: usize) -> Vec<TestNode> {
    let genesis = genesis(n);
    (0..n).map(|i| start(network, i, &genesis)).collect()
}

/// Poll `check` until it holds; panics after `limit`
pub async fn wait_for(what: &str, limit: Duration, mut check: impl FnMut() -> bool) {
    let result = tokio::time::timeout(limit, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {}", what);
}

pub async fn within<T>(what: &str, limit: Duration, fut: impl Future<Output = T>) -> T {
    match tokio::time::timeout(limit, fut).await {
        Ok(value) => value,
        Err(_) => panic!("timed out waiting for {}", what),
    }
}

/// Submit a transaction to one of `nodes` every few milliseconds so the
/// cluster keeps gossiping
pub fn keep_busy(nodes: Vec<Arc<Node>>, tag: &'static str) -> JoinHandle<()> {
    tokio::spawn(async move {
        for i in 0.. {
            let node = &nodes[i % nodes.len()];
            if node.state() != NodeState::Shutdown {
                let _ = node.submit_transaction(format!("{}-{}", tag, i).into_bytes());
            }
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
    })
}

pub fn committed(node: &TestNode, tx: &[u8]) -> bool {
    node.proxy
        .committed_transactions()
        .iter()
        .any(|t| t.as_slice() == tx)
}

pub async fn shutdown(nodes: &[TestNode]) {
    for n in nodes {
        n.node.shutdown().await;
    }
}
