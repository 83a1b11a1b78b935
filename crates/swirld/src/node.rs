//! swirld node: gossip, RPC and consensus workers around a [`Core`]
//!
//! Three tasks run per node:
//! - the gossip ticker, which acts on the current [`NodeState`] every heartbeat
//! - the RPC worker, answering inbound requests, one task per request
//! - the consensus worker, woken whenever new events were inserted
//!
//! The core mutex is never held across an await.

use crate::core::Core;
use crate::hashgraph::{Hashgraph, HashgraphError, HashgraphStats};
use crate::membership::{join_outcome, JoinOutcome, MembershipManager};
use crate::proxy::{AppProxy, ProxyError};
use crate::state::{NodeState, StateError, StateEvent, StateMachine};
use crate::storage::Store;
use crate::sync::{known_gap, SyncError, SyncManager, SyncStats};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use swirl_core::{KeyPair, Peer, PeerId, PeerSet, TransactionKind};
use swirl_net::{
    Command, CommandResponse, EagerSyncRequest, EagerSyncResponse, FastForwardRequest,
    FastForwardResponse, JoinRequest, JoinResponse, Rpc, SyncRequest, SyncResponse, Transport,
    TransportError,
};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Consecutive syncs with missing parents before we consider ourselves behind
const NO_PARENT_LIMIT: u32 = 3;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Hashgraph error: {0}")]
    Hashgraph(#[from] HashgraphError),
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Application error: {0}")]
    Proxy(#[from] ProxyError),
    #[error("State error: {0}")]
    State(#[from] StateError),
    #[error("Core error: {0}")]
    Core(#[from] swirl_core::Error),
    #[error("No peers to gossip with")]
    NoPeers,
    #[error("No anchor block to fast-forward to")]
    NoAnchor,
    #[error("Snapshot does not match the state hash of block {0}")]
    SnapshotMismatch(u64),
    #[error("Join rejected by {0}")]
    JoinRejected(String),
    #[error("Join request timed out")]
    JoinTimeout,
    #[error("Node is shut down")]
    ShutDown,
}

impl NodeError {
    /// The node cannot continue: its store failed
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NodeError::Hashgraph(HashgraphError::Store(_))
                | NodeError::Sync(SyncError::Hashgraph(HashgraphError::Store(_)))
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Gossip period
    pub heartbeat: Duration,
    /// Maximum events per Sync response
    pub sync_limit: usize,
    /// Catch up from a peer's anchor block instead of replaying history
    pub enable_fast_sync: bool,
    /// Events we may lag behind a peer before switching to CatchingUp
    pub catch_up_threshold: u64,
    /// How long a member waits for a joiner's PeerAdd to be committed
    pub join_timeout: Duration,
    /// Undecided rounds tolerated before reporting a consensus stall
    pub fame_liveness_bound: u64,
    pub moniker: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_millis(50),
            sync_limit: 1000,
            enable_fast_sync: false,
            catch_up_threshold: 1000,
            join_timeout: Duration::from_secs(10),
            fame_liveness_bound: 20,
            moniker: String::new(),
        }
    }
}

/// Node statistics
#[derive(Debug, Clone)]
pub struct NodeStats {
    pub id: PeerId,
    pub state: NodeState,
    pub hashgraph: HashgraphStats,
    pub sync: SyncStats,
    pub transaction_pool: usize,
    pub internal_transaction_pool: usize,
    pub pending_joins: usize,
    /// Set while the oldest undecided round lags too far behind
    pub consensus_stall: Option<String>,
    /// Size of the latest peer set
    pub peers: usize,
}

pub struct Node {
    config: NodeConfig,
    id: PeerId,
    core: Mutex<Core>,
    transport: Arc<dyn Transport>,
    proxy: Arc<dyn AppProxy>,
    sync: SyncManager,
    membership: MembershipManager,
    state: StateMachine,
    shutdown_tx: broadcast::Sender<()>,
    consensus_tx: mpsc::Sender<()>,
    consensus_rx: Mutex<Option<mpsc::Receiver<()>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    no_parent_streak: AtomicU32,
    consensus_stall: Mutex<Option<String>>,
}

impl Node {
    /// Build a node over `store`. Events already in the store are replayed
    /// and the resulting blocks handed to the application again.
    pub fn new(
        config: NodeConfig,
        key: KeyPair,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        proxy: Arc<dyn AppProxy>,
    ) -> Result<Arc<Self>, NodeError> {
        let mut core = Core::new(key, store)?;
        let blocks = core.bootstrap()?;
        if let Some(index) = core.hg().base_block() {
            // History below a fast-forward is gone; the application has to
            // bring back its own state at that block
            let base = core.hg().get_block(index)?.ok_or(NodeError::NoAnchor)?;
            let snapshot = proxy.get_snapshot(index)?;
            if proxy.restore(&snapshot)? != base.body.state_hash {
                return Err(NodeError::SnapshotMismatch(index));
            }
            info!(block = index, "application restored at fast-forward block");
        }
        for block in blocks {
            let state_hash = proxy.commit_block(&block)?;
            core.commit_block(block.index(), state_hash)?;
        }

        let initial = if core.is_member() {
            NodeState::Babbling
        } else {
            NodeState::Joining
        };
        let id = core.id();
        info!(%id, moniker = %config.moniker, addr = %transport.local_addr(), state = %initial, "node created");

        let (shutdown_tx, _) = broadcast::channel(1);
        let (consensus_tx, consensus_rx) = mpsc::channel(1);
        Ok(Arc::new(Self {
            sync: SyncManager::new(config.sync_limit),
            config,
            id,
            core: Mutex::new(core),
            transport,
            proxy,
            membership: MembershipManager::new(),
            state: StateMachine::new(initial),
            shutdown_tx,
            consensus_tx,
            consensus_rx: Mutex::new(Some(consensus_rx)),
            handles: Mutex::new(Vec::new()),
            no_parent_streak: AtomicU32::new(0),
            consensus_stall: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn state(&self) -> NodeState {
        self.state.current()
    }

    pub fn subscribe_state(&self) -> tokio::sync::watch::Receiver<NodeState> {
        self.state.subscribe()
    }

    /// Start the workers. Fails if the node was already started.
    pub fn run(self: &Arc<Self>) -> Result<(), NodeError> {
        let rpcs = self.transport.consumer().ok_or(NodeError::ShutDown)?;
        let blocks = self.consensus_rx.lock().take().ok_or(NodeError::ShutDown)?;

        // Subscribed before spawning so a shutdown sent right away still
        // reaches every worker
        let mut handles = self.handles.lock();
        handles.push(tokio::spawn(
            self.clone().gossip_loop(self.shutdown_tx.subscribe()),
        ));
        handles.push(tokio::spawn(
            self.clone().rpc_loop(rpcs, self.shutdown_tx.subscribe()),
        ));
        handles.push(tokio::spawn(
            self.clone().consensus_loop(blocks, self.shutdown_tx.subscribe()),
        ));
        info!(id = %self.id, state = %self.state(), "node running");
        Ok(())
    }

    /// Queue an application transaction for our next event
    pub fn submit_transaction(&self, tx: Vec<u8>) -> Result<(), NodeError> {
        if self.state().is_terminal() {
            return Err(NodeError::ShutDown);
        }
        self.core.lock().add_transactions(vec![tx]);
        Ok(())
    }

    /// Leave the network politely: submit a PeerRemove for ourselves and
    /// shut down once the peer set without us is in effect
    pub async fn leave(&self) -> Result<(), NodeError> {
        let removal = {
            let mut core = self.core.lock();
            let latest = core.hg().latest_peer_set()?;
            if !latest.contains(self.id) || latest.len() <= 1 {
                None
            } else {
                let itx = core.membership_transaction(
                    TransactionKind::PeerRemove,
                    &self.transport.local_addr(),
                    &self.config.moniker,
                )?;
                core.add_internal_transaction(itx.clone());
                Some(itx)
            }
        };

        match removal {
            Some(itx) => {
                self.membership.begin_leave(&itx)?;
                self.state.fire(StateEvent::LeaveRequested)?;
                info!(id = %self.id, "leave requested");
            }
            None => {
                self.membership.leave_now();
                if self.state.fire(StateEvent::LeaveRequested).is_ok() {
                    self.state.fire(StateEvent::LeaveCompleted)?;
                } else {
                    self.state.fire(StateEvent::Shutdown)?;
                }
            }
        }

        self.stopped().await;
        self.shutdown().await;
        Ok(())
    }

    /// Stop the workers and close the transport
    pub async fn shutdown(&self) {
        let _ = self.state.fire(StateEvent::Shutdown);
        self.halt().await;
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }
        info!(id = %self.id, "node stopped");
    }

    /// Resolves once the node reached Shutdown
    pub async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| state.is_terminal()).await;
    }

    pub fn peers(&self) -> Result<Vec<Peer>, NodeError> {
        Ok(self.core.lock().hg().latest_peer_set()?.into_peers())
    }

    pub fn all_peer_sets(&self) -> Result<BTreeMap<u64, PeerSet>, NodeError> {
        Ok(self.core.lock().hg().all_peer_sets()?)
    }

    pub fn stats(&self) -> Result<NodeStats, NodeError> {
        let core = self.core.lock();
        Ok(NodeStats {
            id: self.id,
            state: self.state(),
            hashgraph: core.hg().stats()?,
            sync: self.sync.stats(),
            transaction_pool: core.transaction_pool_len(),
            internal_transaction_pool: core.internal_transaction_pool_len(),
            pending_joins: self.membership.pending_promises(),
            consensus_stall: self.consensus_stall.lock().clone(),
            peers: core.hg().latest_peer_set()?.len(),
        })
    }

    async fn halt(&self) {
        let _ = self.shutdown_tx.send(());
        self.transport.close().await;
    }

    fn trigger_consensus(&self) {
        // A full channel already has a pass pending
        let _ = self.consensus_tx.try_send(());
    }

    // =========================================================================
    // GOSSIP
    // =========================================================================

    async fn gossip_loop(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = interval(self.config.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        result = self.heartbeat() => {
                            if let Err(e) = result {
                                if e.is_fatal() {
                                    error!(id = %self.id, error = %e, "gossip failed");
                                    let _ = self.state.fire(StateEvent::Shutdown);
                                    self.halt().await;
                                    break;
                                }
                                match e {
                                    NodeError::NoPeers | NodeError::Transport(_) => {
                                        debug!(id = %self.id, error = %e, "heartbeat")
                                    }
                                    _ => warn!(id = %self.id, error = %e, "heartbeat"),
                                }
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
        debug!(id = %self.id, "gossip loop stopped");
    }

    async fn heartbeat(&self) -> Result<(), NodeError> {
        match self.state() {
            NodeState::Babbling => self.babble().await,
            NodeState::Leaving => {
                let lcr = self.core.lock().hg().last_consensus_round();
                if self.membership.leave_complete(lcr) {
                    self.state.fire(StateEvent::LeaveCompleted)?;
                    self.halt().await;
                    return Ok(());
                }
                self.babble().await
            }
            NodeState::CatchingUp => self.catch_up().await,
            NodeState::Joining => self.join().await,
            NodeState::Shutdown => Ok(()),
        }
    }

    /// One round of gossip: pull from a random peer, record the exchange
    /// with a self-event, then push back what the peer is missing
    async fn babble(&self) -> Result<(), NodeError> {
        let (busy, targets, known) = {
            let core = self.core.lock();
            (core.busy()?, core.gossip_targets()?, core.known_events()?)
        };
        self.sync.retain(&targets);
        if !busy {
            return Ok(());
        }

        if targets.is_empty() {
            // Alone in the peer set
            if self.core.lock().add_self_event(None)?.is_some() {
                self.trigger_consensus();
            }
            return Ok(());
        }

        let peer = self.sync.select_peer(&targets).ok_or(NodeError::NoPeers)?;
        let request = SyncRequest {
            from_id: self.id,
            known,
        };
        let resp = match self.transport.sync(&peer.net_addr, request).await {
            Ok(resp) => resp,
            Err(e) => {
                self.sync.record_failure(peer.id);
                return Err(e.into());
            }
        };

        let SyncResponse {
            events,
            known: their_known,
            ..
        } = resp;
        if self.state() == NodeState::Babbling {
            let ours = self.core.lock().known_events()?;
            let gap = known_gap(&ours, &their_known);
            if gap > self.config.catch_up_threshold {
                info!(id = %self.id, peer = %peer.id, gap, "fell behind");
                self.state.fire(StateEvent::FellBehind)?;
                return Ok(());
            }
        }

        let received = events.len();
        let outcome = self.core.lock().sync(peer.id, events)?;
        if outcome.inserted > 0 || outcome.created.is_some() {
            self.trigger_consensus();
        }
        debug!(
            id = %self.id,
            peer = %peer.id,
            received,
            inserted = outcome.inserted,
            created = outcome.created.is_some(),
            "pulled"
        );
        self.check_no_parent(outcome.no_parent)?;

        let (events, _) = {
            let core = self.core.lock();
            self.sync.event_diff(core.hg(), &their_known)?
        };
        if !events.is_empty() {
            let push = EagerSyncRequest {
                from_id: self.id,
                events,
            };
            match self.transport.eager_sync(&peer.net_addr, push).await {
                Ok(EagerSyncResponse { success: false, .. }) => {
                    debug!(id = %self.id, peer = %peer.id, "peer rejected part of our push")
                }
                Ok(_) => {}
                Err(e) => {
                    self.sync.record_failure(peer.id);
                    return Err(e.into());
                }
            }
        }
        self.sync.record_success(peer.id);
        Ok(())
    }

    /// Events whose parents we keep missing mean we are behind
    fn check_no_parent(&self, no_parent: usize) -> Result<(), NodeError> {
        if no_parent == 0 {
            self.no_parent_streak.store(0, Ordering::Relaxed);
            return Ok(());
        }
        let streak = self.no_parent_streak.fetch_add(1, Ordering::Relaxed) + 1;
        if streak >= NO_PARENT_LIMIT && self.state() == NodeState::Babbling {
            self.no_parent_streak.store(0, Ordering::Relaxed);
            info!(id = %self.id, streak, "missing parents, catching up");
            self.state.fire(StateEvent::FellBehind)?;
        }
        Ok(())
    }

    /// Fast-forward if enabled, then pull until a peer has nothing more
    /// for us
    async fn catch_up(&self) -> Result<(), NodeError> {
        let targets = self.core.lock().gossip_targets()?;
        let peer = self.sync.select_peer(&targets).ok_or(NodeError::NoPeers)?;

        if self.config.enable_fast_sync {
            if let Err(e) = self.fast_forward(&peer).await {
                self.sync.record_failure(peer.id);
                return Err(e);
            }
        }

        loop {
            let known = self.core.lock().known_events()?;
            let request = SyncRequest {
                from_id: self.id,
                known,
            };
            let resp = match self.transport.sync(&peer.net_addr, request).await {
                Ok(resp) => resp,
                Err(e) => {
                    self.sync.record_failure(peer.id);
                    return Err(e.into());
                }
            };
            let outcome = self.core.lock().insert_events(resp.events)?;
            if outcome.inserted > 0 {
                self.trigger_consensus();
            }
            debug!(id = %self.id, peer = %peer.id, inserted = outcome.inserted, "catching up");
            self.sync.record_success(peer.id);
            if !resp.sync_limit {
                break;
            }
        }

        self.state.fire(StateEvent::CaughtUp)?;
        Ok(())
    }

    async fn fast_forward(&self, peer: &Peer) -> Result<(), NodeError> {
        let request = FastForwardRequest { from_id: self.id };
        let FastForwardResponse {
            block,
            frame,
            snapshot,
            horizon,
            ..
        } = self.transport.fast_forward(&peer.net_addr, request).await?;

        // Check the block before touching the application
        Hashgraph::verify_fast_forward(&block, &frame)?;
        let restored = self.proxy.restore(&snapshot)?;
        if restored != block.body.state_hash {
            return Err(NodeError::SnapshotMismatch(block.index()));
        }

        let index = block.index();
        let round = frame.round;
        self.core.lock().fast_forward(block, frame, horizon)?;
        info!(id = %self.id, peer = %peer.id, block = index, round, "fast-forwarded");
        Ok(())
    }

    /// Ask a member to add us to the peer set
    async fn join(&self) -> Result<(), NodeError> {
        let (itx, targets) = {
            let core = self.core.lock();
            let itx = core.membership_transaction(
                TransactionKind::PeerAdd,
                &self.transport.local_addr(),
                &self.config.moniker,
            )?;
            (itx, core.gossip_targets()?)
        };
        let peer = self.sync.select_peer(&targets).ok_or(NodeError::NoPeers)?;
        info!(id = %self.id, peer = %peer.id, "requesting to join");

        let request = JoinRequest {
            internal_transaction: itx,
        };
        let resp = match self.transport.join(&peer.net_addr, request).await {
            Ok(resp) => resp,
            Err(e) => {
                self.sync.record_failure(peer.id);
                return Err(e.into());
            }
        };
        if !resp.accepted {
            return Err(NodeError::JoinRejected(peer.moniker));
        }

        info!(
            id = %self.id,
            accepted_round = resp.accepted_round,
            peers = resp.peers.len(),
            "join accepted"
        );
        self.state.fire(StateEvent::JoinAccepted)?;
        Ok(())
    }

    // =========================================================================
    // RPC
    // =========================================================================

    async fn rpc_loop(
        self: Arc<Self>,
        mut rpcs: mpsc::Receiver<Rpc>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                rpc = rpcs.recv() => match rpc {
                    Some(rpc) => {
                        let node = self.clone();
                        tasks.spawn(async move { node.process_rpc(rpc).await });
                    }
                    None => break,
                },
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                _ = shutdown_rx.recv() => break,
            }
        }
        tasks.shutdown().await;
        debug!(id = %self.id, "rpc loop stopped");
    }

    async fn process_rpc(&self, rpc: Rpc) {
        let (command, responder) = rpc.into_parts();
        let name = command.name();
        let result = match command {
            Command::Sync(req) => self.on_sync(req),
            Command::EagerSync(req) => self.on_eager_sync(req),
            Command::FastForward(req) => self.on_fast_forward(req),
            Command::Join(req) => self.on_join(req).await,
        };
        if let Err(e) = &result {
            debug!(id = %self.id, cmd = name, error = %e, "request failed");
        }
        responder.respond(result.map_err(|e| e.to_string()));
    }

    fn on_sync(&self, req: SyncRequest) -> Result<CommandResponse, NodeError> {
        let core = self.core.lock();
        let (events, sync_limit) = self.sync.event_diff(core.hg(), &req.known)?;
        debug!(id = %self.id, from = %req.from_id, events = events.len(), "serving sync");
        Ok(CommandResponse::Sync(SyncResponse {
            from_id: self.id,
            sync_limit,
            events,
            known: core.known_events()?,
        }))
    }

    fn on_eager_sync(&self, req: EagerSyncRequest) -> Result<CommandResponse, NodeError> {
        let outcome = self.core.lock().insert_events(req.events)?;
        if outcome.inserted > 0 {
            self.trigger_consensus();
        }
        Ok(CommandResponse::EagerSync(EagerSyncResponse {
            from_id: self.id,
            success: outcome.rejected == 0,
        }))
    }

    fn on_fast_forward(&self, req: FastForwardRequest) -> Result<CommandResponse, NodeError> {
        let (block, frame, horizon) = self
            .core
            .lock()
            .fast_forward_state()?
            .ok_or(NodeError::NoAnchor)?;
        let snapshot = self.proxy.get_snapshot(block.index())?;
        info!(id = %self.id, to = %req.from_id, block = block.index(), "serving fast-forward");
        Ok(CommandResponse::FastForward(Box::new(FastForwardResponse {
            from_id: self.id,
            block,
            frame,
            snapshot,
            horizon,
        })))
    }

    /// Submit the joiner's PeerAdd and answer once it is committed
    async fn on_join(&self, req: JoinRequest) -> Result<CommandResponse, NodeError> {
        let itx = req.internal_transaction;
        if itx.body.kind != TransactionKind::PeerAdd {
            return Err(NodeError::JoinRejected("not a PeerAdd".to_string()));
        }
        itx.verify()?;
        let subject = itx.body.peer.id;

        let waiting = {
            let mut core = self.core.lock();
            let outcome = join_outcome(subject, &core.hg().all_peer_sets()?);
            if outcome.accepted {
                None
            } else {
                let hash = itx.hash()?;
                let rx = self.membership.promise(hash);
                core.add_internal_transaction(itx);
                Some((hash, rx))
            }
        };

        let outcome = match waiting {
            // Already a member
            None => join_outcome(subject, &self.all_peer_sets()?),
            Some((hash, rx)) => {
                info!(id = %self.id, peer = %subject, "join request submitted");
                let waited = tokio::time::timeout(self.config.join_timeout, rx).await;
                match waited {
                    Ok(outcome) => outcome.map_err(|_| NodeError::ShutDown)?,
                    Err(_) => {
                        self.membership.abandon(&hash);
                        return Err(NodeError::JoinTimeout);
                    }
                }
            }
        };
        Ok(CommandResponse::Join(self.join_response(outcome)))
    }

    fn join_response(&self, outcome: JoinOutcome) -> JoinResponse {
        JoinResponse {
            from_id: self.id,
            accepted: outcome.accepted,
            accepted_round: outcome.accepted_round,
            peers: outcome.peers,
        }
    }

    // =========================================================================
    // CONSENSUS
    // =========================================================================

    async fn consensus_loop(
        self: Arc<Self>,
        mut wakeups: mpsc::Receiver<()>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                Some(()) = wakeups.recv() => {
                    if let Err(e) = self.process_consensus() {
                        if e.is_fatal() {
                            error!(id = %self.id, error = %e, "consensus failed");
                            let _ = self.state.fire(StateEvent::Shutdown);
                            self.halt().await;
                            break;
                        }
                        warn!(id = %self.id, error = %e, "consensus");
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
        debug!(id = %self.id, "consensus loop stopped");
    }

    /// Run consensus and hand new blocks to the application in order
    fn process_consensus(&self) -> Result<(), NodeError> {
        let blocks = self.core.lock().run_consensus()?;
        for block in blocks {
            let state_hash = self.proxy.commit_block(&block)?;
            let (block, peer_sets) = {
                let mut core = self.core.lock();
                let block = core.commit_block(block.index(), state_hash)?;
                (block, core.hg().all_peer_sets()?)
            };
            self.membership.on_block(&block, &peer_sets);
            info!(
                id = %self.id,
                block = block.index(),
                round_received = block.round_received(),
                txs = block.transactions().len(),
                "block committed"
            );
        }

        let liveness = self
            .core
            .lock()
            .hg()
            .check_liveness(self.config.fame_liveness_bound);
        match liveness {
            Ok(()) => *self.consensus_stall.lock() = None,
            Err(e) if e.is_stall() => {
                warn!(id = %self.id, error = %e, "consensus is not progressing");
                *self.consensus_stall.lock() = Some(e.to_string());
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}
