//! Core: the node's own identity around the hashgraph
//!
//! Owns the engine, the pools of transactions waiting for our next event,
//! and our head. The node keeps exactly one `Core` behind a mutex.

use crate::hashgraph::{Hashgraph, HashgraphError, Result};
use crate::storage::Store;
use std::collections::HashSet;
use std::sync::Arc;
use swirl_core::{
    Block, BlockSignature, Bytes32, Event, EventHash, Frame, FrameEvent, InternalTransaction,
    KeyPair, KnownEvents, Peer, PeerId, TransactionKind, WireEvent,
};
use tracing::{debug, warn};

/// Result of inserting a batch of events received from a peer
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub inserted: usize,
    pub rejected: usize,
    /// Rejected because a parent is missing; a sign we are behind
    pub no_parent: usize,
    /// Self-event created after the batch
    pub created: Option<EventHash>,
}

pub struct Core {
    key: KeyPair,
    id: PeerId,
    hg: Hashgraph,
    /// Our last event and its index
    head: Option<(EventHash, u64)>,
    transaction_pool: Vec<Vec<u8>>,
    internal_transaction_pool: Vec<InternalTransaction>,
    block_signature_pool: Vec<BlockSignature>,
}

impl Core {
    pub fn new(key: KeyPair, store: Arc<dyn Store>) -> Result<Self> {
        let id = key.peer_id();
        let hg = Hashgraph::new(store)?;
        let head = hg.last_event_from(id)?;
        Ok(Self {
            key,
            id,
            hg,
            head,
            transaction_pool: Vec::new(),
            internal_transaction_pool: Vec::new(),
            block_signature_pool: Vec::new(),
        })
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn public_key(&self) -> Bytes32 {
        self.key.public_key()
    }

    pub fn hg(&self) -> &Hashgraph {
        &self.hg
    }

    pub fn head(&self) -> Option<EventHash> {
        self.head.map(|(hash, _)| hash)
    }

    /// Index of our last event
    pub fn seq(&self) -> Option<u64> {
        self.head.map(|(_, index)| index)
    }

    /// Whether any peer set of the history includes us; only then can our
    /// events be inserted anywhere
    pub fn is_member(&self) -> bool {
        self.hg.repertoire().contains_key(&self.id)
    }

    /// Replay the store after a restart
    pub fn bootstrap(&mut self) -> Result<Vec<Block>> {
        let blocks = self.hg.bootstrap()?;
        self.head = self.hg.last_event_from(self.id)?;
        Ok(blocks)
    }

    // =========================================================================
    // POOLS
    // =========================================================================

    pub fn add_transactions(&mut self, transactions: Vec<Vec<u8>>) {
        self.transaction_pool.extend(transactions);
    }

    pub fn add_internal_transaction(&mut self, itx: InternalTransaction) {
        self.internal_transaction_pool.push(itx);
    }

    /// Signed membership change about ourselves
    pub fn membership_transaction(
        &self,
        kind: TransactionKind,
        net_addr: &str,
        moniker: &str,
    ) -> swirl_core::Result<InternalTransaction> {
        let peer = Peer::new(self.key.public_key(), net_addr, moniker);
        InternalTransaction::new(kind, peer, &self.key)
    }

    pub fn transaction_pool_len(&self) -> usize {
        self.transaction_pool.len()
    }

    pub fn internal_transaction_pool_len(&self) -> usize {
        self.internal_transaction_pool.len()
    }

    /// Something still has to reach consensus
    pub fn busy(&self) -> Result<bool> {
        Ok(!self.transaction_pool.is_empty()
            || !self.internal_transaction_pool.is_empty()
            || !self.block_signature_pool.is_empty()
            || self.hg.pending_loaded_events()? > 0
            || self.hg.pending_peer_set_change()?)
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Create, sign and insert our next event, carrying everything in the
    /// pools. Returns `None` while we are not part of any peer set.
    pub fn add_self_event(&mut self, other_parent: Option<EventHash>) -> Result<Option<EventHash>> {
        if !self.is_member() {
            return Ok(None);
        }
        let transactions = std::mem::take(&mut self.transaction_pool);
        let internal_transactions = std::mem::take(&mut self.internal_transaction_pool);
        let block_signatures = std::mem::take(&mut self.block_signature_pool);

        let mut event = Event::new(
            transactions,
            internal_transactions,
            block_signatures,
            (self.head(), other_parent),
            self.key.public_key(),
            self.seq().map_or(0, |s| s + 1),
        );
        let inserted = event
            .sign(&self.key)
            .map_err(HashgraphError::from)
            .and_then(|_| self.hg.insert_event(event.clone(), true));

        match inserted {
            Ok(hash) => {
                self.head = Some((hash, event.index()));
                debug!(
                    event = %hash.short(),
                    index = event.index(),
                    txs = event.body.transactions.len(),
                    "created self-event"
                );
                Ok(Some(hash))
            }
            Err(e) => {
                // Put the payload back for the next attempt
                let body = event.body;
                self.transaction_pool.splice(0..0, body.transactions);
                self.internal_transaction_pool
                    .splice(0..0, body.internal_transactions);
                self.block_signature_pool.splice(0..0, body.block_signatures);
                Err(e)
            }
        }
    }

    /// Insert events received from a peer, in order. Invalid events are
    /// skipped; only storage failures abort the batch.
    pub fn insert_events(&mut self, events: Vec<WireEvent>) -> Result<SyncOutcome> {
        let mut outcome = SyncOutcome::default();
        for wire in events {
            let creator = wire.body.creator_id;
            let result = match self.hg.repertoire().get(&creator) {
                Some(peer) => wire
                    .into_event(peer.pub_key)
                    .map_err(HashgraphError::from)
                    .and_then(|event| self.hg.insert_event(event, false)),
                None => Err(HashgraphError::UnknownCreator {
                    event: format!("{}#{}", creator, wire.body.index),
                    creator,
                }),
            };
            match result {
                Ok(_) => outcome.inserted += 1,
                Err(e) if e.is_benign() => {}
                Err(e) if e.is_validation() => {
                    if e.is_no_parent() {
                        outcome.no_parent += 1;
                    }
                    outcome.rejected += 1;
                    debug!(error = %e, "rejected event");
                }
                Err(e) => return Err(e),
            }
        }
        if outcome.rejected > 0 {
            warn!(
                rejected = outcome.rejected,
                no_parent = outcome.no_parent,
                "events rejected during sync"
            );
        }
        // Our own events may come back to us after a restart
        self.head = self.hg.last_event_from(self.id)?;
        Ok(outcome)
    }

    /// Insert a Sync response, then record the exchange with a self-event
    /// whose other-parent is `from`'s last event
    pub fn sync(&mut self, from: PeerId, events: Vec<WireEvent>) -> Result<SyncOutcome> {
        let mut outcome = self.insert_events(events)?;
        let other_head = self.hg.last_event_from(from)?.map(|(hash, _)| hash);
        outcome.created = self.add_self_event(other_head)?;
        Ok(outcome)
    }

    pub fn known_events(&self) -> Result<KnownEvents> {
        self.hg.known_events()
    }

    // =========================================================================
    // CONSENSUS
    // =========================================================================

    pub fn run_consensus(&mut self) -> Result<Vec<Block>> {
        self.hg.run_consensus()
    }

    /// Record the application state hash of a committed block, sign it and
    /// queue the signature for our next event
    pub fn commit_block(&mut self, index: u64, state_hash: Bytes32) -> Result<Block> {
        let block = self.hg.commit_block_state(index, state_hash)?;
        let sig = block.sign(&self.key)?;
        self.hg.add_block_signature(sig.clone())?;
        self.block_signature_pool.push(sig);
        Ok(block)
    }

    /// Anchor block, its frame and the horizon above it, for a FastForward
    /// response
    pub fn fast_forward_state(&self) -> Result<Option<(Block, Frame, Vec<FrameEvent>)>> {
        let Some(block) = self.hg.anchor_block()? else {
            return Ok(None);
        };
        let frame = self
            .hg
            .get_frame(block.round_received())?
            .ok_or_else(|| HashgraphError::MissingEvent(format!("frame {}", block.round_received())))?;
        let horizon = self.hg.horizon(&frame)?;
        Ok(Some((block, frame, horizon)))
    }

    /// Verify and adopt a peer's consensus state
    pub fn fast_forward(&mut self, block: Block, frame: Frame, horizon: Vec<FrameEvent>) -> Result<()> {
        Hashgraph::verify_fast_forward(&block, &frame)?;
        self.hg.reset(block, frame, horizon)?;
        self.head = self.hg.last_event_from(self.id)?;
        // Signatures for blocks we will never build
        self.block_signature_pool.clear();
        Ok(())
    }

    /// Peers to gossip with, without us: the peer set in effect for the
    /// next undecided round together with the latest one. Peers on their way
    /// out keep voting until the change is in effect, and joiners are
    /// contacted as soon as their addition is decided.
    pub fn gossip_targets(&self) -> Result<Vec<Peer>> {
        let next_round = self.hg.last_consensus_round().map_or(0, |r| r + 1);
        let effective = self.hg.peer_set(next_round)?;
        let latest = self.hg.latest_peer_set()?;

        let mut seen = HashSet::new();
        Ok(effective
            .into_peers()
            .into_iter()
            .chain(latest.into_peers())
            .filter(|p| p.id != self.id && seen.insert(p.id))
            .collect())
    }
}
