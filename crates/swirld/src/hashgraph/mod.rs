//! Hashgraph consensus engine
//!
//! Events are inserted one at a time (parents first). Consensus then runs in
//! four phases over the newly inserted events:
//!
//! 1. [`Hashgraph::divide_rounds`]: round and witness flag of each event
//! 2. [`Hashgraph::decide_fame`]: virtual voting on the witnesses of pending rounds
//! 3. [`Hashgraph::decide_round_received`]: round received and consensus timestamp
//! 4. [`Hashgraph::process_decided_rounds`]: ordering, frames, blocks and
//!    membership changes
//!
//! All state lives in the [`Store`]; the engine only keeps the indexes needed
//! to resume work (undetermined events, pending rounds, watermarks).

mod ordering;
mod record;
mod round;
mod voting;

pub use record::EventRecord;
pub use round::{Fame, RoundInfo};

use crate::storage::{InmemStore, Store, StoreError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use swirl_core::{
    Block, BlockSignature, Event, EventHash, Frame, FrameEvent, KnownEvents, Peer, PeerId,
    PeerSet,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Every `COIN_ROUND_FREQ` rounds of voting, undecided voters flip a coin
pub const COIN_ROUND_FREQ: u64 = 4;

/// Rounds between the round a membership change is received in and the
/// round its peer set takes effect
pub const PEER_SET_ACTIVATION_DELAY: u64 = 6;

/// Page size when walking the topological order
const TOPOLOGICAL_PAGE: usize = 1000;

/// Events per peer and per round a healthy network needs at most before the
/// last consensus round moves; scales the liveness bound
const EVENTS_PER_ROUND: u64 = 4;

#[derive(Debug, Error)]
pub enum HashgraphError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Core error: {0}")]
    Core(#[from] swirl_core::Error),
    #[error("Event {0} already known")]
    OldEvent(String),
    #[error("Event {event} references unknown parent {parent}")]
    NoParent { event: String, parent: String },
    #[error("Event {event} created by unknown peer {creator}")]
    UnknownCreator { event: String, creator: PeerId },
    #[error("Event {0} has an invalid signature")]
    InvalidSignature(String),
    #[error("Event {event} has index {got}, expected {expected}")]
    BadIndex { event: String, expected: u64, got: u64 },
    #[error("Self-parent of event {0} is not its creator's last event")]
    SelfParentMismatch(String),
    #[error("Event {0} missing from store")]
    MissingEvent(String),
    #[error("Consensus stalled: round {pending} undecided, last round {last}")]
    ConsensusStall { pending: u64, last: u64 },
    #[error("Consensus stalled: {events} events inserted since last consensus round {last_consensus_round:?}")]
    NoProgress {
        events: u64,
        last_consensus_round: Option<u64>,
    },
    #[error("Fast-forward rejected: {0}")]
    InvalidFastForward(String),
}

impl HashgraphError {
    /// Replay of an event we already hold
    pub fn is_benign(&self) -> bool {
        matches!(self, HashgraphError::OldEvent(_))
    }

    /// The event is rejected but the engine is unaffected
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            HashgraphError::NoParent { .. }
                | HashgraphError::UnknownCreator { .. }
                | HashgraphError::InvalidSignature(_)
                | HashgraphError::BadIndex { .. }
                | HashgraphError::SelfParentMismatch(_)
                | HashgraphError::Core(_)
        )
    }

    pub fn is_no_parent(&self) -> bool {
        matches!(self, HashgraphError::NoParent { .. })
    }

    /// Raised by [`Hashgraph::check_liveness`]
    pub fn is_stall(&self) -> bool {
        matches!(
            self,
            HashgraphError::ConsensusStall { .. } | HashgraphError::NoProgress { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HashgraphError>;

/// Engine counters, exposed through node stats
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HashgraphStats {
    pub last_round: Option<u64>,
    pub last_consensus_round: Option<u64>,
    pub first_consensus_round: Option<u64>,
    pub pending_rounds: usize,
    pub undetermined_events: usize,
    pub consensus_events: u64,
    pub consensus_transactions: u64,
    pub last_block_index: Option<u64>,
    pub anchor_block: Option<u64>,
}

pub struct Hashgraph {
    store: Arc<dyn Store>,
    /// Every peer of every peer set
    repertoire: BTreeMap<PeerId, Peer>,
    /// Inserted events still waiting for a round
    undivided: Vec<EventHash>,
    /// Events without a round received, in topological order
    undetermined: Vec<EventHash>,
    /// Rounds above the last consensus round
    pending_rounds: BTreeSet<u64>,
    /// Round received -> events, filled before the round is processed
    received: BTreeMap<u64, Vec<EventHash>>,
    /// Per creator, index and hash of its last event with a round received
    roots: BTreeMap<PeerId, (u64, EventHash)>,
    last_consensus_round: Option<u64>,
    first_consensus_round: Option<u64>,
    next_block_index: u64,
    last_committed_block: Option<u64>,
    anchor_block: Option<u64>,
    /// Block we were last reset to; history below it is not held
    base_block: Option<u64>,
    /// Events inserted since the last consensus round moved
    events_since_decision: u64,
    /// Signatures for blocks not yet built or not yet committed locally
    pending_signatures: Vec<BlockSignature>,
    topological_index: u64,
    consensus_events: u64,
    consensus_transactions: u64,
}

impl Hashgraph {
    /// Engine over an empty store seeded with the genesis peer set
    pub fn new(store: Arc<dyn Store>) -> Result<Self> {
        let repertoire = store.repertoire()?;
        let topological_index = store.event_count()?;
        Ok(Self {
            store,
            repertoire,
            undivided: Vec::new(),
            undetermined: Vec::new(),
            pending_rounds: BTreeSet::new(),
            received: BTreeMap::new(),
            roots: BTreeMap::new(),
            last_consensus_round: None,
            first_consensus_round: None,
            next_block_index: 0,
            last_committed_block: None,
            anchor_block: None,
            base_block: None,
            events_since_decision: 0,
            pending_signatures: Vec::new(),
            topological_index,
            consensus_events: 0,
            consensus_transactions: 0,
        })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // =========================================================================
    // INSERTION
    // =========================================================================

    /// Validate and insert one event. Parents must already be present.
    ///
    /// With `set_wire_info` the wire projection is cached on the record so
    /// later syncs do not rebuild it.
    pub fn insert_event(&mut self, event: Event, set_wire_info: bool) -> Result<EventHash> {
        let hash = event.hash()?;
        let short = hash.short();
        if self.store.get_event(&hash)?.is_some() {
            return Err(HashgraphError::OldEvent(short));
        }

        let creator = event.creator_id();
        match self.repertoire.get(&creator) {
            Some(peer) if peer.pub_key == event.body.creator => {}
            _ => return Err(HashgraphError::UnknownCreator { event: short, creator }),
        }
        event
            .verify()
            .map_err(|_| HashgraphError::InvalidSignature(short.clone()))?;

        match self.store.last_event_from(creator)? {
            Some((last_hash, last_index)) => {
                if event.index() <= last_index {
                    return Err(HashgraphError::OldEvent(short));
                }
                if event.index() != last_index + 1 {
                    return Err(HashgraphError::BadIndex {
                        event: short,
                        expected: last_index + 1,
                        got: event.index(),
                    });
                }
                if event.self_parent() != Some(last_hash) {
                    return Err(HashgraphError::SelfParentMismatch(short));
                }
            }
            None => {
                if let Some(parent) = event.self_parent() {
                    return Err(HashgraphError::NoParent {
                        event: short,
                        parent: parent.short(),
                    });
                }
                if event.index() != 0 {
                    return Err(HashgraphError::BadIndex {
                        event: short,
                        expected: 0,
                        got: event.index(),
                    });
                }
            }
        }

        let mut record = EventRecord::new(event, self.topological_index)?;
        let parents = [record.event.self_parent(), record.event.other_parent()];
        for parent in parents.into_iter().flatten() {
            let parent_record =
                self.store
                    .get_event(&parent)?
                    .ok_or_else(|| HashgraphError::NoParent {
                        event: short.clone(),
                        parent: parent.short(),
                    })?;
            for (peer, index) in parent_record.last_ancestors {
                let entry = record.last_ancestors.entry(peer).or_insert(index);
                *entry = (*entry).max(index);
            }
        }
        if set_wire_info {
            record.wire = Some(record.event.to_wire());
        }

        self.store.set_event(&record)?;
        self.topological_index += 1;
        self.events_since_decision += 1;
        self.undivided.push(hash);
        self.undetermined.push(hash);
        debug!(event = %short, creator = %creator, index = record.index(), "inserted event");

        for sig in record.event.body.block_signatures {
            self.add_block_signature(sig)?;
        }
        Ok(hash)
    }

    /// Insert an event with metadata computed elsewhere, skipping parent
    /// checks. Used when resuming from a frame.
    fn insert_detached(&mut self, fe: FrameEvent, frame_round: u64) -> Result<()> {
        let hash = fe.event.hash()?;
        if self.store.get_event(&hash)?.is_some() {
            return Ok(());
        }
        let short = hash.short();
        let creator = fe.event.creator_id();
        if !self.repertoire.contains_key(&creator) {
            return Err(HashgraphError::UnknownCreator { event: short, creator });
        }
        fe.event
            .verify()
            .map_err(|_| HashgraphError::InvalidSignature(short))?;

        let mut record = EventRecord::from_frame_event(fe, self.topological_index)?;
        if record.round_received.is_some_and(|rr| rr > frame_round) {
            record.round_received = None;
            record.consensus_timestamp = None;
        }
        self.store.set_event(&record)?;
        self.topological_index += 1;

        let round = record.round.unwrap_or_default();
        if record.witness {
            let mut info = self.store.get_round(round)?.unwrap_or_default();
            info.add_witness(hash);
            if round <= frame_round {
                info.decided = true;
            } else {
                self.pending_rounds.insert(round);
            }
            self.store.set_round(round, &info)?;
        }
        if record.round_received.is_none() {
            self.undetermined.push(hash);
        }
        Ok(())
    }

    // =========================================================================
    // CONSENSUS
    // =========================================================================

    /// Run the four consensus phases; returns the blocks produced
    pub fn run_consensus(&mut self) -> Result<Vec<Block>> {
        self.divide_rounds()?;
        self.decide_fame()?;
        self.decide_round_received()?;
        self.process_decided_rounds()
    }

    /// Fails with `ConsensusStall` when the oldest undecided round lags the
    /// last round by more than `bound` rounds, and with `NoProgress` when
    /// events keep arriving but no round gets decided: more than `bound`
    /// rounds' worth of events for the current peer set.
    pub fn check_liveness(&self, bound: u64) -> Result<()> {
        if let (Some(&pending), Some(last)) = (self.pending_rounds.first(), self.store.last_round()?) {
            if last.saturating_sub(pending) > bound {
                return Err(HashgraphError::ConsensusStall { pending, last });
            }
        }

        let next_round = self.last_consensus_round.map_or(0, |r| r + 1);
        let peers = self.peer_set(next_round)?.len().max(1) as u64;
        if self.events_since_decision > bound * peers * EVENTS_PER_ROUND {
            return Err(HashgraphError::NoProgress {
                events: self.events_since_decision,
                last_consensus_round: self.last_consensus_round,
            });
        }
        Ok(())
    }

    // =========================================================================
    // BLOCK SIGNATURES
    // =========================================================================

    /// Record a validator's signature. Signatures for blocks not yet built or
    /// committed locally are kept until they can be checked.
    pub fn add_block_signature(&mut self, sig: BlockSignature) -> Result<()> {
        let committed = self.last_committed_block.is_some_and(|c| sig.index <= c);
        let Some(mut block) = self.store.get_block(sig.index)? else {
            if sig.index >= self.next_block_index {
                self.pending_signatures.push(sig);
            }
            return Ok(());
        };
        if !committed {
            self.pending_signatures.push(sig);
            return Ok(());
        }

        let validator = sig.validator_id();
        if block.signatures.contains_key(&validator) {
            return Ok(());
        }
        let peers = self.peer_set(block.round_received())?;
        if !peers.contains(validator) {
            debug!(block = sig.index, %validator, "signature from non-member ignored");
            return Ok(());
        }
        if block.verify_signature(&sig).is_err() {
            warn!(block = sig.index, %validator, "invalid block signature");
            return Ok(());
        }

        block.set_signature(sig);
        self.store.set_block(&block)?;
        if block.signatures.len() >= peers.trust_count()
            && self.anchor_block.map_or(true, |a| a < block.index())
        {
            debug!(block = block.index(), "new anchor block");
            self.anchor_block = Some(block.index());
        }
        Ok(())
    }

    /// Record the application state hash of a committed block and check the
    /// signatures that were waiting for it
    pub fn commit_block_state(&mut self, index: u64, state_hash: [u8; 32]) -> Result<Block> {
        let mut block = self
            .store
            .get_block(index)?
            .ok_or_else(|| HashgraphError::MissingEvent(format!("block {}", index)))?;
        block.body.state_hash = state_hash;
        self.store.set_block(&block)?;
        self.last_committed_block = Some(index);

        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_signatures)
            .into_iter()
            .partition(|sig| sig.index <= index);
        self.pending_signatures = waiting;
        for sig in ready {
            self.add_block_signature(sig)?;
        }
        self.store
            .get_block(index)?
            .ok_or_else(|| HashgraphError::MissingEvent(format!("block {}", index)))
    }

    pub fn anchor_block(&self) -> Result<Option<Block>> {
        match self.anchor_block {
            Some(index) => Ok(self.store.get_block(index)?),
            None => Ok(None),
        }
    }

    // =========================================================================
    // FAST-FORWARD
    // =========================================================================

    /// Check that `block` is backed by enough valid signatures from the
    /// frame's peer set and that it was built from `frame`
    pub fn verify_fast_forward(block: &Block, frame: &Frame) -> Result<()> {
        let peers = frame.peer_set();
        let valid = block.valid_signature_count(&peers)?;
        if valid < peers.trust_count() {
            return Err(HashgraphError::InvalidFastForward(format!(
                "block {} has {} valid signatures, {} required",
                block.index(),
                valid,
                peers.trust_count()
            )));
        }
        if block.body.frame_hash != frame.hash()? {
            return Err(HashgraphError::InvalidFastForward(
                "frame does not match block".into(),
            ));
        }
        if block.round_received() != frame.round {
            return Err(HashgraphError::InvalidFastForward(
                "frame round does not match block".into(),
            ));
        }
        Ok(())
    }

    /// Events a peer needs, on top of `frame`, to keep voting where we are:
    /// everything not received at or before the frame round, plus the parents
    /// of those events that lie below the frame and are not among its roots
    pub fn horizon(&self, frame: &Frame) -> Result<Vec<FrameEvent>> {
        let in_frame: BTreeSet<EventHash> = frame
            .roots
            .iter()
            .chain(frame.events.iter())
            .map(|fe| fe.event.hash())
            .collect::<swirl_core::Result<_>>()?;

        let mut above = Vec::new();
        let mut above_hashes = BTreeSet::new();
        for record in self.all_events()? {
            if record.round_received.map_or(true, |rr| rr > frame.round) {
                above_hashes.insert(record.hash);
                above.push(record);
            }
        }

        let mut below = Vec::new();
        let mut below_hashes = BTreeSet::new();
        for record in &above {
            let parents = [record.event.self_parent(), record.event.other_parent()];
            for parent in parents.into_iter().flatten() {
                if in_frame.contains(&parent)
                    || above_hashes.contains(&parent)
                    || !below_hashes.insert(parent)
                {
                    continue;
                }
                if let Some(parent_record) = self.store.get_event(&parent)? {
                    below.push(parent_record);
                }
            }
        }
        below.sort_by_key(|r| r.topological_index);

        Ok(below
            .iter()
            .chain(above.iter())
            .map(EventRecord::to_frame_event)
            .collect())
    }

    /// Replace all state with the consensus state at `block`/`frame`, then
    /// load the `horizon` events above it
    pub fn reset(&mut self, block: Block, frame: Frame, horizon: Vec<FrameEvent>) -> Result<()> {
        let peer_sets: BTreeMap<u64, PeerSet> = frame
            .peer_sets
            .iter()
            .map(|(round, peers)| (*round, PeerSet::new(peers.clone())))
            .collect();
        self.store.reset(&peer_sets)?;

        self.repertoire = self.store.repertoire()?;
        self.undivided.clear();
        self.undetermined.clear();
        self.pending_rounds.clear();
        self.received.clear();
        self.roots.clear();
        self.pending_signatures.clear();
        self.topological_index = 0;
        self.events_since_decision = 0;

        let round = frame.round;
        for fe in frame.roots.iter().chain(frame.events.iter()) {
            self.update_root(fe.event.creator_id(), fe.event.index(), fe.event.hash()?);
            self.insert_detached(fe.clone(), round)?;
        }
        for fe in horizon {
            self.insert_detached(fe, round)?;
        }

        self.last_consensus_round = Some(round);
        self.first_consensus_round = Some(round);
        self.next_block_index = block.index() + 1;
        self.last_committed_block = Some(block.index());
        self.anchor_block = Some(block.index());
        self.base_block = Some(block.index());
        self.store.set_frame(&frame)?;
        self.store.set_block(&block)?;

        info!(
            round,
            block = block.index(),
            undetermined = self.undetermined.len(),
            "reset from frame"
        );
        Ok(())
    }

    /// Rebuild engine state by replaying the events already in the store.
    /// Returns the blocks produced along the way.
    ///
    /// A store that was reset by a fast-forward is replayed from the block
    /// and frame it was reset to. The replay runs on a scratch store first;
    /// the store itself is only rebuilt once that succeeded.
    pub fn bootstrap(&mut self) -> Result<Vec<Block>> {
        let events = self.all_events()?;
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let base = self.reset_point(&events)?;
        let genesis: BTreeMap<u64, PeerSet> = self
            .store
            .get_all_peer_sets()?
            .into_iter()
            .take(1)
            .collect();

        let scratch = Arc::new(InmemStore::new(&PeerSet::default()));
        scratch.reset(&genesis)?;
        Self::new(scratch)?.replay(base.clone(), &events)?;

        self.store.reset(&genesis)?;
        *self = Self::new(self.store.clone())?;
        let blocks = self.replay(base, &events)?;
        info!(
            events = events.len(),
            blocks = blocks.len(),
            base_block = ?self.base_block,
            "bootstrapped from store"
        );
        Ok(blocks)
    }

    /// Block and frame the store was last reset to. Only a reset store holds
    /// events whose parents it never saw.
    fn reset_point(&self, events: &[EventRecord]) -> Result<Option<(Block, Frame)>> {
        let held: BTreeSet<EventHash> = events.iter().map(|r| r.hash).collect();
        let detached = events.iter().any(|r| {
            [r.event.self_parent(), r.event.other_parent()]
                .into_iter()
                .flatten()
                .any(|parent| !held.contains(&parent))
        });
        if !detached {
            return Ok(None);
        }

        let last = self.store.last_block_index()?.ok_or_else(|| {
            HashgraphError::InvalidFastForward("events without parents but no block".into())
        })?;
        // The blocks held are a contiguous range starting at the reset block
        let (mut low, mut high) = (0, last);
        while low < high {
            let mid = low + (high - low) / 2;
            if self.store.get_block(mid)?.is_some() {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        let block = self
            .store
            .get_block(low)?
            .ok_or_else(|| HashgraphError::MissingEvent(format!("block {}", low)))?;
        let frame = self
            .store
            .get_frame(block.round_received())?
            .ok_or_else(|| HashgraphError::MissingEvent(format!("frame {}", block.round_received())))?;
        Ok(Some((block, frame)))
    }

    /// Insert `events` in topological order, running consensus after each.
    /// With a `base`, the engine is reset to it first, and events that were
    /// loaded from a peer's frame or horizon go back in detached.
    fn replay(&mut self, base: Option<(Block, Frame)>, events: &[EventRecord]) -> Result<Vec<Block>> {
        let frame_round = match base {
            Some((block, frame)) => {
                let round = frame.round;
                self.reset(block, frame, Vec::new())?;
                Some(round)
            }
            None => None,
        };

        let mut blocks = Vec::new();
        for record in events {
            if self.store.get_event(&record.hash)?.is_some() {
                continue;
            }
            if let Some(round) = frame_round {
                // Already received at or below the frame
                if record.round_received.is_some_and(|rr| rr <= round) {
                    self.insert_detached(record.to_frame_event(), round)?;
                    continue;
                }
            }
            let inserted = self.insert_event(record.event.clone(), record.wire.is_some());
            match (inserted, frame_round) {
                (Ok(_), _) => {}
                (
                    Err(
                        HashgraphError::NoParent { .. }
                        | HashgraphError::OldEvent(_)
                        | HashgraphError::BadIndex { .. }
                        | HashgraphError::SelfParentMismatch(_),
                    ),
                    Some(round),
                ) => self.insert_detached(record.to_frame_event(), round)?,
                (Err(e), _) => return Err(e),
            }
            blocks.extend(self.run_consensus()?);
        }
        Ok(blocks)
    }

    fn update_root(&mut self, creator: PeerId, index: u64, hash: EventHash) {
        let root = self.roots.entry(creator).or_insert((index, hash));
        if root.0 < index {
            *root = (index, hash);
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    fn all_events(&self) -> Result<Vec<EventRecord>> {
        let mut events = Vec::new();
        loop {
            let page = self
                .store
                .topological_events(events.len() as u64, TOPOLOGICAL_PAGE)?;
            if page.is_empty() {
                return Ok(events);
            }
            events.extend(page);
        }
    }

    pub(crate) fn record(&self, hash: &EventHash) -> Result<EventRecord> {
        self.store
            .get_event(hash)?
            .ok_or_else(|| HashgraphError::MissingEvent(hash.short()))
    }

    pub fn get_event(&self, hash: &EventHash) -> Result<Option<EventRecord>> {
        Ok(self.store.get_event(hash)?)
    }

    /// Peer set in effect at `round`
    pub fn peer_set(&self, round: u64) -> Result<PeerSet> {
        Ok(self.store.get_peer_set(round)?.unwrap_or_default())
    }

    /// Most recent peer set, possibly not yet in effect
    pub fn latest_peer_set(&self) -> Result<PeerSet> {
        Ok(self
            .store
            .get_all_peer_sets()?
            .into_values()
            .next_back()
            .unwrap_or_default())
    }

    pub fn all_peer_sets(&self) -> Result<BTreeMap<u64, PeerSet>> {
        Ok(self.store.get_all_peer_sets()?)
    }

    pub fn repertoire(&self) -> &BTreeMap<PeerId, Peer> {
        &self.repertoire
    }

    pub fn known_events(&self) -> Result<KnownEvents> {
        Ok(self.store.known_events()?)
    }

    pub fn last_event_from(&self, creator: PeerId) -> Result<Option<(EventHash, u64)>> {
        Ok(self.store.last_event_from(creator)?)
    }

    pub fn last_consensus_round(&self) -> Option<u64> {
        self.last_consensus_round
    }

    pub fn first_consensus_round(&self) -> Option<u64> {
        self.first_consensus_round
    }

    /// Block of the last fast-forward; blocks below it are not held
    pub fn base_block(&self) -> Option<u64> {
        self.base_block
    }

    pub fn last_round(&self) -> Result<Option<u64>> {
        Ok(self.store.last_round()?)
    }

    pub fn get_block(&self, index: u64) -> Result<Option<Block>> {
        Ok(self.store.get_block(index)?)
    }

    pub fn get_frame(&self, round: u64) -> Result<Option<Frame>> {
        Ok(self.store.get_frame(round)?)
    }

    /// Undetermined events carrying transactions
    pub fn pending_loaded_events(&self) -> Result<usize> {
        let mut count = 0;
        for hash in &self.undetermined {
            if self.record(hash)?.event.is_loaded() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// A peer set change has been decided but is not yet in effect
    pub fn pending_peer_set_change(&self) -> Result<bool> {
        let latest = self.store.get_all_peer_sets()?.into_keys().next_back();
        Ok(match (latest, self.last_consensus_round) {
            (Some(effective), Some(lcr)) => effective > lcr,
            (Some(effective), None) => effective > 0,
            _ => false,
        })
    }

    pub fn stats(&self) -> Result<HashgraphStats> {
        Ok(HashgraphStats {
            last_round: self.store.last_round()?,
            last_consensus_round: self.last_consensus_round,
            first_consensus_round: self.first_consensus_round,
            pending_rounds: self.pending_rounds.len(),
            undetermined_events: self.undetermined.len(),
            consensus_events: self.consensus_events,
            consensus_transactions: self.consensus_transactions,
            last_block_index: self.store.last_block_index()?,
            anchor_block: self.anchor_block,
        })
    }
}
