//! Engine-local view of an event: the event plus its consensus metadata

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use swirl_core::{Event, EventHash, FrameEvent, PeerId, WireEvent};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    pub event: Event,
    pub hash: EventHash,
    pub creator_id: PeerId,
    /// Insertion position; parents always come first
    pub topological_index: u64,
    /// Creator -> highest index of that creator among this event's ancestors
    /// (the event itself included)
    pub last_ancestors: BTreeMap<PeerId, u64>,
    pub round: Option<u64>,
    pub witness: bool,
    pub round_received: Option<u64>,
    pub consensus_timestamp: Option<u64>,
    /// Cached wire projection
    pub wire: Option<WireEvent>,
}

impl EventRecord {
    /// Fresh record without consensus metadata; `last_ancestors` only
    /// covers the event itself until the engine merges the parents'
    pub fn new(event: Event, topological_index: u64) -> swirl_core::Result<Self> {
        let hash = event.hash()?;
        let creator_id = event.creator_id();
        let mut last_ancestors = BTreeMap::new();
        last_ancestors.insert(creator_id, event.index());
        Ok(Self {
            event,
            hash,
            creator_id,
            topological_index,
            last_ancestors,
            round: None,
            witness: false,
            round_received: None,
            consensus_timestamp: None,
            wire: None,
        })
    }

    /// Record carrying metadata computed by another node
    pub fn from_frame_event(fe: FrameEvent, topological_index: u64) -> swirl_core::Result<Self> {
        let mut record = Self::new(fe.event, topological_index)?;
        record.last_ancestors = fe.last_ancestors;
        record
            .last_ancestors
            .insert(record.creator_id, record.event.index());
        record.round = Some(fe.round);
        record.witness = fe.witness;
        record.round_received = fe.round_received;
        record.consensus_timestamp = fe.consensus_timestamp;
        Ok(record)
    }

    pub fn to_frame_event(&self) -> FrameEvent {
        FrameEvent {
            event: self.event.clone(),
            round: self.round.unwrap_or_default(),
            witness: self.witness,
            last_ancestors: self.last_ancestors.clone(),
            round_received: self.round_received,
            consensus_timestamp: self.consensus_timestamp,
        }
    }

    pub fn index(&self) -> u64 {
        self.event.index()
    }

    pub fn timestamp(&self) -> u64 {
        self.event.body.timestamp
    }

    pub fn signature(&self) -> &[u8] {
        &self.event.signature
    }

    /// `self` descends from (or is) `other`
    pub fn sees(&self, other: &EventRecord) -> bool {
        self.last_ancestors
            .get(&other.creator_id)
            .is_some_and(|&index| index >= other.index())
    }

    pub fn wire_event(&self) -> WireEvent {
        self.wire.clone().unwrap_or_else(|| self.event.to_wire())
    }
}
