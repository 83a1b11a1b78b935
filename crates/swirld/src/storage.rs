//! Event store: the persistence interface the hashgraph engine runs on
//!
//! Two implementations: [`InmemStore`] for tests and ephemeral nodes, and
//! [`SledStore`] for durable nodes.

use crate::hashgraph::{EventRecord, RoundInfo};
use parking_lot::RwLock;
use sled::Db;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use swirl_core::{Block, EventHash, Frame, KnownEvents, Peer, PeerId, PeerSet};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),
    #[error("Corrupt key in tree {0}")]
    CorruptKey(&'static str),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed persistence for events, rounds, blocks, frames and peer sets
pub trait Store: Send + Sync {
    fn get_event(&self, hash: &EventHash) -> StoreResult<Option<EventRecord>>;

    /// Insert or update a record. New records extend the creator's history
    /// and the topological order.
    fn set_event(&self, record: &EventRecord) -> StoreResult<()>;

    /// Hash of the creator's event at `index`
    fn participant_event(&self, creator: PeerId, index: u64) -> StoreResult<Option<EventHash>>;

    /// Creator's latest event and its index
    fn last_event_from(&self, creator: PeerId) -> StoreResult<Option<(EventHash, u64)>>;

    fn known_events(&self) -> StoreResult<KnownEvents>;

    /// Up to `limit` events starting at topological index `from`
    fn topological_events(&self, from: u64, limit: usize) -> StoreResult<Vec<EventRecord>>;

    fn event_count(&self) -> StoreResult<u64>;

    fn get_round(&self, round: u64) -> StoreResult<Option<RoundInfo>>;
    fn set_round(&self, round: u64, info: &RoundInfo) -> StoreResult<()>;
    fn last_round(&self) -> StoreResult<Option<u64>>;

    fn get_block(&self, index: u64) -> StoreResult<Option<Block>>;
    fn set_block(&self, block: &Block) -> StoreResult<()>;
    fn last_block_index(&self) -> StoreResult<Option<u64>>;

    fn get_frame(&self, round: u64) -> StoreResult<Option<Frame>>;
    fn set_frame(&self, frame: &Frame) -> StoreResult<()>;

    /// Peer set in effect at `round`: the one with the highest effective
    /// round not above `round`
    fn get_peer_set(&self, round: u64) -> StoreResult<Option<PeerSet>>;
    fn set_peer_set(&self, round: u64, peers: &PeerSet) -> StoreResult<()>;
    fn get_all_peer_sets(&self) -> StoreResult<BTreeMap<u64, PeerSet>>;

    /// Every peer of every peer set, including not yet effective ones
    fn repertoire(&self) -> StoreResult<BTreeMap<PeerId, Peer>> {
        let mut all = BTreeMap::new();
        for set in self.get_all_peer_sets()?.into_values() {
            for peer in set.into_peers() {
                all.insert(peer.id, peer);
            }
        }
        Ok(all)
    }

    /// Drop all content and start over from a peer set history
    fn reset(&self, peer_sets: &BTreeMap<u64, PeerSet>) -> StoreResult<()>;
}

// =============================================================================
// IN-MEMORY
// =============================================================================

#[derive(Default)]
struct InmemInner {
    events: HashMap<EventHash, EventRecord>,
    participants: HashMap<PeerId, BTreeMap<u64, EventHash>>,
    topological: Vec<EventHash>,
    rounds: BTreeMap<u64, RoundInfo>,
    blocks: BTreeMap<u64, Block>,
    frames: BTreeMap<u64, Frame>,
    peer_sets: BTreeMap<u64, PeerSet>,
}

/// Store backed by maps in memory
#[derive(Default)]
pub struct InmemStore {
    inner: RwLock<InmemInner>,
}

impl InmemStore {
    pub fn new(genesis: &PeerSet) -> Self {
        let store = Self::default();
        store.inner.write().peer_sets.insert(0, genesis.clone());
        store
    }
}

impl Store for InmemStore {
    fn get_event(&self, hash: &EventHash) -> StoreResult<Option<EventRecord>> {
        Ok(self.inner.read().events.get(hash).cloned())
    }

    fn set_event(&self, record: &EventRecord) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if !inner.events.contains_key(&record.hash) {
            inner
                .participants
                .entry(record.creator_id)
                .or_default()
                .insert(record.index(), record.hash);
            inner.topological.push(record.hash);
        }
        inner.events.insert(record.hash, record.clone());
        Ok(())
    }

    fn participant_event(&self, creator: PeerId, index: u64) -> StoreResult<Option<EventHash>> {
        Ok(self
            .inner
            .read()
            .participants
            .get(&creator)
            .and_then(|events| events.get(&index).copied()))
    }

    fn last_event_from(&self, creator: PeerId) -> StoreResult<Option<(EventHash, u64)>> {
        Ok(self
            .inner
            .read()
            .participants
            .get(&creator)
            .and_then(|events| events.iter().next_back())
            .map(|(index, hash)| (*hash, *index)))
    }

    fn known_events(&self) -> StoreResult<KnownEvents> {
        Ok(self
            .inner
            .read()
            .participants
            .iter()
            .filter_map(|(id, events)| events.keys().next_back().map(|i| (*id, *i)))
            .collect())
    }

    fn topological_events(&self, from: u64, limit: usize) -> StoreResult<Vec<EventRecord>> {
        let inner = self.inner.read();
        Ok(inner
            .topological
            .iter()
            .skip(from as usize)
            .take(limit)
            .filter_map(|hash| inner.events.get(hash).cloned())
            .collect())
    }

    fn event_count(&self) -> StoreResult<u64> {
        Ok(self.inner.read().topological.len() as u64)
    }

    fn get_round(&self, round: u64) -> StoreResult<Option<RoundInfo>> {
        Ok(self.inner.read().rounds.get(&round).cloned())
    }

    fn set_round(&self, round: u64, info: &RoundInfo) -> StoreResult<()> {
        self.inner.write().rounds.insert(round, info.clone());
        Ok(())
    }

    fn last_round(&self) -> StoreResult<Option<u64>> {
        Ok(self.inner.read().rounds.keys().next_back().copied())
    }

    fn get_block(&self, index: u64) -> StoreResult<Option<Block>> {
        Ok(self.inner.read().blocks.get(&index).cloned())
    }

    fn set_block(&self, block: &Block) -> StoreResult<()> {
        self.inner.write().blocks.insert(block.index(), block.clone());
        Ok(())
    }

    fn last_block_index(&self) -> StoreResult<Option<u64>> {
        Ok(self.inner.read().blocks.keys().next_back().copied())
    }

    fn get_frame(&self, round: u64) -> StoreResult<Option<Frame>> {
        Ok(self.inner.read().frames.get(&round).cloned())
    }

    fn set_frame(&self, frame: &Frame) -> StoreResult<()> {
        self.inner.write().frames.insert(frame.round, frame.clone());
        Ok(())
    }

    fn get_peer_set(&self, round: u64) -> StoreResult<Option<PeerSet>> {
        Ok(self
            .inner
            .read()
            .peer_sets
            .range(..=round)
            .next_back()
            .map(|(_, set)| set.clone()))
    }

    fn set_peer_set(&self, round: u64, peers: &PeerSet) -> StoreResult<()> {
        self.inner.write().peer_sets.insert(round, peers.clone());
        Ok(())
    }

    fn get_all_peer_sets(&self) -> StoreResult<BTreeMap<u64, PeerSet>> {
        Ok(self.inner.read().peer_sets.clone())
    }

    fn reset(&self, peer_sets: &BTreeMap<u64, PeerSet>) -> StoreResult<()> {
        let mut inner = self.inner.write();
        *inner = InmemInner::default();
        inner.peer_sets = peer_sets.clone();
        Ok(())
    }
}

// =============================================================================
// SLED
// =============================================================================

/// Persistent store using sled
pub struct SledStore {
    db: Db,
    /// hash -> EventRecord
    events: sled::Tree,
    /// creator ++ index -> hash
    participants: sled::Tree,
    /// topological index -> hash
    topological: sled::Tree,
    /// round -> RoundInfo
    rounds: sled::Tree,
    /// block index -> Block
    blocks: sled::Tree,
    /// round -> Frame
    frames: sled::Tree,
    /// effective round -> PeerSet
    peer_sets: sled::Tree,
}

fn participant_key(creator: PeerId, index: u64) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..4].copy_from_slice(&creator.0.to_be_bytes());
    key[4..].copy_from_slice(&index.to_be_bytes());
    key
}

fn u64_key(tree: &'static str, bytes: &[u8]) -> StoreResult<u64> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| StoreError::CorruptKey(tree))?;
    Ok(u64::from_be_bytes(arr))
}

fn hash_value(tree: &'static str, bytes: &[u8]) -> StoreResult<EventHash> {
    let arr: [u8; 32] = bytes.try_into().map_err(|_| StoreError::CorruptKey(tree))?;
    Ok(EventHash(arr))
}

impl SledStore {
    /// Open storage at the given path. A fresh database is seeded with the
    /// genesis peer set.
    pub fn open(path: impl AsRef<Path>, genesis: &PeerSet) -> StoreResult<Self> {
        let db = sled::open(path)?;
        let store = Self {
            events: db.open_tree("events")?,
            participants: db.open_tree("participants")?,
            topological: db.open_tree("topological")?,
            rounds: db.open_tree("rounds")?,
            blocks: db.open_tree("blocks")?,
            frames: db.open_tree("frames")?,
            peer_sets: db.open_tree("peer_sets")?,
            db,
        };
        if store.peer_sets.is_empty() {
            store.set_peer_set(0, genesis)?;
        }
        Ok(store)
    }

    /// Flush all pending writes
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn get<T: serde::de::DeserializeOwned>(
        tree: &sled::Tree,
        key: impl AsRef<[u8]>,
    ) -> StoreResult<Option<T>> {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: serde::Serialize>(tree: &sled::Tree, key: impl AsRef<[u8]>, value: &T) -> StoreResult<()> {
        tree.insert(key.as_ref(), postcard::to_allocvec(value)?)?;
        Ok(())
    }
}

impl Store for SledStore {
    fn get_event(&self, hash: &EventHash) -> StoreResult<Option<EventRecord>> {
        Self::get(&self.events, hash.0)
    }

    fn set_event(&self, record: &EventRecord) -> StoreResult<()> {
        if !self.events.contains_key(record.hash.0)? {
            let position = self.event_count()?;
            self.topological
                .insert(position.to_be_bytes(), &record.hash.0[..])?;
            self.participants.insert(
                participant_key(record.creator_id, record.index()),
                &record.hash.0[..],
            )?;
        }
        Self::put(&self.events, record.hash.0, record)
    }

    fn participant_event(&self, creator: PeerId, index: u64) -> StoreResult<Option<EventHash>> {
        self.participants
            .get(participant_key(creator, index))?
            .map(|v| hash_value("participants", &v))
            .transpose()
    }

    fn last_event_from(&self, creator: PeerId) -> StoreResult<Option<(EventHash, u64)>> {
        match self.participants.scan_prefix(creator.0.to_be_bytes()).next_back() {
            Some(entry) => {
                let (key, value) = entry?;
                let index = u64_key("participants", &key[4..])?;
                Ok(Some((hash_value("participants", &value)?, index)))
            }
            None => Ok(None),
        }
    }

    fn known_events(&self) -> StoreResult<KnownEvents> {
        // Keys are creator ++ index, so the last key of each creator prefix wins
        let mut known = KnownEvents::new();
        for entry in self.participants.iter() {
            let (key, _) = entry?;
            if key.len() != 12 {
                return Err(StoreError::CorruptKey("participants"));
            }
            let creator = PeerId(u32::from_be_bytes([key[0], key[1], key[2], key[3]]));
            known.insert(creator, u64_key("participants", &key[4..])?);
        }
        Ok(known)
    }

    fn topological_events(&self, from: u64, limit: usize) -> StoreResult<Vec<EventRecord>> {
        let mut records = Vec::new();
        for entry in self.topological.range(from.to_be_bytes()..).take(limit) {
            let (_, value) = entry?;
            if let Some(record) = self.get_event(&hash_value("topological", &value)?)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn event_count(&self) -> StoreResult<u64> {
        match self.topological.last()? {
            Some((key, _)) => Ok(u64_key("topological", &key)? + 1),
            None => Ok(0),
        }
    }

    fn get_round(&self, round: u64) -> StoreResult<Option<RoundInfo>> {
        Self::get(&self.rounds, round.to_be_bytes())
    }

    fn set_round(&self, round: u64, info: &RoundInfo) -> StoreResult<()> {
        Self::put(&self.rounds, round.to_be_bytes(), info)
    }

    fn last_round(&self) -> StoreResult<Option<u64>> {
        match self.rounds.last()? {
            Some((key, _)) => Ok(Some(u64_key("rounds", &key)?)),
            None => Ok(None),
        }
    }

    fn get_block(&self, index: u64) -> StoreResult<Option<Block>> {
        Self::get(&self.blocks, index.to_be_bytes())
    }

    fn set_block(&self, block: &Block) -> StoreResult<()> {
        Self::put(&self.blocks, block.index().to_be_bytes(), block)
    }

    fn last_block_index(&self) -> StoreResult<Option<u64>> {
        match self.blocks.last()? {
            Some((key, _)) => Ok(Some(u64_key("blocks", &key)?)),
            None => Ok(None),
        }
    }

    fn get_frame(&self, round: u64) -> StoreResult<Option<Frame>> {
        Self::get(&self.frames, round.to_be_bytes())
    }

    fn set_frame(&self, frame: &Frame) -> StoreResult<()> {
        Self::put(&self.frames, frame.round.to_be_bytes(), frame)
    }

    fn get_peer_set(&self, round: u64) -> StoreResult<Option<PeerSet>> {
        match self.peer_sets.range(..=round.to_be_bytes()).next_back() {
            Some(entry) => {
                let (_, value) = entry?;
                Ok(Some(postcard::from_bytes(&value)?))
            }
            None => Ok(None),
        }
    }

    fn set_peer_set(&self, round: u64, peers: &PeerSet) -> StoreResult<()> {
        Self::put(&self.peer_sets, round.to_be_bytes(), peers)
    }

    fn get_all_peer_sets(&self) -> StoreResult<BTreeMap<u64, PeerSet>> {
        let mut all = BTreeMap::new();
        for entry in self.peer_sets.iter() {
            let (key, value) = entry?;
            all.insert(u64_key("peer_sets", &key)?, postcard::from_bytes(&value)?);
        }
        Ok(all)
    }

    fn reset(&self, peer_sets: &BTreeMap<u64, PeerSet>) -> StoreResult<()> {
        for tree in [
            &self.events,
            &self.participants,
            &self.topological,
            &self.rounds,
            &self.blocks,
            &self.frames,
            &self.peer_sets,
        ] {
            tree.clear()?;
        }
        for (round, set) in peer_sets {
            self.set_peer_set(*round, set)?;
        }
        self.flush()
    }
}
