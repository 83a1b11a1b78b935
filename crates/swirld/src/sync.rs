//! Gossip bookkeeping: what to send a peer, whom to gossip with next, and
//! per-peer sync state

use crate::hashgraph::{Hashgraph, HashgraphError};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use swirl_core::{KnownEvents, Peer, PeerId, WireEvent};
use thiserror::Error;

/// Sync protocol errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Hashgraph error: {0}")]
    Hashgraph(#[from] HashgraphError),
    #[error("Events of peer {creator} from index {index} are no longer available")]
    TooLate { creator: PeerId, index: u64 },
}

/// Anti-entropy state for a peer
#[derive(Debug, Default, Clone)]
struct PeerSyncState {
    sync_count: u64,
    /// Consecutive failures
    failures: u32,
}

/// Sync statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub peer_count: usize,
    pub total_syncs: u64,
    pub failing_peers: usize,
}

pub struct SyncManager {
    peers: RwLock<HashMap<PeerId, PeerSyncState>>,
    /// Maximum events per response
    sync_limit: usize,
}

impl SyncManager {
    pub fn new(sync_limit: usize) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            sync_limit,
        }
    }

    /// Events `known` is missing, in topological order, truncated to the
    /// sync limit. The flag is set when the list was truncated.
    ///
    /// After a fast-forward we only hold history from the frame on; older
    /// indexes are skipped and the requester has to fast-forward too.
    pub fn event_diff(
        &self,
        hg: &Hashgraph,
        known: &KnownEvents,
    ) -> Result<(Vec<WireEvent>, bool), SyncError> {
        let store = hg.store();
        let reset = hg.base_block().is_some();
        let mut missing = Vec::new();
        for (creator, last) in hg.known_events()? {
            let from = known.get(&creator).map_or(0, |&index| index + 1);
            for index in from..=last {
                let hash = store
                    .participant_event(creator, index)
                    .map_err(HashgraphError::from)?;
                let record = match hash {
                    Some(hash) => hg.get_event(&hash)?,
                    None => None,
                };
                match record {
                    Some(record) => missing.push(record),
                    None if reset => continue,
                    None => return Err(SyncError::TooLate { creator, index }),
                }
            }
        }
        missing.sort_by_key(|r| r.topological_index);

        let truncated = missing.len() > self.sync_limit;
        missing.truncate(self.sync_limit);
        Ok((missing.iter().map(|r| r.wire_event()).collect(), truncated))
    }

    /// Pick a random peer, preferring peers that have not been failing
    pub fn select_peer(&self, candidates: &[Peer]) -> Option<Peer> {
        let peers = self.peers.read();
        let healthy: Vec<&Peer> = candidates
            .iter()
            .filter(|p| peers.get(&p.id).map_or(true, |s| s.failures == 0))
            .collect();
        let mut rng = rand::thread_rng();
        match healthy.choose(&mut rng) {
            Some(peer) => Some((*peer).clone()),
            None => candidates.choose(&mut rng).cloned(),
        }
    }

    pub fn record_success(&self, peer: PeerId) {
        let mut peers = self.peers.write();
        let state = peers.entry(peer).or_default();
        state.sync_count += 1;
        state.failures = 0;
    }

    pub fn record_failure(&self, peer: PeerId) {
        self.peers.write().entry(peer).or_default().failures += 1;
    }

    /// Drop peers that are no longer in `current`
    pub fn retain(&self, current: &[Peer]) {
        self.peers
            .write()
            .retain(|id, _| current.iter().any(|p| p.id == *id));
    }

    pub fn stats(&self) -> SyncStats {
        let peers = self.peers.read();
        SyncStats {
            peer_count: peers.len(),
            total_syncs: peers.values().map(|s| s.sync_count).sum(),
            failing_peers: peers.values().filter(|s| s.failures > 0).count(),
        }
    }
}

/// Number of events `theirs` holds beyond `ours`
pub fn known_gap(ours: &KnownEvents, theirs: &KnownEvents) -> u64 {
    theirs
        .iter()
        .map(|(creator, &index)| match ours.get(creator) {
            Some(&mine) => index.saturating_sub(mine),
            None => index + 1,
        })
        .sum()
}
