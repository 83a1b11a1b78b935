//! Membership changes in flight
//!
//! A member answering a Join request keeps a promise per PeerAdd
//! transaction and resolves it when the transaction's block is committed.
//! A leaving node tracks its own PeerRemove until the peer set without it
//! takes effect.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use swirl_core::{Block, Bytes32, InternalTransaction, Peer, PeerId, PeerSet};
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Outcome of a PeerAdd, as reported to the joiner
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinOutcome {
    pub accepted: bool,
    /// Round at which the first peer set including the joiner takes effect
    pub accepted_round: u64,
    pub peers: Vec<Peer>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LeaveStatus {
    /// PeerRemove submitted, not yet in a block
    Submitted(Bytes32),
    /// Removal takes effect at this round
    Effective(u64),
    Done,
}

#[derive(Default)]
pub struct MembershipManager {
    promises: Mutex<HashMap<Bytes32, Vec<oneshot::Sender<JoinOutcome>>>>,
    leave: Mutex<Option<LeaveStatus>>,
}

impl MembershipManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the PeerAdd with hash `itx_hash` to be committed
    pub fn promise(&self, itx_hash: Bytes32) -> oneshot::Receiver<JoinOutcome> {
        let (tx, rx) = oneshot::channel();
        self.promises.lock().entry(itx_hash).or_default().push(tx);
        rx
    }

    /// Forget the promises for `itx_hash` whose receiver is gone, such as
    /// after the answering side gave up waiting
    pub fn abandon(&self, itx_hash: &Bytes32) {
        let mut promises = self.promises.lock();
        if let Some(waiting) = promises.get_mut(itx_hash) {
            waiting.retain(|tx| !tx.is_closed());
            if waiting.is_empty() {
                promises.remove(itx_hash);
            }
        }
    }

    pub fn pending_promises(&self) -> usize {
        self.promises.lock().values().map(Vec::len).sum()
    }

    pub fn begin_leave(&self, itx: &InternalTransaction) -> swirl_core::Result<()> {
        *self.leave.lock() = Some(LeaveStatus::Submitted(itx.hash()?));
        Ok(())
    }

    /// Nothing to wait for: not a member, or the last one
    pub fn leave_now(&self) {
        *self.leave.lock() = Some(LeaveStatus::Done);
    }

    /// Resolve promises and leave tracking against a committed block.
    /// `peer_sets` is the peer set history after the block was built.
    pub fn on_block(&self, block: &Block, peer_sets: &BTreeMap<u64, PeerSet>) {
        for receipt in &block.body.internal_transaction_receipts {
            let Ok(hash) = receipt.transaction.hash() else {
                continue;
            };
            let subject = receipt.transaction.body.peer.id;

            let waiting = self.promises.lock().remove(&hash);
            if let Some(waiting) = waiting {
                let outcome = join_outcome(subject, peer_sets);
                info!(peer = %subject, accepted = outcome.accepted, "join resolved");
                for tx in waiting {
                    let _ = tx.send(outcome.clone());
                }
            }

            let mut leave = self.leave.lock();
            if *leave == Some(LeaveStatus::Submitted(hash)) {
                *leave = Some(match first_round_without(subject, peer_sets) {
                    Some(round) => LeaveStatus::Effective(round),
                    None => {
                        warn!("leave request rejected");
                        LeaveStatus::Done
                    }
                });
            }
        }
    }

    /// Leave was requested and its peer set is in effect at `last_consensus_round`
    pub fn leave_complete(&self, last_consensus_round: Option<u64>) -> bool {
        match *self.leave.lock() {
            Some(LeaveStatus::Done) => true,
            Some(LeaveStatus::Effective(round)) => last_consensus_round.is_some_and(|lcr| lcr >= round),
            _ => false,
        }
    }

    pub fn leaving(&self) -> bool {
        self.leave.lock().is_some()
    }
}

/// The joiner is accepted once any peer set of the history contains it,
/// which also covers a duplicate PeerAdd rejected after an earlier one
/// went through
pub fn join_outcome(subject: PeerId, peer_sets: &BTreeMap<u64, PeerSet>) -> JoinOutcome {
    match peer_sets.iter().find(|(_, set)| set.contains(subject)) {
        Some((&round, set)) => JoinOutcome {
            accepted: true,
            accepted_round: round,
            peers: set.peers().to_vec(),
        },
        None => JoinOutcome {
            accepted: false,
            accepted_round: 0,
            peers: peer_sets
                .values()
                .next_back()
                .map(|set| set.peers().to_vec())
                .unwrap_or_default(),
        },
    }
}

/// Effective round of the latest peer set without `subject`, if the
/// removal went through
fn first_round_without(subject: PeerId, peer_sets: &BTreeMap<u64, PeerSet>) -> Option<u64> {
    match peer_sets.iter().next_back() {
        Some((&round, set)) if !set.contains(subject) => Some(round),
        _ => None,
    }
}
