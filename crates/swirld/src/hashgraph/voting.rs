//! Rounds, witnesses and virtual voting

use super::{EventRecord, Fame, Hashgraph, Result, COIN_ROUND_FREQ};
use std::collections::HashMap;
use swirl_core::{EventHash, PeerSet};
use tracing::debug;

/// Coin flip for undecided voters: the middle bit of the voter's signature
fn middle_bit(signature: &[u8]) -> bool {
    signature
        .get(signature.len() / 2)
        .is_some_and(|byte| byte & 1 == 1)
}

impl Hashgraph {
    /// `x` strongly sees `y`: a super-majority of `peers` have an event that
    /// is an ancestor of `x` and a descendant of `y`
    pub(crate) fn strongly_see(
        &self,
        x: &EventRecord,
        y: &EventRecord,
        peers: &PeerSet,
    ) -> Result<bool> {
        let mut count = 0;
        for peer in peers.ids() {
            let Some(&index) = x.last_ancestors.get(&peer) else {
                continue;
            };
            let sees = if peer == x.creator_id && index == x.index() {
                x.sees(y)
            } else {
                match self.store.participant_event(peer, index)? {
                    Some(hash) => self
                        .store
                        .get_event(&hash)?
                        .is_some_and(|ancestor| ancestor.sees(y)),
                    // Below the oldest event we hold, so older than y
                    None => false,
                }
            };
            if sees {
                count += 1;
            }
        }
        Ok(count >= peers.super_majority())
    }

    /// `x` strongly sees a super-majority of the witnesses of `round`
    fn advances_round(&self, x: &EventRecord, round: u64) -> Result<bool> {
        let Some(info) = self.store.get_round(round)? else {
            return Ok(false);
        };
        let peers = self.peer_set(round)?;
        let mut seen = 0;
        for witness in info.witness_hashes() {
            let w = self.record(witness)?;
            if self.strongly_see(x, &w, &peers)? {
                seen += 1;
            }
        }
        Ok(seen >= peers.super_majority())
    }

    /// Assign round and witness flag to every event inserted since the last call
    pub fn divide_rounds(&mut self) -> Result<()> {
        for hash in std::mem::take(&mut self.undivided) {
            let mut record = self.record(&hash)?;
            if record.round.is_some() {
                continue;
            }

            let mut parent_round: Option<u64> = None;
            let mut self_parent_round: Option<u64> = None;
            if let Some(sp) = record.event.self_parent() {
                if let Some(parent) = self.store.get_event(&sp)? {
                    self_parent_round = parent.round;
                    parent_round = parent.round;
                }
            }
            if let Some(op) = record.event.other_parent() {
                if let Some(parent) = self.store.get_event(&op)? {
                    parent_round = parent_round.max(parent.round);
                }
            }

            let round = match parent_round {
                None => 0,
                Some(r) if self.advances_round(&record, r)? => r + 1,
                Some(r) => r,
            };
            let first_in_round = self_parent_round.map_or(true, |r| r < round);
            let member = self.peer_set(round)?.contains(record.creator_id);

            record.round = Some(round);
            record.witness = first_in_round && member;
            self.store.set_event(&record)?;

            if record.witness {
                let mut info = self.store.get_round(round)?.unwrap_or_default();
                info.add_witness(hash);
                let processed = self.last_consensus_round.is_some_and(|lcr| round <= lcr);
                if info.decided || processed {
                    // Voting on this round is over; a late witness cannot be famous
                    info.set_fame(&hash, Fame::NotFamous);
                } else {
                    self.pending_rounds.insert(round);
                }
                self.store.set_round(round, &info)?;
                debug!(event = %hash.short(), round, "new witness");
            }
        }
        Ok(())
    }

    /// Virtual voting on the undecided witnesses of pending rounds
    pub fn decide_fame(&mut self) -> Result<()> {
        let Some(last_round) = self.store.last_round()? else {
            return Ok(());
        };
        // (voter, candidate) -> vote
        let mut votes: HashMap<(EventHash, EventHash), bool> = HashMap::new();
        let pending: Vec<u64> = self.pending_rounds.iter().copied().collect();

        for round in pending {
            let Some(mut info) = self.store.get_round(round)? else {
                continue;
            };
            if info.decided {
                continue;
            }

            for candidate in info.undecided_witnesses() {
                let x = self.record(&candidate)?;
                if let Some(fame) = self.vote_on(&x, round, last_round, &mut votes)? {
                    info.set_fame(&candidate, fame);
                }
            }

            if info.all_decided() {
                info.decided = true;
                debug!(round, famous = info.famous_witnesses().len(), "round decided");
            }
            self.store.set_round(round, &info)?;
        }
        Ok(())
    }

    /// Run the voting rounds on witness `x` of `round` until a decision
    fn vote_on(
        &self,
        x: &EventRecord,
        round: u64,
        last_round: u64,
        votes: &mut HashMap<(EventHash, EventHash), bool>,
    ) -> Result<Option<Fame>> {
        for j in round + 1..=last_round {
            let Some(voters) = self.store.get_round(j)? else {
                break;
            };
            let diff = j - round;
            let previous = if diff > 1 {
                self.store.get_round(j - 1)?.unwrap_or_default()
            } else {
                Default::default()
            };
            let previous_peers = self.peer_set(j - 1)?;

            for voter in voters.witness_hashes() {
                let y = self.record(voter)?;
                if diff == 1 {
                    votes.insert((y.hash, x.hash), y.sees(x));
                    continue;
                }

                let (mut yays, mut nays) = (0usize, 0usize);
                for w in previous.witness_hashes() {
                    let w_record = self.record(w)?;
                    if !self.strongly_see(&y, &w_record, &previous_peers)? {
                        continue;
                    }
                    match votes.get(&(*w, x.hash)) {
                        Some(true) => yays += 1,
                        Some(false) => nays += 1,
                        None => {}
                    }
                }
                let vote = yays >= nays;
                let tally = yays.max(nays);
                let super_majority = previous_peers.super_majority();

                if diff % COIN_ROUND_FREQ != 0 {
                    if tally >= super_majority {
                        return Ok(Some(if vote { Fame::Famous } else { Fame::NotFamous }));
                    }
                    votes.insert((y.hash, x.hash), vote);
                } else if tally >= super_majority {
                    votes.insert((y.hash, x.hash), vote);
                } else {
                    votes.insert((y.hash, x.hash), middle_bit(y.signature()));
                }
            }
        }
        Ok(None)
    }
}
