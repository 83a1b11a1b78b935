//! Round received, consensus order, frames and blocks

use super::{EventRecord, Hashgraph, Result, PEER_SET_ACTIVATION_DELAY};
use swirl_core::crypto::xor_into;
use swirl_core::{
    Block, Frame, InternalTransaction, InternalTransactionReceipt, PeerSet, TransactionKind,
};
use tracing::{debug, info};

impl Hashgraph {
    /// Assign round received and consensus timestamp to every undetermined
    /// event that the famous witnesses of a decided round all see
    pub fn decide_round_received(&mut self) -> Result<()> {
        let first_open = self.last_consensus_round.map_or(0, |r| r + 1);
        let mut still_undetermined = Vec::new();

        for hash in std::mem::take(&mut self.undetermined) {
            let mut record = self.record(&hash)?;
            let Some(round) = record.round else {
                still_undetermined.push(hash);
                continue;
            };

            let start = (round + 1).max(first_open);
            let mut received = None;
            for &candidate in self.pending_rounds.range(start..) {
                let Some(info) = self.store.get_round(candidate)? else {
                    break;
                };
                if !info.decided {
                    break;
                }
                let famous = info
                    .famous_witnesses()
                    .iter()
                    .map(|w| self.record(w))
                    .collect::<Result<Vec<_>>>()?;
                if !famous.is_empty() && famous.iter().all(|w| w.sees(&record)) {
                    received = Some((candidate, famous));
                    break;
                }
            }

            match received {
                Some((round_received, famous)) => {
                    record.round_received = Some(round_received);
                    record.consensus_timestamp = Some(self.median_timestamp(&record, &famous)?);
                    self.store.set_event(&record)?;
                    self.received.entry(round_received).or_default().push(hash);
                }
                None => still_undetermined.push(hash),
            }
        }

        self.undetermined = still_undetermined;
        Ok(())
    }

    /// Median over the famous witnesses of the timestamp of each witness's
    /// earliest self-ancestor that sees `record`
    fn median_timestamp(&self, record: &EventRecord, famous: &[EventRecord]) -> Result<u64> {
        let mut timestamps = Vec::with_capacity(famous.len());
        for witness in famous {
            let mut earliest = witness.clone();
            while let Some(sp) = earliest.event.self_parent() {
                match self.store.get_event(&sp)? {
                    Some(parent) if parent.sees(record) => earliest = parent,
                    _ => break,
                }
            }
            timestamps.push(earliest.timestamp());
        }
        timestamps.sort_unstable();
        Ok(timestamps.get(timestamps.len() / 2).copied().unwrap_or_default())
    }

    /// Process decided rounds in order: sort their received events, apply
    /// membership changes, build the frame and (when it carries
    /// transactions) the block
    pub fn process_decided_rounds(&mut self) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();

        while let Some(&round) = self.pending_rounds.first() {
            let Some(info) = self.store.get_round(round)? else {
                break;
            };
            if !info.decided {
                break;
            }

            let mut whitener = Vec::new();
            for w in info.famous_witnesses() {
                xor_into(&mut whitener, self.record(&w)?.signature());
            }

            let mut events = self
                .received
                .remove(&round)
                .unwrap_or_default()
                .iter()
                .map(|h| self.record(h))
                .collect::<Result<Vec<_>>>()?;
            sort_consensus(&mut events, &whitener);

            let (internal_transactions, receipts) = self.apply_internal_transactions(round, &events)?;
            let frame = self.build_frame(round, &events)?;
            self.store.set_frame(&frame)?;

            let transactions: Vec<Vec<u8>> = events
                .iter()
                .flat_map(|e| e.event.body.transactions.iter().cloned())
                .collect();
            self.consensus_events += events.len() as u64;
            self.consensus_transactions += transactions.len() as u64;
            for event in &events {
                self.update_root(event.creator_id, event.index(), event.hash);
            }

            if !transactions.is_empty() || !internal_transactions.is_empty() {
                let block = Block::new(
                    self.next_block_index,
                    round,
                    frame.timestamp,
                    frame.hash()?,
                    frame.peer_set().hash()?,
                    transactions,
                    internal_transactions,
                    receipts,
                );
                self.store.set_block(&block)?;
                self.next_block_index += 1;
                debug!(
                    block = block.index(),
                    round,
                    txs = block.transactions().len(),
                    "new block"
                );
                blocks.push(block);
            }

            self.pending_rounds.remove(&round);
            self.last_consensus_round = Some(round);
            self.events_since_decision = 0;
            self.first_consensus_round.get_or_insert(round);
        }

        if !blocks.is_empty() {
            info!(
                blocks = blocks.len(),
                last_consensus_round = ?self.last_consensus_round,
                "consensus reached"
            );
        }
        Ok(blocks)
    }

    /// Evaluate the membership changes received in `round` against the latest
    /// peer set. Accepted changes produce a new peer set effective
    /// `PEER_SET_ACTIVATION_DELAY` rounds later.
    fn apply_internal_transactions(
        &mut self,
        round: u64,
        events: &[EventRecord],
    ) -> Result<(Vec<InternalTransaction>, Vec<InternalTransactionReceipt>)> {
        let itxs: Vec<InternalTransaction> = events
            .iter()
            .flat_map(|e| e.event.body.internal_transactions.iter().cloned())
            .collect();
        if itxs.is_empty() {
            return Ok((itxs, Vec::new()));
        }

        let mut current = self.latest_peer_set()?;
        let mut changed = false;
        let mut receipts = Vec::with_capacity(itxs.len());
        for itx in &itxs {
            let next = match itx.body.kind {
                TransactionKind::PeerAdd => current.with_new_peer(itx.body.peer.clone()).ok(),
                TransactionKind::PeerRemove => {
                    let member = current.get_by_pub_key(&itx.body.peer.pub_key).is_some();
                    if member && current.len() > 1 {
                        current.with_removed_peer(itx.body.peer.id).ok()
                    } else {
                        None
                    }
                }
            };
            let accepted = next.is_some();
            if let Some(next) = next {
                current = next;
                changed = true;
            }
            info!(
                kind = ?itx.body.kind,
                peer = %itx.body.peer.id,
                accepted,
                round,
                "membership change"
            );
            receipts.push(InternalTransactionReceipt {
                transaction: itx.clone(),
                accepted,
            });
        }

        if changed {
            let effective = round + PEER_SET_ACTIVATION_DELAY;
            self.store.set_peer_set(effective, &current)?;
            self.repertoire = self.store.repertoire()?;
            info!(effective, peers = current.len(), "new peer set");
        }
        Ok((itxs, receipts))
    }

    fn build_frame(&self, round: u64, events: &[EventRecord]) -> Result<Frame> {
        let mut roots = Vec::with_capacity(self.roots.len());
        for (_, hash) in self.roots.values() {
            roots.push(self.record(hash)?.to_frame_event());
        }
        let peer_sets = self
            .store
            .get_all_peer_sets()?
            .into_iter()
            .map(|(r, set)| (r, set.into_peers()))
            .collect();
        let peers: PeerSet = self.peer_set(round)?;

        Ok(Frame {
            round,
            peers: peers.into_peers(),
            roots,
            events: events.iter().map(EventRecord::to_frame_event).collect(),
            peer_sets,
            timestamp: events
                .last()
                .and_then(|e| e.consensus_timestamp)
                .unwrap_or_default(),
        })
    }
}

/// Consensus order within a round received: consensus timestamp, then the
/// signature whitened with the famous witnesses' signatures, then the hash
fn sort_consensus(events: &mut [EventRecord], whitener: &[u8]) {
    let whitened = |e: &EventRecord| {
        let mut sig = e.signature().to_vec();
        xor_into(&mut sig, whitener);
        sig
    };
    events.sort_by(|a, b| {
        a.consensus_timestamp
            .cmp(&b.consensus_timestamp)
            .then_with(|| whitened(a).cmp(&whitened(b)))
            .then_with(|| a.hash.cmp(&b.hash))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use swirl_core::{Event, KeyPair};

    fn record(seed: u8, ts: u64) -> EventRecord {
        let key = KeyPair::from_seed(&[seed; 32]);
        let mut event = Event::new(vec![], vec![], vec![], (None, None), key.public_key(), 0);
        event.body.timestamp = ts;
        event.sign(&key).unwrap();
        let mut r = EventRecord::new(event, seed as u64).unwrap();
        r.consensus_timestamp = Some(ts);
        r
    }

    #[test]
    fn test_sort_by_timestamp_first() {
        let mut events = vec![record(1, 30), record(2, 10), record(3, 20)];
        sort_consensus(&mut events, &[]);
        let ts: Vec<_> = events.iter().map(|e| e.consensus_timestamp).collect();
        assert_eq!(ts, vec![Some(10), Some(20), Some(30)]);
    }

    #[test]
    fn test_ties_broken_by_whitened_signature() {
        let a = record(1, 10);
        let b = record(2, 10);
        let whitener = vec![0xff; 64];

        let mut plain = vec![a.clone(), b.clone()];
        sort_consensus(&mut plain, &[]);
        let mut whitened = vec![a.clone(), b.clone()];
        sort_consensus(&mut whitened, &whitener);

        // Complementing every bit reverses the order of distinct signatures
        assert_eq!(plain[0].hash, whitened[1].hash);
        assert_eq!(plain[1].hash, whitened[0].hash);
    }
}
