//! Per-round witness and fame bookkeeping

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use swirl_core::EventHash;

/// Outcome of virtual voting on a witness
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Fame {
    Undecided,
    Famous,
    NotFamous,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundInfo {
    /// Witness hash -> fame. Keyed by hash so iteration order is the same on
    /// every node.
    pub witnesses: BTreeMap<EventHash, Fame>,
    /// Fame of every witness is settled
    pub decided: bool,
}

impl RoundInfo {
    pub fn add_witness(&mut self, hash: EventHash) {
        self.witnesses.entry(hash).or_insert(Fame::Undecided);
    }

    /// Decided fame is final; later calls are ignored
    pub fn set_fame(&mut self, hash: &EventHash, fame: Fame) {
        if let Some(current) = self.witnesses.get_mut(hash) {
            if *current == Fame::Undecided {
                *current = fame;
            }
        }
    }

    pub fn fame(&self, hash: &EventHash) -> Option<Fame> {
        self.witnesses.get(hash).copied()
    }

    pub fn witness_hashes(&self) -> impl Iterator<Item = &EventHash> {
        self.witnesses.keys()
    }

    pub fn undecided_witnesses(&self) -> Vec<EventHash> {
        self.witnesses
            .iter()
            .filter(|(_, f)| **f == Fame::Undecided)
            .map(|(h, _)| *h)
            .collect()
    }

    pub fn famous_witnesses(&self) -> Vec<EventHash> {
        self.witnesses
            .iter()
            .filter(|(_, f)| **f == Fame::Famous)
            .map(|(h, _)| *h)
            .collect()
    }

    pub fn all_decided(&self) -> bool {
        self.witnesses.values().all(|f| *f != Fame::Undecided)
    }
}
