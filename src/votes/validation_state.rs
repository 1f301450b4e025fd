/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The per-(view, vertex) accumulator of stake-weighted signatures.

use dashmap::DashMap;

use crate::types::basic::{SignatureBytes, TotalPower};
use crate::types::certificates::SignatureSet;
use crate::types::validators::{BFTNode, BFTValidatorSet};

/// Accumulates signatures from validators of one [`BFTValidatorSet`] until their combined power
/// reaches the set's [quorum threshold](BFTValidatorSet::quorum_threshold).
///
/// The consensus core mutates a `ValidationState` strictly sequentially, but the signature map is
/// a [`DashMap`] because diagnostic readers outside the core may observe it concurrently with
/// mutation. This does not make mutation multi-writer safe, and it does not need to.
pub struct ValidationState {
    validator_set: BFTValidatorSet,
    threshold: TotalPower,
    signed_power: TotalPower,
    signatures: DashMap<BFTNode, SignatureBytes>,
}

impl ValidationState {
    /// Create an empty `ValidationState` accumulating against `validator_set`'s quorum threshold.
    pub fn new(validator_set: BFTValidatorSet) -> ValidationState {
        ValidationState {
            threshold: validator_set.quorum_threshold(),
            validator_set,
            signed_power: TotalPower::new(0),
            signatures: DashMap::new(),
        }
    }

    /// Check whether no signatures have been accumulated yet.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Add `node`'s signature, contributing its full stake weight once.
    ///
    /// Idempotent per node: a second signature from the same node is ignored. Returns whether the
    /// signature was newly added.
    pub fn add_signature(&mut self, node: &BFTNode, signature: SignatureBytes) -> bool {
        let power = match self.validator_set.power(node) {
            Some(power) => *power,
            None => return false,
        };

        if self.signatures.contains_key(node) {
            return false;
        }

        self.signatures.insert(*node, signature);
        self.signed_power += power;
        true
    }

    /// Remove `node`'s signature, if present, subtracting its stake weight. Returns whether a
    /// signature was removed.
    pub fn remove_signature(&mut self, node: &BFTNode) -> bool {
        if self.signatures.remove(node).is_none() {
            return false;
        }

        if let Some(power) = self.validator_set.power(node) {
            self.signed_power -= *power;
        }
        true
    }

    /// Check whether the accumulated signed power has reached the quorum threshold.
    pub fn complete(&self) -> bool {
        self.signed_power >= self.threshold
    }

    /// Get the accumulated signed power.
    pub fn signed_power(&self) -> TotalPower {
        self.signed_power
    }

    /// Snapshot the accumulated signatures as a [`SignatureSet`], ordered by the validator set's
    /// canonical node order.
    pub fn signatures(&self) -> SignatureSet {
        let pairs = self
            .validator_set
            .nodes()
            .filter_map(|node| {
                self.signatures
                    .get(node)
                    .map(|signature| (*node, *signature.value()))
            })
            .collect();
        SignatureSet::from_pairs(pairs)
    }
}
