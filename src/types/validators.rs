/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that identify validators and store the composition of a validator set for one epoch.

use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt::{self, Debug, Display, Formatter},
    io, slice,
};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::VerifyingKey;

use crate::votes::validation_state::ValidationState;

use super::basic::{Power, TotalPower};

/// Identity of a validator: an Ed25519 verifying key plus a derived short id for display.
///
/// `BFTNode`s are cheap to copy and are used as map keys throughout the crate. Equality, hashing
/// and ordering are all over the key's canonical 32-byte encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BFTNode {
    key: VerifyingKey,
}

impl BFTNode {
    /// Create a new `BFTNode` wrapping `key`.
    pub const fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Get the verifying key of this `BFTNode`.
    pub const fn key(&self) -> &VerifyingKey {
        &self.key
    }

    /// Get the first seven characters of the Base64 encoding of the verifying key. Used to
    /// identify the node in log messages.
    pub fn short_id(&self) -> String {
        STANDARD_NO_PAD
            .encode(self.key.to_bytes())
            .chars()
            .take(7)
            .collect()
    }
}

impl PartialOrd for BFTNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BFTNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.to_bytes().cmp(&other.key.to_bytes())
    }
}

impl Display for BFTNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_id())
    }
}

impl Debug for BFTNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_id())
    }
}

// `VerifyingKey` does not implement the Borsh traits, so `BFTNode` serializes as the key's 32-byte
// encoding. Deserialization validates that the bytes are a valid Ed25519 point.
impl BorshSerialize for BFTNode {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        self.key.to_bytes().serialize(writer)
    }
}

impl BorshDeserialize for BFTNode {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let bytes = <[u8; 32]>::deserialize_reader(reader)?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "bytes are not a valid Ed25519 verifying key",
            )
        })?;
        Ok(BFTNode::new(key))
    }
}

/// A validator together with its voting power.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct BFTValidator {
    node: BFTNode,
    power: Power,
}

impl BFTValidator {
    /// Create a new `BFTValidator` from `node` and `power`.
    pub const fn new(node: BFTNode, power: Power) -> Self {
        Self { node, power }
    }

    /// Get the node of this `BFTValidator`.
    pub const fn node(&self) -> &BFTNode {
        &self.node
    }

    /// Get the power of this `BFTValidator`.
    pub const fn power(&self) -> Power {
        self.power
    }
}

/// Immutable set of validators for one epoch.
///
/// ## Ordering of validators
///
/// `BFTValidatorSet` internally maintains the list of validators in ascending order of their
/// verifying keys, and [`nodes`](Self::nodes) walks through them in this order.
///
/// ## Immutability
///
/// A validator set is never mutated in place. At an epoch boundary the embedding node constructs a
/// fresh set and swaps it wholesale.
#[derive(Clone, PartialEq)]
pub struct BFTValidatorSet {
    // The nodes of validators are included here in ascending order of their verifying keys.
    nodes: Vec<BFTNode>,
    powers: HashMap<BFTNode, Power>,
}

impl BFTValidatorSet {
    /// Create a validator set from `validators`.
    ///
    /// If the same node appears more than once, the last occurrence's power wins.
    pub fn from_validators(validators: impl IntoIterator<Item = BFTValidator>) -> Self {
        let mut set = Self {
            nodes: Vec::new(),
            powers: HashMap::new(),
        };
        for validator in validators {
            set.put(validator.node(), validator.power());
        }
        set
    }

    fn put(&mut self, node: &BFTNode, power: Power) {
        if !self.contains_node(node) {
            let insert_pos = self.nodes.binary_search(node).unwrap_err();
            self.nodes.insert(insert_pos, *node);
        }

        self.powers.insert(*node, power);
    }

    /// Check whether the validator set contains `node`.
    pub fn contains_node(&self, node: &BFTNode) -> bool {
        self.powers.contains_key(node)
    }

    /// Get the power of the specified `node` inside the validator set.
    pub fn power(&self, node: &BFTNode) -> Option<&Power> {
        self.powers.get(node)
    }

    /// Get the sum of the powers of all of the validators inside the validator set.
    pub fn total_power(&self) -> TotalPower {
        let mut total_power = TotalPower::new(0);
        for power in self.powers.values() {
            total_power += *power
        }
        total_power
    }

    /// Compute the total power that a set of signatures must match or exceed (`>=`) in order to
    /// count as a Byzantine quorum under this validator set.
    ///
    /// The threshold is `n - f` where `n` is the total power and `f = (n - 1) / 3` (integer
    /// division) is the tolerated faulty power.
    pub fn quorum_threshold(&self) -> TotalPower {
        let n = self.total_power().int();
        if n == 0 {
            return TotalPower::new(0);
        }
        TotalPower::new(n - (n - 1) / 3)
    }

    /// Get an iterator through validators' nodes which walks through them in ascending order of
    /// their verifying keys.
    pub fn nodes(&self) -> slice::Iter<BFTNode> {
        self.nodes.iter()
    }

    /// Get a vector containing each node and its power, in ascending order of the nodes'
    /// verifying keys.
    pub fn nodes_and_powers(&self) -> Vec<(BFTNode, Power)> {
        self.nodes().map(|n| (*n, *self.power(n).unwrap())).collect()
    }

    /// Get the number of validators currently in the validator set.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check whether the validator set is empty (i.e., `self.len() == 0`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a fresh [`ValidationState`] that accumulates signatures against this validator
    /// set's [quorum threshold](Self::quorum_threshold).
    pub fn new_validation_state(&self) -> ValidationState {
        ValidationState::new(self.clone())
    }
}
