/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" newtypes that are sent around and inspected but have no active behavior: views, content
//! hashes, stake weights, signatures, and commands.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Add, AddAssign, Sub, SubAssign},
};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};

/// One round of the leader-rotation protocol.
///
/// Views are totally ordered and monotonically increasing. [`View::genesis`] is the distinguished
/// initial view.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct View(u64);

impl View {
    /// Create a new `View` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the genesis `View`, which is 0.
    pub const fn genesis() -> Self {
        Self(0)
    }

    /// Check whether this is the genesis view.
    pub const fn is_genesis(&self) -> bool {
        self.0 == 0
    }

    /// Get the view immediately after this one.
    pub const fn next(&self) -> View {
        View(self.0 + 1)
    }

    /// Get the inner `u64` of this `View`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for View {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl Add<u64> for View {
    type Output = View;

    fn add(self, rhs: u64) -> Self::Output {
        View(self.0.add(rhs))
    }
}

impl Sub<View> for View {
    type Output = i64;

    fn sub(self, rhs: View) -> Self::Output {
        (self.0 as i64).sub(rhs.0 as i64)
    }
}

/// 32-byte content-derived hash.
///
/// Within this crate, `CryptoHash`-es identify vertices and vote data, and are always SHA256
/// hashes over the Borsh serialization of the hashed value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Get the first seven characters of the Base64 encoding of this hash. Used to identify the
    /// hash in log messages.
    pub fn short(&self) -> String {
        STANDARD_NO_PAD.encode(self.0).chars().take(7).collect()
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

/// Weight of a specific validator's votes in consensus decisions.
///
/// The higher the power, the more weight the validator's votes have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Power(u128);

impl Power {
    /// Create a new `Power` wrapping `int`.
    pub const fn new(int: u128) -> Self {
        Self(int)
    }

    /// Get the inner `u128` value of this `Power`.
    pub const fn int(&self) -> u128 {
        self.0
    }
}

/// Sum of the [`Power`]s of a set of validators.
///
/// Users must make sure that the total power of a validator set does not exceed `u128::MAX`;
/// summation is checked and panics on overflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct TotalPower(u128);

impl TotalPower {
    const TOTAL_POWER_OVERFLOW: &'static str =
        "Validator set power exceeds u128::MAX. Read the itemdoc for `TotalPower`.";

    /// Create a new `TotalPower` wrapping `int`.
    pub const fn new(int: u128) -> Self {
        Self(int)
    }

    /// Get the inner `u128` value of this `TotalPower`.
    pub const fn int(&self) -> u128 {
        self.0
    }
}

impl AddAssign<Power> for TotalPower {
    fn add_assign(&mut self, rhs: Power) {
        self.0 = self
            .0
            .checked_add(rhs.0)
            .expect(Self::TOTAL_POWER_OVERFLOW)
    }
}

impl SubAssign<Power> for TotalPower {
    fn sub_assign(&mut self, rhs: Power) {
        self.0 = self.0.saturating_sub(rhs.0)
    }
}

/// Ed25519 digital signature represented in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

/// Opaque ledger command carried by a vertex.
///
/// The command format is defined by the ledger that executes commands, not by this crate. An empty
/// vertex (one that extends the chain without proposing a command) carries no `Command` at all.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Command(Vec<u8>);

impl Command {
    /// Create a new `Command` wrapping `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get a reference to the inner `Vec<u8>` of this `Command`.
    pub const fn bytes(&self) -> &Vec<u8> {
        &self.0
    }
}

/// Position in the ledger's totally-ordered command history.
///
/// State versions increase by 1 for every command the ledger applies, and are used to decide
/// whether a committed state targeted by sync is already reflected locally.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct StateVersion(u64);

impl StateVersion {
    /// Create a new `StateVersion` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `StateVersion`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for StateVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}
