/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definition of the [Certificate] trait, which specifies the minimal signature for types that
//! serve as evidence that a quorum of validators supports a given action. Also defines:
//! 1. The [QuorumCertificate] type, which aggregates the validators' votes for a vertex.
//! 2. The [TimeoutCertificate] type, which aggregates the validators' timeout votes for a view.

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Verifier};
use sha2::Digest;

use super::basic::{CryptoHash, SignatureBytes, TotalPower, View};
use super::validators::{BFTNode, BFTValidatorSet};
use super::vertex::{BFTHeader, CryptoHasher};

/// The values a vote's signature is over: the proposed vertex, its parent, and (if the vote's
/// 2-chain commits one) the vertex that becomes committed.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct VoteData {
    proposed: BFTHeader,
    parent: BFTHeader,
    committed: Option<BFTHeader>,
}

impl VoteData {
    /// Create a new `VoteData`.
    pub const fn new(
        proposed: BFTHeader,
        parent: BFTHeader,
        committed: Option<BFTHeader>,
    ) -> VoteData {
        VoteData {
            proposed,
            parent,
            committed,
        }
    }

    /// Get the header of the vertex this vote is for.
    pub const fn proposed(&self) -> &BFTHeader {
        &self.proposed
    }

    /// Get the header of the proposed vertex's parent.
    pub const fn parent(&self) -> &BFTHeader {
        &self.parent
    }

    /// Get the header of the vertex this vote commits, if any.
    pub const fn committed(&self) -> Option<&BFTHeader> {
        self.committed.as_ref()
    }

    /// Compute the SHA256 hash over the Borsh serialization of this `VoteData`.
    pub fn hash(&self) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(self.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }
}

/// Signatures from a subset of a validator set, keyed by signer.
///
/// Unlike a positional signature vector, a keyed set allows a single author's signature to be
/// located and removed while the set is still being accumulated, which vote replacement requires.
#[derive(Clone, Debug, PartialEq, Eq, Default, BorshDeserialize, BorshSerialize)]
pub struct SignatureSet(Vec<(BFTNode, SignatureBytes)>);

impl SignatureSet {
    /// Create an empty `SignatureSet`.
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Create a `SignatureSet` from `(signer, signature)` pairs.
    pub fn from_pairs(pairs: Vec<(BFTNode, SignatureBytes)>) -> Self {
        Self(pairs)
    }

    /// Iterate through the `(signer, signature)` pairs in this set.
    pub fn iter(&self) -> std::slice::Iter<'_, (BFTNode, SignatureBytes)> {
        self.0.iter()
    }

    /// Iterate through the signers in this set.
    pub fn signers(&self) -> impl Iterator<Item = &BFTNode> {
        self.0.iter().map(|(node, _)| node)
    }

    /// Get how many signatures are in this set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether this set contains no signatures.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Certificates serve as proof that a quorum of validators has done something, e.g., voted for a
/// vertex. The correctness of a certificate can be validated with [`Certificate::is_correct`]
/// given the validator set it was formed under.
pub trait Certificate {
    fn is_correct(&self, validator_set: &BFTValidatorSet) -> bool;
}

/// Proof that at least a quorum of validators voted for a given vertex at a given view.
///
/// The certificate's view is the view of its proposed header. A quorum certificate whose proposed
/// header is at the genesis view is the genesis certificate and is correct by definition.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct QuorumCertificate {
    vote_data: VoteData,
    signatures: SignatureSet,
}

impl QuorumCertificate {
    /// Create a new `QuorumCertificate` over `vote_data` with the given `signatures`.
    pub const fn new(vote_data: VoteData, signatures: SignatureSet) -> QuorumCertificate {
        QuorumCertificate {
            vote_data,
            signatures,
        }
    }

    /// Create the self-certifying certificate for a genesis vertex anchored by `genesis_header`.
    pub const fn genesis_qc(genesis_header: BFTHeader) -> QuorumCertificate {
        QuorumCertificate {
            vote_data: VoteData::new(genesis_header, genesis_header, None),
            signatures: SignatureSet::new(),
        }
    }

    /// Check whether this is a genesis certificate.
    pub fn is_genesis_qc(&self) -> bool {
        self.view().is_genesis()
    }

    /// Get the view this certificate was formed in.
    pub fn view(&self) -> View {
        self.vote_data.proposed().view()
    }

    /// Get the vote data this certificate's signatures are over.
    pub const fn vote_data(&self) -> &VoteData {
        &self.vote_data
    }

    /// Get the header of the vertex this certificate certifies.
    pub const fn proposed(&self) -> &BFTHeader {
        self.vote_data.proposed()
    }

    /// Get the header of the certified vertex's parent.
    pub const fn parent(&self) -> &BFTHeader {
        self.vote_data.parent()
    }

    /// Get the header of the vertex this certificate commits, if any.
    pub const fn committed(&self) -> Option<&BFTHeader> {
        self.vote_data.committed()
    }

    /// Iterate through the validators whose signatures form this certificate.
    pub fn signers(&self) -> impl Iterator<Item = &BFTNode> {
        self.signatures.signers()
    }

    /// Get the signatures forming this certificate.
    pub const fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }
}

impl Certificate for QuorumCertificate {
    /// Checks if all of the signatures in the certificate are correct, and if the set of
    /// signatures forms a quorum.
    ///
    /// A special case is if the qc is the genesis qc, in which case it is automatically correct.
    fn is_correct(&self, validator_set: &BFTValidatorSet) -> bool {
        if self.is_genesis_qc() {
            return true;
        }

        let message = self.vote_data.try_to_vec().unwrap();

        // Check whether every signature is from a validator and correct, and tally up the
        // signers' powers.
        let mut total_power = TotalPower::new(0);
        for (signer, signature_bytes) in self.signatures.iter() {
            let power = match validator_set.power(signer) {
                Some(power) => *power,
                None => return false,
            };

            let signature = Signature::from_bytes(&signature_bytes.bytes());
            if signer.key().verify(&message, &signature).is_err() {
                // qc contains incorrect signature.
                return false;
            }

            total_power += power;
        }

        // Check if the signatures form a quorum.
        total_power >= validator_set.quorum_threshold()
    }
}

/// Proof that at least a quorum of validators sent a timeout vote for the same view without
/// agreeing on a proposal.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct TimeoutCertificate {
    view: View,
    signatures: SignatureSet,
}

impl TimeoutCertificate {
    /// Create a new `TimeoutCertificate` for `view` with the given `signatures`.
    pub const fn new(view: View, signatures: SignatureSet) -> TimeoutCertificate {
        TimeoutCertificate { view, signatures }
    }

    /// Get the view that this certificate's signers timed out.
    pub const fn view(&self) -> View {
        self.view
    }

    /// Iterate through the validators whose signatures form this certificate.
    pub fn signers(&self) -> impl Iterator<Item = &BFTNode> {
        self.signatures.signers()
    }

    /// Get the signatures forming this certificate.
    pub const fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }
}

impl Certificate for TimeoutCertificate {
    /// Checks if all of the signatures in the certificate are correct, and if the set of
    /// signatures forms a quorum.
    fn is_correct(&self, validator_set: &BFTValidatorSet) -> bool {
        let message = timeout_vote_message(self.view);

        let mut total_power = TotalPower::new(0);
        for (signer, signature_bytes) in self.signatures.iter() {
            let power = match validator_set.power(signer) {
                Some(power) => *power,
                None => return false,
            };

            let signature = Signature::from_bytes(&signature_bytes.bytes());
            if signer.key().verify(&message, &signature).is_err() {
                // tc contains incorrect signature.
                return false;
            }

            total_power += power;
        }

        total_power >= validator_set.quorum_threshold()
    }
}

/// The values a timeout vote's timeout signature is over. Domain-separated from vote data so that
/// a timeout signature can never be mistaken for any other signed message.
pub fn timeout_vote_message(view: View) -> Vec<u8> {
    (b"timeout".to_vec(), view).try_to_vec().unwrap()
}
