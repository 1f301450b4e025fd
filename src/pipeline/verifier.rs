/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The admission gate that authenticates inbound consensus events.
//!
//! This is the sole point where Byzantine-authored garbage is filtered out: everything
//! downstream may assume authenticated, validator-set-member input (though not input that is
//! valid per protocol rules).

use ed25519_dalek::{Signature, Verifier};

use crate::messages::ConsensusEvent;
use crate::types::certificates::timeout_vote_message;
use crate::types::signed_messages::SignedMessage;
use crate::types::validators::{BFTNode, BFTValidatorSet};

/// Why an inbound event failed verification. Failures are logged and the event dropped; they are
/// never propagated as errors, and this layer does not penalize the sender.
#[derive(Debug)]
pub enum VerificationError {
    /// The event's claimed author is not a member of the current validator set.
    UnknownAuthor(BFTNode),
    /// The event's signature does not verify under the author's public key.
    InvalidSignature(BFTNode),
}

/// Authenticates the authorship of inbound [`ConsensusEvent`]s against the current validator set.
#[derive(Default)]
pub struct EventVerifier;

impl EventVerifier {
    pub fn new() -> EventVerifier {
        EventVerifier
    }

    /// Check that `event` is authored by a member of `validator_set` and that every signature it
    /// carries verifies under the author's public key.
    pub fn verify(
        &self,
        event: &ConsensusEvent,
        validator_set: &BFTValidatorSet,
    ) -> Result<(), VerificationError> {
        let author = *event.author();
        if !validator_set.contains_node(&author) {
            return Err(VerificationError::UnknownAuthor(author));
        }

        let correct = match event {
            ConsensusEvent::Proposal(proposal) => proposal.is_correct(author.key()),
            ConsensusEvent::Vote(vote) => {
                let timeout_correct = match vote.timeout_signature() {
                    Some(timeout_signature) => {
                        let signature = Signature::from_bytes(&timeout_signature.bytes());
                        author
                            .key()
                            .verify(&timeout_vote_message(vote.view()), &signature)
                            .is_ok()
                    }
                    None => true,
                };
                vote.is_correct(author.key()) && timeout_correct
            }
            ConsensusEvent::NewView(new_view) => new_view.is_correct(author.key()),
        };

        if correct {
            Ok(())
        } else {
            Err(VerificationError::InvalidSignature(author))
        }
    }
}
