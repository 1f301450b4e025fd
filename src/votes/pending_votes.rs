/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Aggregation of votes and timeout votes into quorum and timeout certificates.

use std::collections::HashMap;

use crate::messages::Vote;
use crate::types::basic::{CryptoHash, View};
use crate::types::certificates::{QuorumCertificate, TimeoutCertificate};
use crate::types::validators::{BFTNode, BFTValidatorSet};

use super::validation_state::ValidationState;

/// The outcome of inserting one vote into [`PendingVotes`].
#[derive(Debug, PartialEq, Eq)]
pub enum VoteProcessingResult {
    /// The vote was accepted but no quorum has been reached yet.
    VoteAccepted,
    /// The vote was rejected and did not count.
    VoteRejected(VoteRejectedReason),
    /// The vote completed a quorum.
    QuorumReached(ViewVotingResult),
}

/// Why a vote was rejected by [`PendingVotes::insert_vote`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteRejectedReason {
    /// The vote's author is not a member of the validator set.
    InvalidAuthor,
    /// An identical vote from the same author was already accepted, and this submission carries
    /// no new information.
    DuplicateVote,
}

/// What kind of quorum a view produced: agreement on a vertex, or agreement that the view timed
/// out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewVotingResult {
    FormedQC(QuorumCertificate),
    FormedTC(TimeoutCertificate),
}

impl ViewVotingResult {
    /// Get the view the quorum was formed in.
    pub fn view(&self) -> View {
        match self {
            ViewVotingResult::FormedQC(qc) => qc.view(),
            ViewVotingResult::FormedTC(tc) => tc.view(),
        }
    }
}

// The single most recent vote accepted from an author. A later vote from the same author evicts
// this one's signatures from the tallies it contributed to.
#[derive(Clone, PartialEq, Eq)]
struct PreviousVote {
    view: View,
    vote_data_hash: CryptoHash,
    is_timeout: bool,
}

/// Owns one [`ValidationState`] per (view, vote data) pair for regular votes, and a second one
/// per view for timeout votes, and converts accepted votes into [`VoteProcessingResult`]s.
///
/// Every vote contributes its regular signature to the per-(view, vote data) tally; a vote that
/// additionally carries a timeout signature contributes that signature, separately, to the
/// per-view timeout tally.
pub struct PendingVotes {
    vote_state: HashMap<(View, CryptoHash), ValidationState>,
    timeout_vote_state: HashMap<View, ValidationState>,
    previous_votes: HashMap<BFTNode, PreviousVote>,
}

impl Default for PendingVotes {
    fn default() -> Self {
        PendingVotes::new()
    }
}

impl PendingVotes {
    /// Create an empty `PendingVotes`.
    pub fn new() -> PendingVotes {
        PendingVotes {
            vote_state: HashMap::new(),
            timeout_vote_state: HashMap::new(),
            previous_votes: HashMap::new(),
        }
    }

    /// Insert `vote` into the pending tallies under `validator_set`.
    ///
    /// Rejects votes from non-members and duplicate votes, evicts the author's previous vote if
    /// this one replaces it, and reports a newly-completed quorum. If inserting the vote
    /// completes both the timeout tally and a vertex tally at once, the timeout certificate wins.
    pub fn insert_vote(
        &mut self,
        vote: &Vote,
        validator_set: &BFTValidatorSet,
    ) -> VoteProcessingResult {
        let author = vote.author();
        if !validator_set.contains_node(author) {
            return VoteProcessingResult::VoteRejected(VoteRejectedReason::InvalidAuthor);
        }

        let view = vote.view();
        let vote_data_hash = vote.vote_data().hash();
        let is_timeout = vote.is_timeout();

        if let Some(previous) = self.previous_votes.get(author).cloned() {
            if previous.view == view && previous.vote_data_hash == vote_data_hash {
                // Same vote as before. The only submission that carries new information is a
                // non-timeout vote upgraded to a timeout vote.
                if previous.is_timeout || !is_timeout {
                    return VoteProcessingResult::VoteRejected(VoteRejectedReason::DuplicateVote);
                }
            } else {
                // The author switched votes. Only the latest vote may count, so the previous
                // vote's signatures are evicted before the new one lands.
                self.remove_previous_vote(author, &previous);
            }
        }

        self.previous_votes.insert(
            *author,
            PreviousVote {
                view,
                vote_data_hash,
                is_timeout,
            },
        );

        let vote_state = self
            .vote_state
            .entry((view, vote_data_hash))
            .or_insert_with(|| validator_set.new_validation_state());
        vote_state.add_signature(author, vote.signature());
        let vote_state_complete = vote_state.complete();

        let timeout_state_complete = if let Some(timeout_signature) = vote.timeout_signature() {
            let timeout_state = self
                .timeout_vote_state
                .entry(view)
                .or_insert_with(|| validator_set.new_validation_state());
            timeout_state.add_signature(author, timeout_signature);
            timeout_state.complete()
        } else {
            false
        };

        if timeout_state_complete {
            let state = self.timeout_vote_state.remove(&view).unwrap();
            return VoteProcessingResult::QuorumReached(ViewVotingResult::FormedTC(
                TimeoutCertificate::new(view, state.signatures()),
            ));
        }

        if vote_state_complete {
            let state = self.vote_state.remove(&(view, vote_data_hash)).unwrap();
            return VoteProcessingResult::QuorumReached(ViewVotingResult::FormedQC(
                QuorumCertificate::new(vote.vote_data().clone(), state.signatures()),
            ));
        }

        VoteProcessingResult::VoteAccepted
    }

    fn remove_previous_vote(&mut self, author: &BFTNode, previous: &PreviousVote) {
        let key = (previous.view, previous.vote_data_hash);
        if let Some(state) = self.vote_state.get_mut(&key) {
            state.remove_signature(author);
            if state.is_empty() {
                self.vote_state.remove(&key);
            }
        }

        if previous.is_timeout {
            if let Some(state) = self.timeout_vote_state.get_mut(&previous.view) {
                state.remove_signature(author);
                if state.is_empty() {
                    self.timeout_vote_state.remove(&previous.view);
                }
            }
        }
    }

    /// Discard all tallies and previous-vote records for views before `current_view`. Called when
    /// the view advances; votes for past views can no longer form a useful quorum.
    pub fn clear_stale_votes(&mut self, current_view: View) {
        self.vote_state
            .retain(|(view, _), _| *view >= current_view);
        self.timeout_vote_state
            .retain(|view, _| *view >= current_view);
        self.previous_votes
            .retain(|_, previous| previous.view >= current_view);
    }

    /// Get the number of (view, vote data) tallies currently pending.
    pub fn vote_state_size(&self) -> usize {
        self.vote_state.len()
    }

    /// Get the number of per-view timeout tallies currently pending.
    pub fn timeout_vote_state_size(&self) -> usize {
        self.timeout_vote_state.len()
    }

    /// Get the number of authors with a recorded previous vote.
    pub fn previous_votes_size(&self) -> usize {
        self.previous_votes.len()
    }
}
