/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The final pipeline stage: applies admitted events to the vote aggregator and the vertex
//! store, and emits the formed-QC/formed-TC notifications the external pacemaker consumes.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::events::{Event, QuorumReachedEvent, ReceiveNewViewEvent};
use crate::messages::{NewView, Proposal, Vote};
use crate::types::basic::View;
use crate::types::validators::BFTValidatorSet;
use crate::types::vertex::VerifiedVertex;
use crate::vertex_store::VertexStore;
use crate::votes::pending_votes::{PendingVotes, ViewVotingResult, VoteProcessingResult};

/// Reduces admitted events into vote-aggregation state and vertex-store mutations.
///
/// The reducer keeps the view-progress bookkeeping needed to decide when a view is won: once a
/// quorum (QC or TC) has been formed for the current view, subsequent votes are ignored until the
/// pacemaker advances the view.
pub struct EventReducer {
    validator_set: BFTValidatorSet,
    pending_votes: PendingVotes,
    event_publisher: Option<Sender<Event>>,
    current_view: View,
    has_reached_quorum: bool,
}

impl EventReducer {
    /// Create an `EventReducer` aggregating votes under `validator_set`, starting at
    /// `initial_view`.
    pub fn new(
        validator_set: BFTValidatorSet,
        event_publisher: Option<Sender<Event>>,
        initial_view: View,
    ) -> EventReducer {
        EventReducer {
            validator_set,
            pending_votes: PendingVotes::new(),
            event_publisher,
            current_view: initial_view,
            has_reached_quorum: false,
        }
    }

    /// Note that the pacemaker advanced the current view: the reached-quorum latch resets and
    /// tallies for past views are discarded.
    pub fn process_view_update(&mut self, view: View) {
        if view <= self.current_view {
            return;
        }

        self.current_view = view;
        self.has_reached_quorum = false;
        self.pending_votes.clear_stale_votes(view);
    }

    /// Apply an admitted vote to the vote aggregator, emitting a
    /// [`QuorumReached`](Event::QuorumReached) notification if it completes a quorum.
    pub fn process_vote(&mut self, vote: Vote, store: &mut VertexStore) {
        log::trace!("Vote: processing from {}", vote.author());

        if vote.view() < self.current_view {
            log::trace!(
                "Vote: ignoring vote from {} for view {}, current view at {}",
                vote.author(),
                vote.view(),
                self.current_view
            );
            return;
        }

        if self.has_reached_quorum {
            log::trace!(
                "Vote: ignoring vote from {} for view {}, quorum has already been reached",
                vote.author(),
                vote.view()
            );
            return;
        }

        match self.pending_votes.insert_vote(&vote, &self.validator_set) {
            VoteProcessingResult::VoteAccepted => {
                log::trace!("Vote: processed but no quorum formed yet")
            }
            VoteProcessingResult::VoteRejected(reason) => {
                log::debug!("Vote: rejected because of {:?}", reason)
            }
            VoteProcessingResult::QuorumReached(result) => {
                self.has_reached_quorum = true;
                if let ViewVotingResult::FormedTC(tc) = &result {
                    store.insert_timeout_certificate(tc.clone());
                }
                Event::publish(
                    &self.event_publisher,
                    Event::QuorumReached(QuorumReachedEvent {
                        timestamp: SystemTime::now(),
                        result,
                        last_author: *vote.author(),
                    }),
                );
            }
        }
    }

    /// Apply an admitted proposal: hash the proposed vertex and insert it into the store.
    pub fn process_proposal(&mut self, proposal: Proposal, store: &mut VertexStore) {
        log::trace!("Proposal: processing from {}", proposal.author());

        if proposal.view() < self.current_view {
            log::trace!(
                "Proposal: ignoring view {}, current is {}",
                proposal.view(),
                self.current_view
            );
            return;
        }

        let vertex = VerifiedVertex::new(proposal.vertex);
        if let Err(error) = store.insert_vertex(vertex) {
            // The preprocessor's sync gate guarantees the parent is present, so this indicates
            // a proposal racing a cleared sync.
            log::warn!("Proposal: could not insert proposed vertex: {:?}", error);
        }
    }

    /// Apply an admitted new-view: fold any carried timeout certificate into the store and
    /// surface the sender's view intent to the pacemaker.
    pub fn process_new_view(&mut self, new_view: NewView, store: &mut VertexStore) {
        log::trace!(
            "NewView: processing from {} for view {}",
            new_view.author,
            new_view.view
        );

        if let Some(tc) = new_view.highest_tc.clone() {
            store.insert_timeout_certificate(tc);
        }

        Event::publish(
            &self.event_publisher,
            Event::ReceiveNewView(ReceiveNewViewEvent {
                timestamp: SystemTime::now(),
                origin: new_view.author,
                view: new_view.view,
            }),
        );
    }
}
