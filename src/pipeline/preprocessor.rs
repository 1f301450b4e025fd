/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Per-author ordering and sync-gating of authenticated events.
//!
//! Each author gets its own FIFO queue so that a slow or out-of-order author can neither starve
//! nor reorder other authors' events. A proposal or new-view whose prerequisite vertex is not in
//! the store is held back in its author's queue while the store syncs; once the store reports the
//! sync complete, queued events are replayed, draining each queue while its head has become
//! satisfiable.

use std::collections::{HashMap, VecDeque};

use crate::ledger::ProposerElection;
use crate::messages::ConsensusEvent;
use crate::types::basic::{CryptoHash, View};
use crate::types::validators::BFTNode;
use crate::vertex_store::VertexStore;

use super::reducer::EventReducer;

// One FIFO queue of not-yet-processable events per author.
struct SyncQueues {
    queues: HashMap<BFTNode, VecDeque<ConsensusEvent>>,
}

impl SyncQueues {
    fn new() -> SyncQueues {
        SyncQueues {
            queues: HashMap::new(),
        }
    }

    // If the author's queue is empty, return true: the event may be processed immediately.
    // Otherwise append the event, preserving the author's FIFO order, and return false.
    fn is_empty_else_add(&mut self, event: &ConsensusEvent) -> bool {
        match self.queues.get_mut(event.author()) {
            Some(queue) if !queue.is_empty() => {
                queue.push_back(event.clone());
                false
            }
            _ => true,
        }
    }

    fn add(&mut self, event: ConsensusEvent) {
        self.queues
            .entry(*event.author())
            .or_insert_with(VecDeque::new)
            .push_back(event);
    }

    fn authors(&self) -> Vec<BFTNode> {
        self.queues.keys().copied().collect()
    }

    fn peek(&self, author: &BFTNode) -> Option<&ConsensusEvent> {
        self.queues.get(author).and_then(|queue| queue.front())
    }

    fn pop(&mut self, author: &BFTNode) {
        if let Some(queue) = self.queues.get_mut(author) {
            queue.pop_front();
        }
    }

    fn clear(&mut self) {
        self.queues.clear();
    }

    fn len(&self) -> usize {
        self.queues.values().map(|queue| queue.len()).sum()
    }
}

/// Orders authenticated events per author and parks those whose prerequisite vertices the store
/// is still syncing.
pub struct EventPreprocessor {
    self_node: BFTNode,
    proposer_election: Box<dyn ProposerElection>,
    queues: SyncQueues,
    current_view: View,
}

impl EventPreprocessor {
    /// Create an `EventPreprocessor` for the validator `self_node`, starting at `initial_view`.
    pub fn new(
        self_node: BFTNode,
        proposer_election: Box<dyn ProposerElection>,
        initial_view: View,
    ) -> EventPreprocessor {
        EventPreprocessor {
            self_node,
            proposer_election,
            queues: SyncQueues::new(),
            current_view: initial_view,
        }
    }

    /// Admit one authenticated event: drop it if stale or misdirected, park it if its
    /// prerequisites are syncing, forward it to the reducer otherwise.
    pub fn process_event(
        &mut self,
        event: ConsensusEvent,
        store: &mut VertexStore,
        reducer: &mut EventReducer,
    ) {
        match event {
            ConsensusEvent::Vote(_) => self.process_vote(event, store, reducer),
            ConsensusEvent::Proposal(_) | ConsensusEvent::NewView(_) => {
                self.process_proposal_or_new_view(event, store, reducer)
            }
        }
    }

    // A vote is only meaningful to the leader that aggregates votes for its view (the proposer
    // of the following view). Votes carry no sync dependency and are never queued.
    fn process_vote(
        &mut self,
        event: ConsensusEvent,
        store: &mut VertexStore,
        reducer: &mut EventReducer,
    ) {
        log::trace!("Vote: preprocessing from {}", event.author());

        if event.view() < self.current_view {
            log::trace!(
                "Vote: ignoring view {}, current is {}",
                event.view(),
                self.current_view
            );
            return;
        }

        let aggregating_leader = self.proposer_election.get_proposer(event.view().next());
        if aggregating_leader != self.self_node {
            log::trace!(
                "Vote: view {} is aggregated by {}, not us, discarding",
                event.view(),
                aggregating_leader
            );
            return;
        }

        self.forward(event, store, reducer);
    }

    fn process_proposal_or_new_view(
        &mut self,
        event: ConsensusEvent,
        store: &mut VertexStore,
        reducer: &mut EventReducer,
    ) {
        if !self.from_expected_leader(&event) {
            return;
        }

        if event.view() < self.current_view {
            log::trace!(
                "Ignoring event for view {}, current is {}",
                event.view(),
                self.current_view
            );
            return;
        }

        if self.queues.is_empty_else_add(&event) {
            if self.try_process(&event, store, reducer) {
                // Processing the event may have admitted certificates that make other authors'
                // parked events satisfiable.
                self.drain_queues(store, reducer);
            } else {
                log::debug!(
                    "Queuing event for view {} from {}, waiting for sync",
                    event.view(),
                    event.author()
                );
                self.queues.add(event);
            }
        }
    }

    // Not an error, just a stale or confused message: warn and drop.
    fn from_expected_leader(&self, event: &ConsensusEvent) -> bool {
        match event {
            ConsensusEvent::Proposal(proposal) => {
                let proposer = self.proposer_election.get_proposer(proposal.view());
                if *proposal.author() != proposer {
                    log::warn!(
                        "Proposal: author {} is not the leader of view {} (expected {})",
                        proposal.author(),
                        proposal.view(),
                        proposer
                    );
                    return false;
                }
                true
            }
            ConsensusEvent::NewView(new_view) => {
                let proposer = self.proposer_election.get_proposer(new_view.view);
                if proposer != self.self_node {
                    log::warn!(
                        "NewView: view {} is led by {}, not us (from {})",
                        new_view.view,
                        proposer,
                        new_view.author
                    );
                    return false;
                }
                true
            }
            ConsensusEvent::Vote(_) => true,
        }
    }

    // Attempt to take an event through the sync gate. Returns true if the event was disposed of
    // (forwarded, or dropped as stale) and false if it must remain parked.
    fn try_process(
        &mut self,
        event: &ConsensusEvent,
        store: &mut VertexStore,
        reducer: &mut EventReducer,
    ) -> bool {
        if event.view() < self.current_view {
            log::trace!(
                "Dropping queued event for past view {}, current is {}",
                event.view(),
                self.current_view
            );
            return true;
        }

        let (qc, committed_qc) = match event {
            ConsensusEvent::Proposal(proposal) => {
                (proposal.qc().clone(), proposal.highest_committed_qc.clone())
            }
            ConsensusEvent::NewView(new_view) => (
                new_view.highest_qc.clone(),
                new_view.highest_committed_qc.clone(),
            ),
            // Votes carry no sync dependency.
            ConsensusEvent::Vote(_) => return true,
        };

        if store.sync_to_qc(qc, committed_qc, event.author()) {
            self.forward(event.clone(), store, reducer);
            true
        } else {
            false
        }
    }

    fn forward(
        &self,
        event: ConsensusEvent,
        store: &mut VertexStore,
        reducer: &mut EventReducer,
    ) {
        match event {
            ConsensusEvent::Proposal(proposal) => reducer.process_proposal(proposal, store),
            ConsensusEvent::Vote(vote) => reducer.process_vote(vote, store),
            ConsensusEvent::NewView(new_view) => reducer.process_new_view(new_view, store),
        }
    }

    /// Replay events that were parked waiting for the sync keyed by `vertex_id`, draining each
    /// author's queue while its head keeps becoming satisfiable.
    pub fn process_local_sync(
        &mut self,
        vertex_id: CryptoHash,
        store: &mut VertexStore,
        reducer: &mut EventReducer,
    ) {
        log::trace!("LOCAL_SYNC: replaying events parked on {}", vertex_id);

        for author in self.queues.authors() {
            let head = match self.queues.peek(&author) {
                Some(event) => event.clone(),
                None => continue,
            };
            if !event_targets_vertex(&head, &vertex_id) {
                continue;
            }

            if self.try_process(&head, store, reducer) {
                self.queues.pop(&author);
            }
        }

        self.drain_queues(store, reducer);
    }

    // The work-list: pop and process queue heads until a full pass makes no progress. Keeps the
    // per-invocation step total and terminating — every pass that continues pops at least one
    // event.
    fn drain_queues(&mut self, store: &mut VertexStore, reducer: &mut EventReducer) {
        loop {
            let mut progressed = false;
            for author in self.queues.authors() {
                while let Some(head) = self.queues.peek(&author).cloned() {
                    if self.try_process(&head, store, reducer) {
                        self.queues.pop(&author);
                        progressed = true;
                    } else {
                        break;
                    }
                }
            }

            if !progressed {
                break;
            }
        }
    }

    /// Note that the pacemaker advanced the current view.
    pub fn process_view_update(&mut self, view: View) {
        if view > self.current_view {
            self.current_view = view;
        }
    }

    /// Handle a local timeout of `view`: if it is the current view, all queued events and all
    /// in-flight vertex syncs are cleared — events from the timed-out view are no longer
    /// actionable.
    pub fn process_local_timeout(&mut self, view: View, store: &mut VertexStore) {
        if view != self.current_view {
            return;
        }

        log::debug!(
            "LocalTimeout: clearing {} queued events and {} in-flight syncs",
            self.queues.len(),
            store.syncing_count()
        );
        self.queues.clear();
        store.clear_syncs();
    }

    /// Get the number of events currently parked across all authors' queues.
    pub fn queued_events(&self) -> usize {
        self.queues.len()
    }
}

fn event_targets_vertex(event: &ConsensusEvent, vertex_id: &CryptoHash) -> bool {
    match event {
        ConsensusEvent::Proposal(proposal) => proposal.qc().proposed().vertex_id() == *vertex_id,
        ConsensusEvent::NewView(new_view) => {
            new_view.highest_qc.proposed().vertex_id() == *vertex_id
        }
        ConsensusEvent::Vote(_) => false,
    }
}
