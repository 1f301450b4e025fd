/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The assembled consensus core and the builder-pattern specification used to construct it.
//!
//! # Usage
//!
//! Describe the core with [`CoreSpec::builder`], then [`start`](CoreSpec::start) it:
//!
//! ```ignore
//! let mut core = CoreSpec::builder()
//!     .self_node(my_node)
//!     .validator_set(validator_set)
//!     .ledger(Box::new(ledger))
//!     .proposer_election(Box::new(election))
//!     .rpc(Box::new(rpc))
//!     .root_vertex(root_vertex)
//!     .root_qc(root_qc)
//!     .root_commit_qc(root_commit_qc)
//!     .event_publisher(Some(event_sender))
//!     .build()
//!     .start();
//! ```
//!
//! The embedding node then feeds the core from its event loop: network messages through
//! [`process_event`](ConsensusCore::process_event) and the sync RPC handlers, pacemaker signals
//! through [`process_view_update`](ConsensusCore::process_view_update) and
//! [`process_local_timeout`](ConsensusCore::process_local_timeout), and the store's own
//! `SyncedVertex` notifications back through
//! [`process_local_sync`](ConsensusCore::process_local_sync).

use std::sync::mpsc::Sender;
use std::sync::Arc;

use typed_builder::TypedBuilder;

use crate::counters::SystemCounters;
use crate::events::Event;
use crate::ledger::{Ledger, ProposerElection, VertexSyncRpc};
use crate::messages::{
    CommittedStateSync, ConsensusEvent, GetVerticesErrorResponse, GetVerticesRequest,
    GetVerticesResponse,
};
use crate::pipeline::preprocessor::EventPreprocessor;
use crate::pipeline::reducer::EventReducer;
use crate::pipeline::verifier::EventVerifier;
use crate::types::basic::{CryptoHash, View};
use crate::types::certificates::QuorumCertificate;
use crate::types::validators::{BFTNode, BFTValidatorSet};
use crate::types::vertex::VerifiedVertex;
use crate::vertex_store::VertexStore;

/// Specification of a [`ConsensusCore`]: the local identity, the validator set of the current
/// epoch, the external collaborators, and the certified root to build the vertex store on.
#[derive(TypedBuilder)]
pub struct CoreSpec {
    /// The local validator's identity.
    pub self_node: BFTNode,
    /// The validator set of the current epoch. Treated as an immutable snapshot.
    pub validator_set: BFTValidatorSet,
    /// The ledger/state-execution engine.
    pub ledger: Box<dyn Ledger>,
    /// The leader-election function.
    pub proposer_election: Box<dyn ProposerElection>,
    /// The transport for vertex-sync RPC messages.
    pub rpc: Box<dyn VertexSyncRpc>,
    /// The root vertex the store starts from.
    pub root_vertex: VerifiedVertex,
    /// The certificate certifying `root_vertex`.
    pub root_qc: QuorumCertificate,
    /// The certificate committing `root_vertex`. At genesis this is `root_qc` itself.
    pub root_commit_qc: QuorumCertificate,
    /// Vertices already known on top of the root, oldest first.
    #[builder(default)]
    pub vertices: Vec<VerifiedVertex>,
    /// Counters the core writes for diagnostics.
    #[builder(default)]
    pub counters: Arc<SystemCounters>,
    /// Where outbound notifications are published, if anywhere.
    #[builder(default)]
    pub event_publisher: Option<Sender<Event>>,
    /// The view the pacemaker starts the core in.
    #[builder(default = View::genesis().next())]
    pub initial_view: View,
}

impl CoreSpec {
    /// Construct the consensus core described by this specification.
    ///
    /// # Panics
    ///
    /// Panics if the root triple is inconsistent, under the same conditions as
    /// [`VertexStore::rebuild`].
    pub fn start(self) -> ConsensusCore {
        let vertex_store = VertexStore::new(
            self.root_vertex,
            self.root_qc,
            self.root_commit_qc,
            self.vertices,
            self.ledger,
            self.rpc,
            self.counters,
            self.event_publisher.clone(),
        );

        ConsensusCore {
            verifier: EventVerifier::new(),
            preprocessor: EventPreprocessor::new(
                self.self_node,
                self.proposer_election,
                self.initial_view,
            ),
            reducer: EventReducer::new(
                self.validator_set.clone(),
                self.event_publisher,
                self.initial_view,
            ),
            vertex_store,
            validator_set: self.validator_set,
        }
    }
}

/// The single-threaded consensus core: verifier, preprocessor, reducer and vertex store wired
/// together.
///
/// All entry points are strictly sequential; exactly one event is in flight through the pipeline
/// at a time, so no internal locking exists or is needed. Suspension is logical: an entry point
/// that cannot make progress parks work internally and a later callback resumes it.
pub struct ConsensusCore {
    validator_set: BFTValidatorSet,
    verifier: EventVerifier,
    preprocessor: EventPreprocessor,
    reducer: EventReducer,
    vertex_store: VertexStore,
}

impl ConsensusCore {
    /// Process one inbound consensus event: authenticate it, order it, and (possibly after a
    /// sync) reduce it.
    pub fn process_event(&mut self, event: ConsensusEvent) {
        if let Err(error) = self.verifier.verify(&event, &self.validator_set) {
            log::warn!("Dropping event that failed verification: {:?}", error);
            return;
        }

        self.preprocessor
            .process_event(event, &mut self.vertex_store, &mut self.reducer);
    }

    /// Note that the pacemaker advanced the current view.
    pub fn process_view_update(&mut self, view: View) {
        self.preprocessor.process_view_update(view);
        self.reducer.process_view_update(view);
    }

    /// Handle a local timeout of `view`, clearing queued events and in-flight syncs if it is the
    /// current view.
    pub fn process_local_timeout(&mut self, view: View) {
        self.preprocessor
            .process_local_timeout(view, &mut self.vertex_store);
    }

    /// Complete the sync keyed by `vertex_id` and replay events that were parked on it.
    ///
    /// The embedding node calls this when it receives the store's
    /// [`SyncedVertex`](crate::events::SyncedVertexEvent) notification.
    pub fn process_local_sync(&mut self, vertex_id: CryptoHash) {
        self.vertex_store.process_local_sync(vertex_id);
        self.preprocessor
            .process_local_sync(vertex_id, &mut self.vertex_store, &mut self.reducer);
    }

    /// Feed the ledger's notification that a committed state targeted by sync has been reached.
    pub fn process_committed_state_sync(&mut self, committed_state_sync: CommittedStateSync) {
        self.vertex_store
            .process_committed_state_sync(committed_state_sync);
    }

    /// Answer a peer's sync request from the local store.
    pub fn process_get_vertices_request(&mut self, origin: &BFTNode, request: GetVerticesRequest) {
        self.vertex_store
            .process_get_vertices_request(origin, request);
    }

    /// Feed a peer's sync response into the in-flight sync that requested it.
    pub fn process_get_vertices_response(&mut self, response: GetVerticesResponse) {
        self.vertex_store.process_get_vertices_response(response);
    }

    /// Feed a peer's sync error response, possibly re-targeting the sync at the peer's reported
    /// state.
    pub fn process_get_vertices_error_response(
        &mut self,
        sender: &BFTNode,
        response: GetVerticesErrorResponse,
    ) {
        self.vertex_store
            .process_get_vertices_error_response(sender, response);
    }

    /// Get the vertex store, for observation.
    pub fn vertex_store(&self) -> &VertexStore {
        &self.vertex_store
    }

    /// Get the number of events currently parked waiting for sync.
    pub fn queued_events(&self) -> usize {
        self.preprocessor.queued_events()
    }
}
