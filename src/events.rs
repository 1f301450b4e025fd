/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the notifications the core emits for its consumers.
//! Note: an event for a given action indicates that the action has been completed.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::types::basic::{CryptoHash, View};
use crate::types::certificates::QuorumCertificate;
use crate::types::validators::BFTNode;
use crate::types::vertex::VerifiedVertex;
use crate::votes::pending_votes::ViewVotingResult;

pub enum Event {
    // Events that change the vertex store.
    InsertVertex(InsertVertexEvent),
    CommitVertices(CommitVerticesEvent),
    UpdateHighQC(UpdateHighQCEvent),
    // Voting events.
    QuorumReached(QuorumReachedEvent),
    ReceiveNewView(ReceiveNewViewEvent),
    // Sync events.
    StartSync(StartSyncEvent),
    EndSync(EndSyncEvent),
    SyncedVertex(SyncedVertexEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        crate::logging::log_event(&event);
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(event);
        }
    }
}

/// A vertex was inserted into the vertex store.
pub struct InsertVertexEvent {
    pub timestamp: SystemTime,
    pub vertex: VerifiedVertex,
    /// How many children the inserted vertex's parent now has, the inserted vertex included.
    pub sibling_count: usize,
    /// How many vertices the store holds after the insertion.
    pub store_size: usize,
}

/// A chain of vertices was committed and pruned from the speculative store.
pub struct CommitVerticesEvent {
    pub timestamp: SystemTime,
    /// The newly committed vertices, oldest first.
    pub vertices: Vec<VerifiedVertex>,
    /// The quorum certificate that committed them.
    pub proof: QuorumCertificate,
}

/// The store's highest known quorum certificate changed.
pub struct UpdateHighQCEvent {
    pub timestamp: SystemTime,
    pub highest_qc: QuorumCertificate,
}

/// A quorum of votes was assembled for the event's view.
pub struct QuorumReachedEvent {
    pub timestamp: SystemTime,
    pub result: ViewVotingResult,
    /// The author whose vote completed the quorum. Consumers prioritize this peer when they need
    /// to sync, since it most likely still holds the relevant vertices.
    pub last_author: BFTNode,
}

/// A new-view message was admitted for the current or a future view.
pub struct ReceiveNewViewEvent {
    pub timestamp: SystemTime,
    pub origin: BFTNode,
    pub view: View,
}

/// A vertex sync was started towards `peer`.
pub struct StartSyncEvent {
    pub timestamp: SystemTime,
    pub peer: BFTNode,
    /// The id of the vertex the sync is trying to make available locally.
    pub vertex_id: CryptoHash,
}

/// A vertex sync finished and its state was discarded.
pub struct EndSyncEvent {
    pub timestamp: SystemTime,
    pub peer: BFTNode,
    pub vertices_synced: u64,
}

/// A vertex that a pending sync was waiting for is now in the store. The embedding node feeds
/// this back into the core as a `process_local_sync` call, which is the join point queued events
/// wait on.
pub struct SyncedVertexEvent {
    pub timestamp: SystemTime,
    pub vertex_id: CryptoHash,
}
