/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The vertex-sync sub-protocol: fetching missing ancestor vertices (and, when necessary, missing
//! committed ledger state) from a peer until a target quorum certificate can be added locally.
//!
//! A sync is keyed by the id of the target QC's proposed vertex, which doubles as the opaque
//! correlation token on every request sent for it. There is no explicit cancellation: responses
//! whose token no longer maps to a pending sync are ignored, which is how syncs resolved another
//! way (or cleared by a local timeout) die quietly.

use std::collections::VecDeque;
use std::time::SystemTime;

use crate::events::{EndSyncEvent, Event, StartSyncEvent};
use crate::messages::{CommittedStateSync, GetVerticesErrorResponse, GetVerticesResponse};
use crate::types::basic::{CryptoHash, View};
use crate::types::certificates::QuorumCertificate;
use crate::types::validators::BFTNode;
use crate::types::vertex::{BFTHeader, VerifiedVertex, VerifiedVertexChain};

use super::VertexStore;

// How many vertices to fetch when establishing a new committed root: the committed vertex plus
// the two descendants whose certificates prove the commit.
const COMMITTED_FETCH_COUNT: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SyncStage {
    Preparing,
    GetCommittedVertices,
    SyncToCommit,
    GetQcVertices,
}

/// The progress of one in-flight sync towards a target QC.
pub(crate) struct SyncState {
    local_sync_id: CryptoHash,
    qc: QuorumCertificate,
    committed_qc: QuorumCertificate,
    committed_header: BFTHeader,
    author: BFTNode,
    stage: SyncStage,
    fetched: VecDeque<VerifiedVertex>,
}

impl SyncState {
    // A committed QC that is neither genesis nor carries a commit cannot anchor a sync.
    fn new(
        qc: QuorumCertificate,
        committed_qc: QuorumCertificate,
        author: BFTNode,
    ) -> Option<SyncState> {
        let committed_header = if committed_qc.view().is_genesis() {
            *committed_qc.proposed()
        } else {
            match committed_qc.committed() {
                Some(header) => *header,
                None => return None,
            }
        };

        Some(SyncState {
            local_sync_id: qc.proposed().vertex_id(),
            qc,
            committed_qc,
            committed_header,
            author,
            stage: SyncStage::Preparing,
            fetched: VecDeque::new(),
        })
    }

    fn committed_view(&self) -> View {
        self.committed_header.view()
    }
}

impl VertexStore {
    /// Initiate a sync to `qc` and its accompanying `committed_qc`. Returns `true` if the store
    /// already satisfies the QC (it was [added](VertexStore::add_qc) immediately), and `false`
    /// if a sync is now in flight — the caller must park the dependent event and re-deliver it
    /// once the sync completes.
    ///
    /// `author` is the peer asked first: the original author of the certificate most likely
    /// still holds the referenced vertices in memory.
    ///
    /// If a sync towards the same target is already in flight, a request carrying a strictly
    /// higher committed QC supersedes it (the old sync state is dropped and the sync restarts);
    /// any other duplicate request is ignored.
    pub fn sync_to_qc(
        &mut self,
        qc: QuorumCertificate,
        committed_qc: QuorumCertificate,
        author: &BFTNode,
    ) -> bool {
        if self.add_qc(qc.clone()) {
            return true;
        }

        let vertex_id = qc.proposed().vertex_id();
        log::debug!(
            "SYNC_TO_QC: need sync to {} at view {}",
            vertex_id,
            qc.view()
        );

        if let Some(existing) = self.syncing.get(&vertex_id) {
            let new_committed_view = committed_view_of(&committed_qc);
            if new_committed_view <= existing.committed_view() {
                return false;
            }
            log::debug!(
                "SYNC_TO_QC: superseding in-flight sync to {} (committed view {} > {})",
                vertex_id,
                new_committed_view,
                existing.committed_view()
            );
            self.syncing.remove(&vertex_id);
        }

        let state = match SyncState::new(qc, committed_qc, *author) {
            Some(state) => state,
            None => {
                log::warn!(
                    "SYNC_TO_QC: committed QC for {} has no commit, not syncing",
                    vertex_id
                );
                return false;
            }
        };

        Event::publish(
            &self.event_publisher,
            Event::StartSync(StartSyncEvent {
                timestamp: SystemTime::now(),
                peer: *author,
                vertex_id,
            }),
        );

        let requires_committed_sync = self.requires_committed_sync(&state);
        self.syncing.insert(state.local_sync_id, state);
        if requires_committed_sync {
            self.do_committed_sync(vertex_id);
        } else {
            self.do_qc_sync(vertex_id);
        }

        false
    }

    // Committed-history sync is required when the target committed vertex is not in the store
    // and is beyond the local root, i.e., the local speculative chain cannot reach it.
    fn requires_committed_sync(&self, state: &SyncState) -> bool {
        if self.contains_vertex(&state.committed_header.vertex_id()) {
            return false;
        }

        self.root_view() < state.committed_header.view()
    }

    fn do_qc_sync(&mut self, sync_id: CryptoHash) {
        let (vertex_id, author) = {
            let state = self.syncing.get_mut(&sync_id).unwrap();
            state.stage = SyncStage::GetQcVertices;
            (state.qc.proposed().vertex_id(), state.author)
        };

        log::debug!(
            "SYNC_VERTICES: QC: sending initial GetVerticesRequest for {}",
            vertex_id
        );
        self.send_sync_request(&author, vertex_id, 1, sync_id);
    }

    fn do_committed_sync(&mut self, sync_id: CryptoHash) {
        let (committed_qc_id, author) = {
            let state = self.syncing.get_mut(&sync_id).unwrap();
            state.stage = SyncStage::GetCommittedVertices;
            (state.committed_qc.proposed().vertex_id(), state.author)
        };

        log::debug!(
            "SYNC_VERTICES: committed: sending initial GetVerticesRequest for {}",
            committed_qc_id
        );
        // Retrieve the vertices preceding the committed QC so a valid committed root can be
        // established.
        self.send_sync_request(&author, committed_qc_id, COMMITTED_FETCH_COUNT, sync_id);
    }

    /// Feed a peer's [`GetVerticesResponse`] into the sync that requested it. Responses whose
    /// opaque token matches no pending sync are ignored.
    pub fn process_get_vertices_response(&mut self, response: GetVerticesResponse) {
        let sync_id = response.opaque;
        let stage = match self.syncing.get(&sync_id) {
            Some(state) => state.stage,
            None => {
                // Sync requirements already satisfied by another sync, or cleared.
                log::debug!("SYNC_VERTICES: ignoring response for resolved sync {}", sync_id);
                return;
            }
        };

        if response.vertices.is_empty() {
            log::debug!("SYNC_VERTICES: response for {} was empty", sync_id);
            return;
        }

        let vertices: Vec<VerifiedVertex> = response
            .vertices
            .into_iter()
            .map(VerifiedVertex::new)
            .collect();

        match stage {
            SyncStage::GetCommittedVertices => {
                self.process_vertices_response_for_committed_sync(sync_id, vertices)
            }
            SyncStage::GetQcVertices => {
                self.process_vertices_response_for_qc_sync(sync_id, vertices)
            }
            stage @ (SyncStage::Preparing | SyncStage::SyncToCommit) => {
                log::debug!(
                    "SYNC_VERTICES: ignoring response for {} in stage {:?}",
                    sync_id,
                    stage
                );
            }
        }
    }

    fn process_vertices_response_for_committed_sync(
        &mut self,
        sync_id: CryptoHash,
        vertices: Vec<VerifiedVertex>,
    ) {
        let (target, author) = {
            let state = self.syncing.get_mut(&sync_id).unwrap();
            log::debug!(
                "SYNC_STATE: processing {} committed vertices for {}",
                vertices.len(),
                sync_id
            );
            state.fetched.extend(vertices);
            (*state.committed_header.ledger_header(), state.author)
        };

        if self.ledger.sync_to(&target, &author, sync_id) {
            self.rebuild_and_sync_qc(sync_id);
        } else {
            // The ledger is catching up on its own; a CommittedStateSync carrying our token
            // re-triggers the rebuild.
            let state = self.syncing.get_mut(&sync_id).unwrap();
            state.stage = SyncStage::SyncToCommit;
        }
    }

    fn process_vertices_response_for_qc_sync(
        &mut self,
        sync_id: CryptoHash,
        vertices: Vec<VerifiedVertex>,
    ) {
        // One vertex is requested at a time while walking backwards towards known history.
        let vertex = vertices.into_iter().next().unwrap();
        let parent_id = vertex.parent_id();
        {
            let state = self.syncing.get_mut(&sync_id).unwrap();
            state.fetched.push_front(vertex);
        }

        if self.contains_vertex(&parent_id) {
            let (fetched, qc) = {
                let state = self.syncing.get(&sync_id).unwrap();
                (
                    state.fetched.iter().cloned().collect::<Vec<_>>(),
                    state.qc.clone(),
                )
            };

            let chain = match VerifiedVertexChain::create(fetched) {
                Ok(chain) => chain,
                Err(error) => panic!("sync fetched a disconnected vertex chain: {:?}", error),
            };
            self.insert_vertex_chain(chain);
            self.add_qc(qc);
        } else {
            let author = self.syncing.get(&sync_id).unwrap().author;
            log::debug!(
                "SYNC_VERTICES: sending further GetVerticesRequest for {}",
                parent_id
            );
            self.send_sync_request(&author, parent_id, 1, sync_id);
        }
    }

    // Establish the fetched committed lineage as the new root (unless the store caught up
    // through another path in the meantime) and re-attempt the target QC.
    fn rebuild_and_sync_qc(&mut self, sync_id: CryptoHash) {
        let requires_committed_sync = match self.syncing.get(&sync_id) {
            Some(state) => self.requires_committed_sync(state),
            None => return,
        };

        if requires_committed_sync {
            let (mut fetched, committed_qc) = {
                let state = self.syncing.get(&sync_id).unwrap();
                (
                    state.fetched.iter().cloned().collect::<Vec<_>>(),
                    state.committed_qc.clone(),
                )
            };

            fetched.sort_by_key(|vertex| vertex.view());
            if fetched.len() < 2 {
                log::warn!(
                    "SYNC_STATE: not enough fetched vertices to rebuild for {}, abandoning sync",
                    sync_id
                );
                self.syncing.remove(&sync_id);
                return;
            }

            log::debug!(
                "SYNC_STATE: rebuilding to root {} for {}",
                fetched[0].id(),
                sync_id
            );
            let root = fetched[0].clone();
            let root_qc = fetched[1].qc().clone();
            let non_root = fetched[1..].to_vec();
            self.rebuild(root, root_qc, committed_qc, non_root);
        } else {
            log::debug!("SYNC_STATE: skipping rebuild for {}", sync_id);
        }

        // At this point the store is guaranteed to be in sync with the committed state. Retry
        // the target QC.
        let qc = self.syncing.get(&sync_id).unwrap().qc.clone();
        if !self.add_qc(qc) {
            self.do_qc_sync(sync_id);
        }
    }

    /// Feed the ledger's notification that the committed state a sync was waiting on has been
    /// reached locally.
    pub fn process_committed_state_sync(&mut self, committed_state_sync: CommittedStateSync) {
        let sync_id = committed_state_sync.opaque;
        log::debug!("SYNC_STATE: committed state synced for {}", sync_id);
        if self.syncing.contains_key(&sync_id) {
            self.rebuild_and_sync_qc(sync_id);
        }
    }

    /// Feed a peer's [`GetVerticesErrorResponse`]: the peer did not know the requested vertex but
    /// reported its own highest certificates. If the peer is ahead of us, the sync restarts
    /// targeting the peer's reported state; the original target was stale.
    pub fn process_get_vertices_error_response(
        &mut self,
        sender: &BFTNode,
        response: GetVerticesErrorResponse,
    ) {
        let sync_id = response.opaque;
        if !self.syncing.contains_key(&sync_id) {
            return;
        }

        log::debug!(
            "SYNC_VERTICES: received GetVerticesErrorResponse from {} for {}",
            sender,
            sync_id
        );

        if response.highest_qc.view() > self.highest_qc().view() {
            self.syncing.remove(&sync_id);
            self.sync_to_qc(response.highest_qc, response.highest_committed_qc, sender);
        }
    }

    /// Complete the sync keyed by `vertex_id`: the target vertex is in the store and any events
    /// parked on this sync can be replayed. This is the join point the event preprocessor waits
    /// on.
    pub fn process_local_sync(&mut self, vertex_id: CryptoHash) {
        log::debug!("LOCAL_SYNC: processed {}", vertex_id);
        if let Some(state) = self.syncing.remove(&vertex_id) {
            Event::publish(
                &self.event_publisher,
                Event::EndSync(EndSyncEvent {
                    timestamp: SystemTime::now(),
                    peer: state.author,
                    vertices_synced: state.fetched.len() as u64,
                }),
            );
        }
    }

    /// Drop all in-flight sync state. Called on a local timeout of the current view: the events
    /// waiting on these syncs have been discarded, so the syncs have nothing left to resume.
    pub fn clear_syncs(&mut self) {
        self.syncing.clear();
    }

    /// Check whether a sync keyed by `vertex_id` is in flight.
    pub fn is_syncing(&self, vertex_id: &CryptoHash) -> bool {
        self.syncing.contains_key(vertex_id)
    }

    /// Get the number of in-flight syncs.
    pub fn syncing_count(&self) -> usize {
        self.syncing.len()
    }
}

fn committed_view_of(committed_qc: &QuorumCertificate) -> View {
    if committed_qc.view().is_genesis() {
        return View::genesis();
    }
    committed_qc
        .committed()
        .map(|header| header.view())
        .unwrap_or(View::genesis())
}
