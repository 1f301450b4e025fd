/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The speculative vertex store: a chain (with rare forks) of vertices extending a committed
//! root, keyed by content-derived id.
//!
//! The store tracks the highest known [`QuorumCertificate`], the highest committed certificate,
//! and the highest [`TimeoutCertificate`]. Committing walks parent pointers from the committed
//! header back to the root, hands each traversed vertex to the ledger in root-to-tip order,
//! prunes the walked ancestors, and advances the root. Vertices orphaned by a fork stay behind
//! unreachable until their ancestors are walked past.
//!
//! Catching up to a certificate whose vertex is missing locally is the job of the sync
//! sub-protocol in [`sync`].

pub mod sync;

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::SystemTime;

use crate::counters::SystemCounters;
use crate::events::{
    CommitVerticesEvent, Event, InsertVertexEvent, SyncedVertexEvent, UpdateHighQCEvent,
};
use crate::ledger::{Ledger, VertexSyncRpc};
use crate::messages::{GetVerticesErrorResponse, GetVerticesRequest, GetVerticesResponse};
use crate::types::basic::{CryptoHash, View};
use crate::types::certificates::{QuorumCertificate, TimeoutCertificate};
use crate::types::vertex::{BFTHeader, PreparedVertex, VerifiedVertex, VerifiedVertexChain};
use crate::types::validators::BFTNode;

use self::sync::SyncState;

/// Error returned by [`VertexStore::insert_vertex`].
#[derive(Debug)]
pub enum VertexInsertionError {
    /// The vertex's parent is not in the store. The caller should sync to the vertex's QC before
    /// re-attempting the insertion.
    MissingParent(CryptoHash),
}

/// Manages the speculative vertex chain.
///
/// Not internally synchronized: the single consensus actor is the only writer, and processes one
/// event at a time.
pub struct VertexStore {
    ledger: Box<dyn Ledger>,
    rpc: Box<dyn VertexSyncRpc>,
    counters: Arc<SystemCounters>,
    event_publisher: Option<Sender<Event>>,

    // These are always consistent: `root_id` is a key of `vertices`, and every non-root vertex's
    // parent is also a key of `vertices` (or pruned-away, for orphans of past forks).
    root_id: CryptoHash,
    highest_qc: QuorumCertificate,
    highest_committed_qc: QuorumCertificate,
    highest_tc: Option<TimeoutCertificate>,
    vertices: HashMap<CryptoHash, PreparedVertex>,
    syncing: HashMap<CryptoHash, SyncState>,
}

impl VertexStore {
    /// Create a `VertexStore` rooted at `root_vertex`, certified by `root_qc` and committed by
    /// `root_commit_qc`, containing `vertices` on top of the root.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`rebuild`](Self::rebuild).
    pub fn new(
        root_vertex: VerifiedVertex,
        root_qc: QuorumCertificate,
        root_commit_qc: QuorumCertificate,
        vertices: Vec<VerifiedVertex>,
        ledger: Box<dyn Ledger>,
        rpc: Box<dyn VertexSyncRpc>,
        counters: Arc<SystemCounters>,
        event_publisher: Option<Sender<Event>>,
    ) -> VertexStore {
        let mut store = VertexStore {
            ledger,
            rpc,
            counters,
            event_publisher,
            root_id: root_vertex.id(),
            highest_qc: root_qc.clone(),
            highest_committed_qc: root_commit_qc.clone(),
            highest_tc: None,
            vertices: HashMap::new(),
            syncing: HashMap::new(),
        };
        store.rebuild(root_vertex, root_qc, root_commit_qc, vertices);
        store
    }

    /// Replace the entire store state. Used when sync determines that the local speculative
    /// history is incompatible with the network's committed state.
    ///
    /// # Panics
    ///
    /// Panics if `root_qc` does not certify `root_vertex`, if `root_commit_qc` does not commit
    /// `root_vertex` (a commit-less `root_commit_qc` is accepted only at genesis, where the QC is
    /// its own committed proof), or if `vertices` do not connect. These states indicate either a
    /// local bug or a vertex set that bypassed quorum checks; the process must not continue from
    /// them.
    pub fn rebuild(
        &mut self,
        root_vertex: VerifiedVertex,
        root_qc: QuorumCertificate,
        root_commit_qc: QuorumCertificate,
        vertices: Vec<VerifiedVertex>,
    ) {
        if root_qc.proposed().vertex_id() != root_vertex.id() {
            panic!(
                "rebuild: root QC (proposes {}) does not match root vertex {}",
                root_qc.proposed().vertex_id(),
                root_vertex.id()
            );
        }

        match root_commit_qc.committed() {
            None => {
                if !root_qc.view().is_genesis() || root_qc != root_commit_qc {
                    panic!(
                        "rebuild: root commit QC at view {} does not have a commit",
                        root_commit_qc.view()
                    );
                }
            }
            Some(commit_header) => {
                if commit_header.vertex_id() != root_vertex.id() {
                    panic!(
                        "rebuild: root commit QC (commits {}) does not match root vertex {}",
                        commit_header.vertex_id(),
                        root_vertex.id()
                    );
                }
            }
        }

        self.vertices.clear();
        self.root_id = root_vertex.id();
        let root_ledger_header = *root_qc.proposed().ledger_header();
        self.highest_qc = root_qc;
        self.highest_committed_qc = root_commit_qc;
        self.vertices.insert(
            root_vertex.id(),
            PreparedVertex::new(root_vertex, root_ledger_header),
        );
        Event::publish(
            &self.event_publisher,
            Event::UpdateHighQC(UpdateHighQCEvent {
                timestamp: SystemTime::now(),
                highest_qc: self.highest_qc.clone(),
            }),
        );

        for vertex in vertices {
            if !self.add_qc(vertex.qc().clone()) {
                panic!(
                    "rebuild: QC of vertex {} proposes unknown vertex {}",
                    vertex.id(),
                    vertex.qc().proposed().vertex_id()
                );
            }
            if let Err(error) = self.insert_vertex(vertex) {
                panic!("rebuild: could not insert vertex: {:?}", error);
            }
        }

        self.counters
            .set_vertex_store_size(self.vertices.len() as u64);
    }

    /// Insert `vertex`, speculatively executing it via the ledger, and return the resulting
    /// header.
    ///
    /// Inserting an already-present vertex is a no-op that returns the existing header. Fails
    /// with [`MissingParent`](VertexInsertionError::MissingParent) if the vertex's parent is not
    /// in the store.
    pub fn insert_vertex(
        &mut self,
        vertex: VerifiedVertex,
    ) -> Result<BFTHeader, VertexInsertionError> {
        if let Some(existing) = self.vertices.get(&vertex.id()) {
            return Ok(existing.header());
        }

        if !self.contains_vertex(&vertex.parent_id()) {
            return Err(VertexInsertionError::MissingParent(vertex.parent_id()));
        }

        Ok(self.insert_vertex_internal(vertex))
    }

    fn insert_vertex_internal(&mut self, vertex: VerifiedVertex) -> BFTHeader {
        let previous = self.path_from_root(vertex.parent_id());
        let ledger_header = self.ledger.prepare(&previous, &vertex);
        let prepared = PreparedVertex::new(vertex, ledger_header);
        let header = prepared.header();

        if !prepared.vertex().has_direct_parent() {
            self.counters.increment_vertices_with_indirect_parent();
        }

        let id = prepared.id();
        let parent_id = prepared.parent_id();
        let inserted_vertex = prepared.vertex().clone();
        self.vertices.insert(id, prepared);
        self.counters
            .set_vertex_store_size(self.vertices.len() as u64);

        let sibling_count = self
            .vertices
            .values()
            .filter(|v| v.parent_id() == parent_id && v.id() != self.root_id)
            .count();

        Event::publish(
            &self.event_publisher,
            Event::InsertVertex(InsertVertexEvent {
                timestamp: SystemTime::now(),
                vertex: inserted_vertex,
                sibling_count,
                store_size: self.vertices.len(),
            }),
        );

        if self.syncing.contains_key(&id) {
            Event::publish(
                &self.event_publisher,
                Event::SyncedVertex(SyncedVertexEvent {
                    timestamp: SystemTime::now(),
                    vertex_id: id,
                }),
            );
        }

        header
    }

    /// Insert a connected chain of vertices, oldest first, adding each vertex's QC before the
    /// vertex itself. Stops quietly at the first vertex that cannot be added.
    pub fn insert_vertex_chain(&mut self, chain: VerifiedVertexChain) {
        for vertex in chain.vertices() {
            if !self.add_qc(vertex.qc().clone()) {
                log::debug!(
                    "SYNC_VERTICES: chain insertion stopped, QC proposes unknown vertex {}",
                    vertex.qc().proposed().vertex_id()
                );
                return;
            }
            if let Err(error) = self.insert_vertex(vertex.clone()) {
                log::debug!("SYNC_VERTICES: chain insertion failed: {:?}", error);
                return;
            }
        }
    }

    /// Make `qc` known to the store.
    ///
    /// Returns `false`, changing nothing, if the QC's proposed vertex is not in the store (the
    /// caller should sync first). Otherwise updates the highest QC and highest committed QC
    /// monotonically by view, committing newly-committed vertices, and returns `true`.
    pub fn add_qc(&mut self, qc: QuorumCertificate) -> bool {
        if !self.contains_vertex(&qc.proposed().vertex_id()) {
            return false;
        }

        if qc.view() > self.highest_qc.view() {
            self.highest_qc = qc.clone();
            Event::publish(
                &self.event_publisher,
                Event::UpdateHighQC(UpdateHighQCEvent {
                    timestamp: SystemTime::now(),
                    highest_qc: qc.clone(),
                }),
            );
        }

        if let Some(committed) = qc.committed().copied() {
            let current_committed_view = match self.highest_committed_qc.committed() {
                Some(header) => header.view(),
                None => {
                    if !self.highest_committed_qc.view().is_genesis() {
                        panic!(
                            "highest committed QC at view {} does not have a commit",
                            self.highest_committed_qc.view()
                        );
                    }
                    View::genesis()
                }
            };

            if committed.view() > current_committed_view {
                self.highest_committed_qc = qc;
                self.commit_vertex(&committed);
            }
        }

        true
    }

    /// Commit the vertex anchored by `header`, applying every vertex between the current root and
    /// it (inclusive) to the ledger and pruning them from the speculative store.
    ///
    /// Returns the newly committed tip, or `None` if `header` is at or behind the current root —
    /// the target is already committed, and duplicate commit notifications are no-ops.
    ///
    /// # Panics
    ///
    /// Panics if `header` is ahead of the root but its vertex is not in the store. A certificate
    /// admitted by [`add_qc`](Self::add_qc) always has its proposed vertex present, so this
    /// indicates a commit header that bypassed quorum checks.
    pub fn commit_vertex(&mut self, header: &BFTHeader) -> Option<VerifiedVertex> {
        if header.view() <= self.root_view() {
            return None;
        }

        let tip = match self.vertices.get(&header.vertex_id()) {
            Some(prepared) => prepared.clone(),
            None => panic!(
                "committing vertex not in store: {} at view {}",
                header.vertex_id(),
                header.view()
            ),
        };

        // Walk back to the root, collecting the committed path and pruning walked ancestors. The
        // new root itself stays in the map.
        let mut path = Vec::new();
        let mut cursor = Some(tip.clone());
        while let Some(prepared) = cursor {
            if prepared.id() == self.root_id {
                break;
            }
            cursor = self.vertices.remove(&prepared.parent_id());
            path.push(prepared);
        }
        path.reverse();

        let proof = self.highest_committed_qc.clone();
        for committed in &path {
            if committed.vertex().command().is_some() {
                self.counters.increment_committed_commands();
            }
            self.ledger.commit(committed.vertex(), &proof);
        }

        self.root_id = header.vertex_id();
        self.counters
            .set_vertex_store_size(self.vertices.len() as u64);

        Event::publish(
            &self.event_publisher,
            Event::CommitVertices(CommitVerticesEvent {
                timestamp: SystemTime::now(),
                vertices: path.iter().map(|p| p.vertex().clone()).collect(),
                proof,
            }),
        );

        Some(tip.vertex().clone())
    }

    /// Make `tc` known to the store, keeping the highest timeout certificate by view.
    pub fn insert_timeout_certificate(&mut self, tc: TimeoutCertificate) {
        let is_higher = match &self.highest_tc {
            None => true,
            Some(highest) => highest.view() < tc.view(),
        };
        if is_higher {
            self.highest_tc = Some(tc);
        }
    }

    /// Retrieve the `count`-long chain starting at `vertex_id` and proceeding to its ancestors,
    /// most recent first.
    ///
    /// Returns an empty vector if the store does not contain the full chain; sync peers must
    /// never be given partial answers.
    pub fn get_vertices(&self, vertex_id: CryptoHash, count: usize) -> Vec<VerifiedVertex> {
        let mut vertices = Vec::with_capacity(count);
        let mut next = vertex_id;
        for _ in 0..count {
            match self.vertices.get(&next) {
                Some(prepared) => {
                    vertices.push(prepared.vertex().clone());
                    next = prepared.parent_id();
                }
                None => return Vec::new(),
            }
        }

        vertices
    }

    /// Answer a peer's [`GetVerticesRequest`], either with the requested chain or with an error
    /// response carrying our highest certificates.
    pub fn process_get_vertices_request(&mut self, origin: &BFTNode, request: GetVerticesRequest) {
        log::debug!(
            "SYNC_VERTICES: received GetVerticesRequest from {} for {} count {}",
            origin,
            request.vertex_id,
            request.count
        );

        let fetched = self.get_vertices(request.vertex_id, request.count as usize);
        if fetched.is_empty() {
            self.rpc.send_get_vertices_error_response(
                origin,
                GetVerticesErrorResponse {
                    highest_qc: self.highest_qc.clone(),
                    highest_committed_qc: self.highest_committed_qc.clone(),
                    opaque: request.opaque,
                },
            );
        } else {
            self.rpc.send_get_vertices_response(
                origin,
                GetVerticesResponse {
                    vertices: fetched
                        .into_iter()
                        .map(|vertex| vertex.vertex().clone())
                        .collect(),
                    opaque: request.opaque,
                },
            );
        }
    }

    /// Get the chain from (exclusive) the root to (inclusive) `vertex_id`, oldest first.
    pub fn path_from_root(&self, vertex_id: CryptoHash) -> Vec<PreparedVertex> {
        let mut path = Vec::new();
        let mut next = vertex_id;
        while next != self.root_id {
            match self.vertices.get(&next) {
                Some(prepared) => {
                    path.push(prepared.clone());
                    next = prepared.parent_id();
                }
                None => break,
            }
        }

        path.reverse();
        path
    }

    /// Check whether the store holds the vertex with the given id.
    pub fn contains_vertex(&self, vertex_id: &CryptoHash) -> bool {
        self.vertices.contains_key(vertex_id)
    }

    /// Get the root vertex: the most recently committed vertex.
    pub fn root(&self) -> &VerifiedVertex {
        // Invariant: root_id is always a key of `vertices`.
        self.vertices.get(&self.root_id).unwrap().vertex()
    }

    /// Get the view of the root vertex.
    pub fn root_view(&self) -> View {
        self.root().view()
    }

    /// Get the highest known quorum certificate.
    pub fn highest_qc(&self) -> &QuorumCertificate {
        &self.highest_qc
    }

    /// Get the highest known committed quorum certificate.
    pub fn highest_committed_qc(&self) -> &QuorumCertificate {
        &self.highest_committed_qc
    }

    /// Get the highest known timeout certificate, if any.
    pub fn highest_tc(&self) -> Option<&TimeoutCertificate> {
        self.highest_tc.as_ref()
    }

    /// Get the number of vertices in the store, the root included.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Check whether the store holds only the root.
    pub fn is_empty(&self) -> bool {
        self.vertices.len() <= 1
    }

    pub(crate) fn send_sync_request(
        &mut self,
        author: &BFTNode,
        vertex_id: CryptoHash,
        count: u32,
        opaque: CryptoHash,
    ) {
        self.counters.increment_sync_requests_sent();
        self.rpc.send_get_vertices_request(
            author,
            GetVerticesRequest {
                vertex_id,
                count,
                opaque,
            },
        );
    }
}
