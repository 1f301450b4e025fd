/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'vertex' type, its content-derived id, and connected chains of vertices.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

use super::basic::{Command, CryptoHash, StateVersion, View};
use super::certificates::QuorumCertificate;
use super::validators::BFTNode;

/// Commitment to the ledger state that results from speculatively executing a vertex.
///
/// Produced by the external ledger's `prepare` call and carried inside [`BFTHeader`]s so that a
/// quorum certifies not just a vertex but the ledger state it leads to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct LedgerHeader {
    view: View,
    state_version: StateVersion,
    commitment: CryptoHash,
}

impl LedgerHeader {
    /// Create a new `LedgerHeader`.
    pub const fn new(view: View, state_version: StateVersion, commitment: CryptoHash) -> Self {
        Self {
            view,
            state_version,
            commitment,
        }
    }

    /// Get the view in which the committed-to state was produced.
    pub const fn view(&self) -> View {
        self.view
    }

    /// Get the position of the committed-to state in the ledger's command history.
    pub const fn state_version(&self) -> StateVersion {
        self.state_version
    }

    /// Get the opaque commitment to the ledger state.
    pub const fn commitment(&self) -> CryptoHash {
        self.commitment
    }
}

/// Anchor referenced by a [`QuorumCertificate`]: a vertex at a view, together with the ledger
/// state it results in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct BFTHeader {
    view: View,
    vertex_id: CryptoHash,
    ledger_header: LedgerHeader,
}

impl BFTHeader {
    /// Create a new `BFTHeader`.
    pub const fn new(view: View, vertex_id: CryptoHash, ledger_header: LedgerHeader) -> Self {
        Self {
            view,
            vertex_id,
            ledger_header,
        }
    }

    /// Get the view of the anchored vertex.
    pub const fn view(&self) -> View {
        self.view
    }

    /// Get the content-derived id of the anchored vertex.
    pub const fn vertex_id(&self) -> CryptoHash {
        self.vertex_id
    }

    /// Get the ledger state commitment of the anchored vertex.
    pub const fn ledger_header(&self) -> &LedgerHeader {
        &self.ledger_header
    }
}

/// A proposed unit of the chain, carrying an optional command and a quorum certificate justifying
/// its parent.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Vertex {
    pub qc: QuorumCertificate,
    pub view: View,
    pub command: Option<Command>,
    pub author: BFTNode,
}

impl Vertex {
    /// Create a new `Vertex`.
    pub fn new(
        qc: QuorumCertificate,
        view: View,
        command: Option<Command>,
        author: BFTNode,
    ) -> Vertex {
        Vertex {
            qc,
            view,
            command,
            author,
        }
    }

    /// Compute the content-derived id of `vertex`: the SHA256 hash over its Borsh serialization.
    pub fn hash(vertex: &Vertex) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(vertex.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }
}

/// A [`Vertex`] paired with its content-derived id, plus convenience accessors into the headers
/// its quorum certificate anchors.
///
/// The id is recomputed from content on construction, so a `VerifiedVertex` can never carry a
/// mismatched id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedVertex {
    vertex: Vertex,
    id: CryptoHash,
}

impl VerifiedVertex {
    /// Wrap `vertex`, computing its id.
    pub fn new(vertex: Vertex) -> VerifiedVertex {
        let id = Vertex::hash(&vertex);
        VerifiedVertex { vertex, id }
    }

    /// Get the content-derived id of this vertex.
    pub const fn id(&self) -> CryptoHash {
        self.id
    }

    /// Get the inner [`Vertex`].
    pub const fn vertex(&self) -> &Vertex {
        &self.vertex
    }

    /// Get the view of this vertex.
    pub const fn view(&self) -> View {
        self.vertex.view
    }

    /// Get the author of this vertex.
    pub const fn author(&self) -> &BFTNode {
        &self.vertex.author
    }

    /// Get the command carried by this vertex, if any.
    pub const fn command(&self) -> Option<&Command> {
        self.vertex.command.as_ref()
    }

    /// Get the quorum certificate justifying this vertex's parent.
    pub const fn qc(&self) -> &QuorumCertificate {
        &self.vertex.qc
    }

    /// Get the id of this vertex's parent: the vertex proposed by its QC.
    pub fn parent_id(&self) -> CryptoHash {
        self.vertex.qc.proposed().vertex_id()
    }

    /// Get the header of this vertex's parent.
    pub fn parent_header(&self) -> &BFTHeader {
        self.vertex.qc.proposed()
    }

    /// Get the header of this vertex's grandparent.
    pub fn grandparent_header(&self) -> &BFTHeader {
        self.vertex.qc.parent()
    }

    /// Check whether this vertex extends its parent without a view gap.
    pub fn has_direct_parent(&self) -> bool {
        self.vertex.view == self.parent_header().view().next()
    }
}

/// A vertex that has been speculatively executed by the ledger, together with the resulting
/// ledger state commitment.
#[derive(Clone)]
pub struct PreparedVertex {
    vertex: VerifiedVertex,
    ledger_header: LedgerHeader,
}

impl PreparedVertex {
    /// Pair `vertex` with the `ledger_header` the ledger produced for it.
    pub const fn new(vertex: VerifiedVertex, ledger_header: LedgerHeader) -> PreparedVertex {
        PreparedVertex {
            vertex,
            ledger_header,
        }
    }

    /// Get the inner [`VerifiedVertex`].
    pub const fn vertex(&self) -> &VerifiedVertex {
        &self.vertex
    }

    /// Get the content-derived id of the inner vertex.
    pub const fn id(&self) -> CryptoHash {
        self.vertex.id()
    }

    /// Get the id of the inner vertex's parent.
    pub fn parent_id(&self) -> CryptoHash {
        self.vertex.parent_id()
    }

    /// Get the ledger state commitment produced by speculatively executing the inner vertex.
    pub const fn ledger_header(&self) -> &LedgerHeader {
        &self.ledger_header
    }

    /// Get the [`BFTHeader`] anchoring the inner vertex and its resulting ledger state.
    pub fn header(&self) -> BFTHeader {
        BFTHeader::new(self.vertex.view(), self.vertex.id(), self.ledger_header)
    }
}

/// Error returned by [`VerifiedVertexChain::create`] when the given vertices do not form a
/// connected chain.
#[derive(Debug)]
pub struct ChainDisconnected {
    /// Position in the input list of the vertex whose parent pointer does not resolve.
    pub position: usize,
    /// The parent id the vertex at `position` references.
    pub expected_parent: CryptoHash,
    /// The id of the vertex at `position - 1`.
    pub actual_predecessor: CryptoHash,
}

/// A list of vertices in which each vertex's parent pointer resolves to the vertex immediately
/// before it.
///
/// The first vertex's parent is unconstrained; callers insert the chain into a store that already
/// contains it.
#[derive(Debug)]
pub struct VerifiedVertexChain {
    vertices: Vec<VerifiedVertex>,
}

impl VerifiedVertexChain {
    /// Create a chain from `vertices`, in parent-first order.
    ///
    /// Accepts only lists where each vertex's parent id equals the previous vertex's id; returns
    /// [`ChainDisconnected`] otherwise.
    pub fn create(vertices: Vec<VerifiedVertex>) -> Result<VerifiedVertexChain, ChainDisconnected> {
        for (position, window) in vertices.windows(2).enumerate() {
            let (previous, vertex) = (&window[0], &window[1]);
            if vertex.parent_id() != previous.id() {
                return Err(ChainDisconnected {
                    position: position + 1,
                    expected_parent: vertex.parent_id(),
                    actual_predecessor: previous.id(),
                });
            }
        }

        Ok(VerifiedVertexChain { vertices })
    }

    /// Get the vertices of this chain, in parent-first order.
    pub fn vertices(&self) -> &[VerifiedVertex] {
        &self.vertices
    }
}
