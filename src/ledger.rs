/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for the external collaborators the consensus core depends on: the ledger/state
//! execution engine, the proposer election, and the vertex-sync RPC transport.
//!
//! The core specifies only the parts of these contracts it consumes. How commands are executed,
//! how leaders are chosen, and how messages reach peers are all decided by the embedding node.

use crate::messages::{GetVerticesErrorResponse, GetVerticesRequest, GetVerticesResponse};
use crate::types::basic::{CryptoHash, View};
use crate::types::certificates::QuorumCertificate;
use crate::types::validators::BFTNode;
use crate::types::vertex::{LedgerHeader, PreparedVertex, VerifiedVertex};

/// The ledger/state-execution engine that speculatively executes and finally applies commands.
pub trait Ledger {
    /// Speculatively execute `vertex` on top of the chain of already-prepared ancestors
    /// `previous` (in root-to-parent order), returning the resulting ledger state commitment.
    ///
    /// A vertex whose command is rejected by the ledger's rules still yields a header (the state
    /// is simply unchanged); `prepare` fails only for programming errors, and such failures are
    /// fatal to the node.
    fn prepare(&mut self, previous: &[PreparedVertex], vertex: &VerifiedVertex) -> LedgerHeader;

    /// Durably apply `vertex`'s command. `proof` is the quorum certificate that committed it.
    fn commit(&mut self, vertex: &VerifiedVertex, proof: &QuorumCertificate);

    /// Check whether the committed state anchored by `target` is already reflected locally.
    ///
    /// If it is, returns `true` and the caller proceeds immediately. If not, the ledger starts
    /// catching up (asking `author` among others), returns `false`, and later delivers a
    /// [`CommittedStateSync`](crate::messages::CommittedStateSync) carrying `opaque` once the
    /// state is reached.
    fn sync_to(&mut self, target: &LedgerHeader, author: &BFTNode, opaque: CryptoHash) -> bool;
}

/// The leader-election function. Deterministic across all correct replicas.
pub trait ProposerElection {
    /// Get the proposer of `view`.
    fn get_proposer(&self, view: View) -> BFTNode;
}

/// Fire-and-forget transport for the vertex-sync RPC messages.
///
/// Requests and responses are correlated by the opaque token they carry, not by the transport;
/// delivery may be delayed, duplicated, or dropped.
pub trait VertexSyncRpc {
    fn send_get_vertices_request(&mut self, receiver: &BFTNode, request: GetVerticesRequest);

    fn send_get_vertices_response(&mut self, receiver: &BFTNode, response: GetVerticesResponse);

    fn send_get_vertices_error_response(
        &mut self,
        receiver: &BFTNode,
        response: GetVerticesErrorResponse,
    );
}
