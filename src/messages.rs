/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between replicas: the consensus events that
//! drive the protocol, and the request/response pairs of the vertex-sync RPC.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    basic::{CryptoHash, SignatureBytes, View},
    certificates::{timeout_vote_message, QuorumCertificate, TimeoutCertificate, VoteData},
    signed_messages::{Keypair, SignedMessage},
    validators::BFTNode,
    vertex::Vertex,
};

/// A consensus-driving message authored by a validator: a proposal, a vote, or a new-view.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub enum ConsensusEvent {
    Proposal(Proposal),
    Vote(Vote),
    NewView(NewView),
}

impl ConsensusEvent {
    /// Returns the author of a given [ConsensusEvent].
    pub fn author(&self) -> &BFTNode {
        match self {
            ConsensusEvent::Proposal(proposal) => proposal.author(),
            ConsensusEvent::Vote(vote) => vote.author(),
            ConsensusEvent::NewView(new_view) => &new_view.author,
        }
    }

    /// Returns the view a given [ConsensusEvent] belongs to.
    pub fn view(&self) -> View {
        match self {
            ConsensusEvent::Proposal(proposal) => proposal.view(),
            ConsensusEvent::Vote(vote) => vote.view(),
            ConsensusEvent::NewView(new_view) => new_view.view,
        }
    }
}

/// A leader's proposal of a new vertex extending the chain certified by the vertex's QC.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct Proposal {
    pub vertex: Vertex,
    pub highest_committed_qc: QuorumCertificate,
    pub signature: SignatureBytes,
}

impl Proposal {
    /// Create a signed `Proposal` of `vertex`. `me` must be the keypair of `vertex.author`.
    pub fn new(me: &Keypair, vertex: Vertex, highest_committed_qc: QuorumCertificate) -> Proposal {
        let signature = me.sign(&vertex.try_to_vec().unwrap());
        Proposal {
            vertex,
            highest_committed_qc,
            signature,
        }
    }

    pub fn author(&self) -> &BFTNode {
        &self.vertex.author
    }

    pub fn view(&self) -> View {
        self.vertex.view
    }

    /// Get the QC justifying the proposed vertex's parent.
    pub fn qc(&self) -> &QuorumCertificate {
        &self.vertex.qc
    }
}

impl SignedMessage for Proposal {
    fn message_bytes(&self) -> Vec<u8> {
        self.vertex.try_to_vec().unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// A validator's vote for a vertex at a view, optionally carrying a second signature that also
/// counts the vote towards timing the view out.
///
/// A vote with a timeout signature is a "timeout vote" and is tallied separately from a plain
/// vote even when both are for the same author and view.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct Vote {
    author: BFTNode,
    vote_data: VoteData,
    signature: SignatureBytes,
    timeout_signature: Option<SignatureBytes>,
}

impl Vote {
    /// Create a signed `Vote` over `vote_data`. If `timeout` is set, the vote additionally
    /// carries a timeout signature for the vote's view.
    pub fn new(me: &Keypair, vote_data: VoteData, timeout: bool) -> Vote {
        let signature = me.sign(&vote_data.try_to_vec().unwrap());
        let timeout_signature = if timeout {
            Some(me.sign(&timeout_vote_message(vote_data.proposed().view())))
        } else {
            None
        };

        Vote {
            author: me.node(),
            vote_data,
            signature,
            timeout_signature,
        }
    }

    pub fn author(&self) -> &BFTNode {
        &self.author
    }

    pub fn view(&self) -> View {
        self.vote_data.proposed().view()
    }

    pub fn vote_data(&self) -> &VoteData {
        &self.vote_data
    }

    pub fn signature(&self) -> SignatureBytes {
        self.signature
    }

    pub fn timeout_signature(&self) -> Option<SignatureBytes> {
        self.timeout_signature
    }

    /// Check whether this vote carries a timeout signature.
    pub fn is_timeout(&self) -> bool {
        self.timeout_signature.is_some()
    }
}

impl SignedMessage for Vote {
    fn message_bytes(&self) -> Vec<u8> {
        self.vote_data.try_to_vec().unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// A validator's signal to the leader of `view` that it is ready to enter that view, carrying the
/// sender's highest certificates as evidence of the progress it has seen.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct NewView {
    pub author: BFTNode,
    pub view: View,
    pub highest_qc: QuorumCertificate,
    pub highest_committed_qc: QuorumCertificate,
    pub highest_tc: Option<TimeoutCertificate>,
    pub signature: SignatureBytes,
}

impl NewView {
    /// Create a signed `NewView` for `view`.
    pub fn new(
        me: &Keypair,
        view: View,
        highest_qc: QuorumCertificate,
        highest_committed_qc: QuorumCertificate,
        highest_tc: Option<TimeoutCertificate>,
    ) -> NewView {
        let signature = me.sign(&(view, highest_qc.clone()).try_to_vec().unwrap());
        NewView {
            author: me.node(),
            view,
            highest_qc,
            highest_committed_qc,
            highest_tc,
            signature,
        }
    }
}

impl SignedMessage for NewView {
    fn message_bytes(&self) -> Vec<u8> {
        (self.view, self.highest_qc.clone()).try_to_vec().unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// Request for the `count`-long ancestor chain starting at `vertex_id`, sent to a peer expected
/// to have it.
///
/// `opaque` is a correlation token echoed back in the response; the requester uses it to match
/// responses to in-flight syncs and to ignore responses whose sync has already been resolved.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct GetVerticesRequest {
    pub vertex_id: CryptoHash,
    pub count: u32,
    pub opaque: CryptoHash,
}

/// Successful response to a [`GetVerticesRequest`]: the requested vertex followed by its
/// ancestors, most recent first.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct GetVerticesResponse {
    pub vertices: Vec<Vertex>,
    pub opaque: CryptoHash,
}

/// Response to a [`GetVerticesRequest`] the peer could not answer, carrying the peer's highest
/// certificates so the requester can re-target its sync.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct GetVerticesErrorResponse {
    pub highest_qc: QuorumCertificate,
    pub highest_committed_qc: QuorumCertificate,
    pub opaque: CryptoHash,
}

/// Notification from the ledger/sync layer that the committed state requested via
/// [`Ledger::sync_to`](crate::ledger::Ledger::sync_to) has been reached locally. Carries back the
/// opaque token that identifies the waiting vertex sync.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct CommittedStateSync {
    pub opaque: CryptoHash,
}
