/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Shared helpers for the integration test suite: deterministic keypairs and validator sets,
//! builders for vertices, certificates and votes that satisfy the store's invariants, and mock
//! collaborators (ledger, proposer election, sync RPC) that record what the core asks of them.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Once};

use ed25519_dalek::SigningKey;
use rand_core::OsRng;

use vertex_bft::core::{ConsensusCore, CoreSpec};
use vertex_bft::counters::SystemCounters;
use vertex_bft::events::Event;
use vertex_bft::ledger::{Ledger, ProposerElection, VertexSyncRpc};
use vertex_bft::messages::{GetVerticesErrorResponse, GetVerticesRequest, GetVerticesResponse};
use vertex_bft::types::basic::{Command, CryptoHash, Power, StateVersion, View};
use vertex_bft::types::certificates::{QuorumCertificate, SignatureSet, VoteData};
use vertex_bft::types::signed_messages::Keypair;
use vertex_bft::types::validators::{BFTNode, BFTValidator, BFTValidatorSet};
use vertex_bft::types::vertex::{BFTHeader, LedgerHeader, PreparedVertex, Vertex, VerifiedVertex};
use vertex_bft::vertex_store::VertexStore;

static LOGGER_INIT: Once = Once::new();

/// Install a fern logger printing everything to stdout. Safe to call from every test.
pub fn setup_logger() {
    LOGGER_INIT.call_once(|| {
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!("[{}][{}] {}", record.target(), record.level(), message))
            })
            .level(log::LevelFilter::Trace)
            .chain(std::io::stdout())
            .apply()
            .unwrap();
    });
}

/// Deterministic keypairs, one per seed.
pub fn keypairs(n: usize) -> Vec<Keypair> {
    (0..n)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = (i + 1) as u8;
            Keypair::new(SigningKey::from_bytes(&seed))
        })
        .collect()
}

/// A keypair no other helper will ever produce.
pub fn random_keypair() -> Keypair {
    let mut csprng = OsRng;
    Keypair::new(SigningKey::generate(&mut csprng))
}

/// A validator set giving every keypair the same `power`.
pub fn equal_power_validator_set(keypairs: &[Keypair], power: u128) -> BFTValidatorSet {
    BFTValidatorSet::from_validators(
        keypairs
            .iter()
            .map(|keypair| BFTValidator::new(keypair.node(), Power::new(power))),
    )
}

/// The ledger header the [`MockLedger`] deterministically produces for `vertex`: state version
/// equal to the vertex's view, commitment equal to the vertex's id.
pub fn ledger_header_for(vertex: &VerifiedVertex) -> LedgerHeader {
    LedgerHeader::new(
        vertex.view(),
        StateVersion::new(vertex.view().int()),
        vertex.id(),
    )
}

/// The header anchoring `vertex` under the [`MockLedger`]'s conventions.
pub fn header_for(vertex: &VerifiedVertex) -> BFTHeader {
    BFTHeader::new(vertex.view(), vertex.id(), ledger_header_for(vertex))
}

/// An (unsigned) quorum certificate proposing `proposed` with the given `parent` and optional
/// `committed` anchor. The store never re-verifies certificate signatures, so tests build them
/// without keys.
pub fn qc_for(
    proposed: &VerifiedVertex,
    parent: &VerifiedVertex,
    committed: Option<&VerifiedVertex>,
) -> QuorumCertificate {
    QuorumCertificate::new(
        VoteData::new(
            header_for(proposed),
            header_for(parent),
            committed.map(header_for),
        ),
        SignatureSet::new(),
    )
}

/// A genesis vertex (authored by `author`) and its self-certifying genesis QC.
pub fn genesis(author: &Keypair) -> (VerifiedVertex, QuorumCertificate) {
    let zero = CryptoHash::new([0u8; 32]);
    let pre_genesis_header = BFTHeader::new(
        View::genesis(),
        zero,
        LedgerHeader::new(View::genesis(), StateVersion::new(0), zero),
    );
    let vertex = VerifiedVertex::new(Vertex::new(
        QuorumCertificate::genesis_qc(pre_genesis_header),
        View::genesis(),
        None,
        author.node(),
    ));

    let genesis_header = header_for(&vertex);
    (vertex, QuorumCertificate::genesis_qc(genesis_header))
}

/// A vertex at `view` extending `parent` (whose own parent is `grandparent`), carrying a small
/// command derived from the view number.
pub fn make_vertex(
    parent: &VerifiedVertex,
    grandparent: &VerifiedVertex,
    view: View,
    author: &Keypair,
) -> VerifiedVertex {
    VerifiedVertex::new(Vertex::new(
        qc_for(parent, grandparent, None),
        view,
        Some(Command::new(vec![view.int() as u8])),
        author.node(),
    ))
}

/// A `length`-long chain of vertices on top of `genesis_vertex`, at views 1..=length.
pub fn build_chain(
    genesis_vertex: &VerifiedVertex,
    length: usize,
    author: &Keypair,
) -> Vec<VerifiedVertex> {
    let mut chain = Vec::new();
    let mut grandparent = genesis_vertex.clone();
    let mut parent = genesis_vertex.clone();
    for i in 0..length {
        let vertex = make_vertex(&parent, &grandparent, View::new((i + 1) as u64), author);
        chain.push(vertex.clone());
        grandparent = parent;
        parent = vertex;
    }

    chain
}

/// Round-robin proposer election over a fixed list of nodes.
pub struct RoundRobinElection {
    pub nodes: Vec<BFTNode>,
}

impl ProposerElection for RoundRobinElection {
    fn get_proposer(&self, view: View) -> BFTNode {
        self.nodes[(view.int() as usize) % self.nodes.len()]
    }
}

/// Proposer election that always returns the same node.
pub struct FixedProposer(pub BFTNode);

impl ProposerElection for FixedProposer {
    fn get_proposer(&self, _view: View) -> BFTNode {
        self.0
    }
}

/// Shared, inspectable state of a [`MockLedger`].
#[derive(Clone, Default)]
pub struct LedgerState {
    /// Ids of vertices handed to `commit`, in order.
    pub committed: Rc<RefCell<Vec<CryptoHash>>>,
    /// The ledger's current state version; `sync_to` succeeds for targets at or below it.
    pub version: Rc<RefCell<u64>>,
    /// Opaque tokens of commit syncs the core requested and the ledger could not satisfy
    /// immediately.
    pub commit_sync_requests: Rc<RefCell<Vec<CryptoHash>>>,
}

/// A ledger that "executes" vertices by stamping them with deterministic headers (see
/// [`ledger_header_for`]) and records everything the core asks of it.
pub struct MockLedger {
    pub state: LedgerState,
}

impl Ledger for MockLedger {
    fn prepare(&mut self, _previous: &[PreparedVertex], vertex: &VerifiedVertex) -> LedgerHeader {
        ledger_header_for(vertex)
    }

    fn commit(&mut self, vertex: &VerifiedVertex, _proof: &QuorumCertificate) {
        self.state.committed.borrow_mut().push(vertex.id());
        let mut version = self.state.version.borrow_mut();
        *version = (*version).max(vertex.view().int());
    }

    fn sync_to(&mut self, target: &LedgerHeader, _author: &BFTNode, opaque: CryptoHash) -> bool {
        if target.state_version().int() <= *self.state.version.borrow() {
            return true;
        }
        self.state.commit_sync_requests.borrow_mut().push(opaque);
        false
    }
}

/// A message captured by [`RecordingRpc`].
pub enum SentMessage {
    Request(BFTNode, GetVerticesRequest),
    Response(BFTNode, GetVerticesResponse),
    ErrorResponse(BFTNode, GetVerticesErrorResponse),
}

/// Shared log of RPC messages the core sent.
pub type RpcLog = Rc<RefCell<Vec<SentMessage>>>;

/// An RPC transport that records instead of sending.
pub struct RecordingRpc {
    pub log: RpcLog,
}

impl VertexSyncRpc for RecordingRpc {
    fn send_get_vertices_request(&mut self, receiver: &BFTNode, request: GetVerticesRequest) {
        self.log
            .borrow_mut()
            .push(SentMessage::Request(*receiver, request));
    }

    fn send_get_vertices_response(&mut self, receiver: &BFTNode, response: GetVerticesResponse) {
        self.log
            .borrow_mut()
            .push(SentMessage::Response(*receiver, response));
    }

    fn send_get_vertices_error_response(
        &mut self,
        receiver: &BFTNode,
        response: GetVerticesErrorResponse,
    ) {
        self.log
            .borrow_mut()
            .push(SentMessage::ErrorResponse(*receiver, response));
    }
}

/// A [`VertexStore`] wired to mock collaborators, with handles for inspecting everything the
/// store did.
pub struct StoreHarness {
    pub store: VertexStore,
    pub ledger: LedgerState,
    pub rpc_log: RpcLog,
    pub counters: Arc<SystemCounters>,
    pub events: Receiver<Event>,
    pub genesis_vertex: VerifiedVertex,
    pub genesis_qc: QuorumCertificate,
}

impl StoreHarness {
    /// A store rooted at a fresh genesis vertex authored by `author`, containing `vertices` on
    /// top of it.
    pub fn new(author: &Keypair, vertices: Vec<VerifiedVertex>) -> StoreHarness {
        let (genesis_vertex, genesis_qc) = genesis(author);
        let ledger = LedgerState::default();
        let rpc_log: RpcLog = Rc::new(RefCell::new(Vec::new()));
        let counters = Arc::new(SystemCounters::new());
        let (event_sender, events) = mpsc::channel();

        let store = VertexStore::new(
            genesis_vertex.clone(),
            genesis_qc.clone(),
            genesis_qc.clone(),
            vertices,
            Box::new(MockLedger {
                state: ledger.clone(),
            }),
            Box::new(RecordingRpc {
                log: rpc_log.clone(),
            }),
            counters.clone(),
            Some(event_sender),
        );

        StoreHarness {
            store,
            ledger,
            rpc_log,
            counters,
            events,
            genesis_vertex,
            genesis_qc,
        }
    }

    /// Drain all events published so far.
    pub fn drain_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return events,
            }
        }
    }

    /// Drain all recorded RPC messages.
    pub fn drain_rpc(&self) -> Vec<SentMessage> {
        self.rpc_log.borrow_mut().drain(..).collect()
    }
}

/// A fully assembled [`ConsensusCore`] wired to mock collaborators.
pub struct CoreHarness {
    pub core: ConsensusCore,
    pub ledger: LedgerState,
    pub rpc_log: RpcLog,
    pub counters: Arc<SystemCounters>,
    pub events: Receiver<Event>,
    pub genesis_vertex: VerifiedVertex,
    pub genesis_qc: QuorumCertificate,
}

impl CoreHarness {
    /// A core for the validator `self_keypair` under `validator_set` and `proposer_election`,
    /// rooted at a fresh genesis vertex authored by `genesis_author`.
    pub fn new(
        self_keypair: &Keypair,
        validator_set: BFTValidatorSet,
        proposer_election: Box<dyn ProposerElection>,
        genesis_author: &Keypair,
    ) -> CoreHarness {
        let (genesis_vertex, genesis_qc) = genesis(genesis_author);
        let ledger = LedgerState::default();
        let rpc_log: RpcLog = Rc::new(RefCell::new(Vec::new()));
        let counters = Arc::new(SystemCounters::new());
        let (event_sender, events) = mpsc::channel();

        let core = CoreSpec::builder()
            .self_node(self_keypair.node())
            .validator_set(validator_set)
            .ledger(Box::new(MockLedger {
                state: ledger.clone(),
            }))
            .proposer_election(proposer_election)
            .rpc(Box::new(RecordingRpc {
                log: rpc_log.clone(),
            }))
            .root_vertex(genesis_vertex.clone())
            .root_qc(genesis_qc.clone())
            .root_commit_qc(genesis_qc.clone())
            .counters(counters.clone())
            .event_publisher(Some(event_sender))
            .build()
            .start();

        CoreHarness {
            core,
            ledger,
            rpc_log,
            counters,
            events,
            genesis_vertex,
            genesis_qc,
        }
    }

    /// Drain all events published so far.
    pub fn drain_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return events,
            }
        }
    }

    /// Drain all recorded RPC messages.
    pub fn drain_rpc(&self) -> Vec<SentMessage> {
        self.rpc_log.borrow_mut().drain(..).collect()
    }
}

/// Ids of the vertices a pending sync became able to deliver, harvested from the store's
/// `SyncedVertex` notifications.
pub fn synced_vertex_ids(events: &[Event]) -> Vec<CryptoHash> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::SyncedVertex(synced) => Some(synced.vertex_id),
            _ => None,
        })
        .collect()
}
