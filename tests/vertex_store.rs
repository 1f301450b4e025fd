/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests for the speculative vertex store: insertion, QC admission, commit/prune, chain
//! retrieval, and rebuild invariants.

mod common;

use common::{
    build_chain, genesis, header_for, keypairs, make_vertex, qc_for, setup_logger, StoreHarness,
};

use vertex_bft::events::Event;
use vertex_bft::types::basic::View;
use vertex_bft::types::certificates::{SignatureSet, TimeoutCertificate};
use vertex_bft::types::vertex::VerifiedVertexChain;
use vertex_bft::vertex_store::VertexInsertionError;

#[test]
fn inserting_a_vertex_with_a_missing_parent_fails() {
    let author = &keypairs(1)[0];
    let mut harness = StoreHarness::new(author, Vec::new());
    let chain = build_chain(&harness.genesis_vertex, 2, author);

    // The second vertex's parent (the first) is not in the store.
    let result = harness.store.insert_vertex(chain[1].clone());
    match result {
        Err(VertexInsertionError::MissingParent(parent_id)) => {
            assert_eq!(parent_id, chain[0].id())
        }
        Ok(_) => panic!("insertion with a missing parent succeeded"),
    }
    assert!(!harness.store.contains_vertex(&chain[1].id()));
}

#[test]
fn inserting_the_same_vertex_twice_is_a_no_op() {
    let author = &keypairs(1)[0];
    let mut harness = StoreHarness::new(author, Vec::new());
    let chain = build_chain(&harness.genesis_vertex, 1, author);

    let first = harness.store.insert_vertex(chain[0].clone()).unwrap();
    let second = harness.store.insert_vertex(chain[0].clone()).unwrap();
    assert_eq!(first, second);
    assert_eq!(harness.store.len(), 2); // root + one vertex
}

#[test]
fn indirect_parent_counter_counts_view_gaps_once() {
    let author = &keypairs(1)[0];
    let mut harness = StoreHarness::new(author, Vec::new());
    let chain = build_chain(&harness.genesis_vertex, 1, author);
    harness.store.insert_vertex(chain[0].clone()).unwrap();

    // A vertex at view 3 extending the view-1 vertex skips view 2.
    let skipping = make_vertex(&chain[0], &harness.genesis_vertex, View::new(3), author);
    assert!(!skipping.has_direct_parent());
    harness.store.insert_vertex(skipping.clone()).unwrap();
    assert_eq!(harness.counters.vertices_with_indirect_parent(), 1);

    // Re-inserting does not double-count.
    harness.store.insert_vertex(skipping).unwrap();
    assert_eq!(harness.counters.vertices_with_indirect_parent(), 1);
    assert_eq!(harness.counters.vertex_store_size(), 3);
}

#[test]
fn add_qc_requires_the_proposed_vertex_locally() {
    let author = &keypairs(1)[0];
    let mut harness = StoreHarness::new(author, Vec::new());
    let chain = build_chain(&harness.genesis_vertex, 2, author);

    // QC proposing a vertex the store has never seen: refused.
    let unknown_qc = qc_for(&chain[1], &chain[0], None);
    assert!(!harness.store.add_qc(unknown_qc.clone()));

    harness.store.insert_vertex(chain[0].clone()).unwrap();
    harness.store.insert_vertex(chain[1].clone()).unwrap();
    assert!(harness.store.add_qc(unknown_qc));
    assert_eq!(harness.store.highest_qc().view(), chain[1].view());
}

#[test]
fn highest_qc_is_monotonic_by_view() {
    let author = &keypairs(1)[0];
    let mut harness = StoreHarness::new(author, Vec::new());
    let chain = build_chain(&harness.genesis_vertex, 2, author);
    harness.store.insert_vertex(chain[0].clone()).unwrap();
    harness.store.insert_vertex(chain[1].clone()).unwrap();

    assert!(harness.store.add_qc(qc_for(&chain[1], &chain[0], None)));
    assert_eq!(harness.store.highest_qc().view(), View::new(2));
    harness.drain_events();

    // An older QC is still accepted but does not lower the highest.
    assert!(harness
        .store
        .add_qc(qc_for(&chain[0], &harness.genesis_vertex, None)));
    assert_eq!(harness.store.highest_qc().view(), View::new(2));
    assert!(harness
        .drain_events()
        .iter()
        .all(|event| !matches!(event, Event::UpdateHighQC(_))));
}

#[test]
fn commit_walks_to_the_root_prunes_and_advances() {
    setup_logger();
    let author = &keypairs(1)[0];
    let mut harness = StoreHarness::new(author, Vec::new());
    let chain = build_chain(&harness.genesis_vertex, 3, author);
    for vertex in &chain {
        harness.store.insert_vertex(vertex.clone()).unwrap();
    }
    harness.drain_events();

    // A QC whose vote data carries a committed anchor for the view-1 vertex commits it.
    let committing_qc = qc_for(&chain[2], &chain[1], Some(&chain[0]));
    assert!(harness.store.add_qc(committing_qc));

    assert_eq!(harness.store.root_view(), View::new(1));
    assert_eq!(
        *harness.ledger.committed.borrow(),
        vec![chain[0].id()],
        "exactly the view-1 vertex was handed to the ledger"
    );

    let events = harness.drain_events();
    let commit_events: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            Event::CommitVertices(commit) => Some(commit),
            _ => None,
        })
        .collect();
    assert_eq!(commit_events.len(), 1);
    assert_eq!(commit_events[0].vertices.len(), 1);
    assert_eq!(commit_events[0].vertices[0].id(), chain[0].id());

    // The walked-past genesis root is pruned; the descendants above the new root remain.
    assert!(!harness.store.contains_vertex(&harness.genesis_vertex.id()));
    assert!(harness.store.contains_vertex(&chain[1].id()));
    assert!(harness.store.contains_vertex(&chain[2].id()));
}

#[test]
fn committing_at_or_behind_the_root_is_a_no_op() {
    let author = &keypairs(1)[0];
    let mut harness = StoreHarness::new(author, Vec::new());
    let chain = build_chain(&harness.genesis_vertex, 10, author);
    for vertex in &chain {
        harness.store.insert_vertex(vertex.clone()).unwrap();
    }

    // Commit up to view 8, moving the root there.
    assert!(harness.store.commit_vertex(&header_for(&chain[7])).is_some());
    assert_eq!(harness.store.root_view(), View::new(8));
    let committed_so_far = harness.ledger.committed.borrow().len();
    harness.drain_events();

    // Committing at view 8 again, or behind it, changes nothing.
    assert!(harness.store.commit_vertex(&header_for(&chain[7])).is_none());
    assert!(harness.store.commit_vertex(&header_for(&chain[4])).is_none());
    assert_eq!(harness.ledger.committed.borrow().len(), committed_so_far);
    assert!(harness
        .drain_events()
        .iter()
        .all(|event| !matches!(event, Event::CommitVertices(_))));
}

#[test]
fn commit_applies_commands_in_root_to_tip_order() {
    let author = &keypairs(1)[0];
    let mut harness = StoreHarness::new(author, Vec::new());
    let chain = build_chain(&harness.genesis_vertex, 4, author);
    for vertex in &chain {
        harness.store.insert_vertex(vertex.clone()).unwrap();
    }

    harness.store.commit_vertex(&header_for(&chain[2])).unwrap();
    assert_eq!(
        *harness.ledger.committed.borrow(),
        vec![chain[0].id(), chain[1].id(), chain[2].id()]
    );
    assert_eq!(harness.counters.committed_commands(), 3);
}

#[test]
fn forks_are_orphaned_by_commit_not_resurrected() {
    let author = &keypairs(2);
    let (proposer, rival) = (&author[0], &author[1]);
    let mut harness = StoreHarness::new(proposer, Vec::new());

    let main = build_chain(&harness.genesis_vertex, 2, proposer);
    // A rival vertex also extends genesis at view 1.
    let fork = make_vertex(&harness.genesis_vertex, &harness.genesis_vertex, View::new(1), rival);
    assert_ne!(fork.id(), main[0].id());

    for vertex in &main {
        harness.store.insert_vertex(vertex.clone()).unwrap();
    }
    harness.store.insert_vertex(fork.clone()).unwrap();

    harness.store.commit_vertex(&header_for(&main[1])).unwrap();
    assert_eq!(harness.store.root_view(), View::new(2));
    // Only the committed lineage reached the ledger.
    assert_eq!(
        *harness.ledger.committed.borrow(),
        vec![main[0].id(), main[1].id()]
    );
}

#[test]
fn get_vertices_returns_the_full_chain_or_nothing() {
    let author = &keypairs(1)[0];
    let mut harness = StoreHarness::new(author, Vec::new());
    let chain = build_chain(&harness.genesis_vertex, 3, author);
    for vertex in &chain {
        harness.store.insert_vertex(vertex.clone()).unwrap();
    }

    let fetched = harness.store.get_vertices(chain[2].id(), 3);
    assert_eq!(fetched.len(), 3);
    assert_eq!(fetched[0].id(), chain[2].id());
    assert_eq!(fetched[1].id(), chain[1].id());
    assert_eq!(fetched[2].id(), chain[0].id());

    // Root + 3 vertices = 4 available; asking for 5 yields nothing rather than a partial chain.
    assert_eq!(harness.store.get_vertices(chain[2].id(), 4).len(), 4);
    assert!(harness.store.get_vertices(chain[2].id(), 5).is_empty());
}

#[test]
fn highest_tc_is_monotonic_by_view() {
    let author = &keypairs(1)[0];
    let mut harness = StoreHarness::new(author, Vec::new());

    assert!(harness.store.highest_tc().is_none());
    harness
        .store
        .insert_timeout_certificate(TimeoutCertificate::new(View::new(5), SignatureSet::new()));
    assert_eq!(harness.store.highest_tc().unwrap().view(), View::new(5));

    harness
        .store
        .insert_timeout_certificate(TimeoutCertificate::new(View::new(3), SignatureSet::new()));
    assert_eq!(harness.store.highest_tc().unwrap().view(), View::new(5));

    harness
        .store
        .insert_timeout_certificate(TimeoutCertificate::new(View::new(9), SignatureSet::new()));
    assert_eq!(harness.store.highest_tc().unwrap().view(), View::new(9));
}

#[test]
fn vertex_chain_creation_enforces_connectivity() {
    let author = &keypairs(1)[0];
    let (genesis_vertex, _) = genesis(author);
    let chain = build_chain(&genesis_vertex, 3, author);

    assert!(VerifiedVertexChain::create(chain.clone()).is_ok());
    assert!(VerifiedVertexChain::create(Vec::new()).is_ok());
    assert!(VerifiedVertexChain::create(vec![chain[2].clone()]).is_ok());

    // Dropping the middle vertex breaks the parent link.
    let disconnected = vec![chain[0].clone(), chain[2].clone()];
    let error = VerifiedVertexChain::create(disconnected).unwrap_err();
    assert_eq!(error.position, 1);
    assert_eq!(error.expected_parent, chain[1].id());
    assert_eq!(error.actual_predecessor, chain[0].id());
}

#[test]
#[should_panic(expected = "rebuild: root QC")]
fn rebuild_rejects_a_root_qc_that_does_not_certify_the_root() {
    let author = &keypairs(1)[0];
    let mut harness = StoreHarness::new(author, Vec::new());
    let chain = build_chain(&harness.genesis_vertex, 2, author);

    // chain[1]'s QC proposes chain[0], not chain[1]: inconsistent root triple.
    let wrong_qc = qc_for(&chain[0], &harness.genesis_vertex, None);
    harness
        .store
        .rebuild(chain[1].clone(), wrong_qc.clone(), wrong_qc, Vec::new());
}

#[test]
#[should_panic(expected = "does not have a commit")]
fn rebuild_rejects_a_commitless_root_commit_qc_past_genesis() {
    let author = &keypairs(1)[0];
    let mut harness = StoreHarness::new(author, Vec::new());
    let chain = build_chain(&harness.genesis_vertex, 2, author);

    // A non-genesis commit QC with no committed anchor cannot prove the root committed.
    let root_qc = qc_for(&chain[1], &chain[0], None);
    harness
        .store
        .rebuild(chain[1].clone(), root_qc.clone(), root_qc, Vec::new());
}

#[test]
fn rebuild_replaces_the_store_state() {
    let author = &keypairs(1)[0];
    let mut harness = StoreHarness::new(author, Vec::new());
    let old = build_chain(&harness.genesis_vertex, 2, author);
    for vertex in &old {
        harness.store.insert_vertex(vertex.clone()).unwrap();
    }

    // A different committed lineage: v4 (root) <- v5 <- v6, committed by v6's QC.
    let lineage = build_chain(&harness.genesis_vertex, 6, author);
    let (v4, v5, v6) = (&lineage[3], &lineage[4], &lineage[5]);
    let commit_qc = qc_for(v6, v5, Some(v4));

    harness.store.rebuild(
        v4.clone(),
        v5.qc().clone(),
        commit_qc,
        vec![v5.clone(), v6.clone()],
    );

    assert_eq!(harness.store.root_view(), View::new(4));
    assert_eq!(harness.store.len(), 3);
    assert!(harness.store.contains_vertex(&v6.id()));
    assert!(!harness.store.contains_vertex(&old[0].id()));
}
