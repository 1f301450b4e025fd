/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The core logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values
//! are always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. Public keys and hashes are
//! rendered as the first seven characters of their Base64 encoding.

use std::time::SystemTime;

use crate::events::*;
use crate::votes::pending_votes::ViewVotingResult;

// Names of each event in PascalCase for printing:
pub const INSERT_VERTEX: &str = "InsertVertex";
pub const COMMIT_VERTICES: &str = "CommitVertices";
pub const UPDATE_HIGH_QC: &str = "UpdateHighQC";

pub const FORMED_QC: &str = "FormedQC";
pub const FORMED_TC: &str = "FormedTC";
pub const RECEIVE_NEW_VIEW: &str = "ReceiveNewView";

pub const START_SYNC: &str = "StartSync";
pub const END_SYNC: &str = "EndSync";
pub const SYNCED_VERTEX: &str = "SyncedVertex";

pub(crate) fn log_event(event: &Event) {
    match event {
        Event::InsertVertex(insert_vertex) => log::info!(
            "{}, {}, {}, {}, {}",
            INSERT_VERTEX,
            secs_since_unix_epoch(insert_vertex.timestamp),
            insert_vertex.vertex.id(),
            insert_vertex.vertex.view(),
            insert_vertex.store_size,
        ),
        Event::CommitVertices(commit_vertices) => log::info!(
            "{}, {}, {}, {}",
            COMMIT_VERTICES,
            secs_since_unix_epoch(commit_vertices.timestamp),
            commit_vertices.vertices.len(),
            commit_vertices.proof.view(),
        ),
        Event::UpdateHighQC(update_high_qc) => log::info!(
            "{}, {}, {}, {}",
            UPDATE_HIGH_QC,
            secs_since_unix_epoch(update_high_qc.timestamp),
            update_high_qc.highest_qc.proposed().vertex_id(),
            update_high_qc.highest_qc.view(),
        ),
        Event::QuorumReached(quorum_reached) => {
            let name = match quorum_reached.result {
                ViewVotingResult::FormedQC(_) => FORMED_QC,
                ViewVotingResult::FormedTC(_) => FORMED_TC,
            };
            log::info!(
                "{}, {}, {}, {}",
                name,
                secs_since_unix_epoch(quorum_reached.timestamp),
                quorum_reached.result.view(),
                quorum_reached.last_author,
            )
        }
        Event::ReceiveNewView(receive_new_view) => log::debug!(
            "{}, {}, {}, {}",
            RECEIVE_NEW_VIEW,
            secs_since_unix_epoch(receive_new_view.timestamp),
            receive_new_view.origin,
            receive_new_view.view,
        ),
        Event::StartSync(start_sync) => log::info!(
            "{}, {}, {}, {}",
            START_SYNC,
            secs_since_unix_epoch(start_sync.timestamp),
            start_sync.peer,
            start_sync.vertex_id,
        ),
        Event::EndSync(end_sync) => log::info!(
            "{}, {}, {}, {}",
            END_SYNC,
            secs_since_unix_epoch(end_sync.timestamp),
            end_sync.peer,
            end_sync.vertices_synced,
        ),
        Event::SyncedVertex(synced_vertex) => log::debug!(
            "{}, {}, {}",
            SYNCED_VERTEX,
            secs_since_unix_epoch(synced_vertex.timestamp),
            synced_vertex.vertex_id,
        ),
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
