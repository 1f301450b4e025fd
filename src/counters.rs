/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Write-only counters the core maintains for the embedding node's diagnostics.
//!
//! The core only increments and sets; reading, exporting, and resetting are the embedding node's
//! business. Exporting to a metrics backend is explicitly out of scope here.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the consensus core and the embedding node.
#[derive(Default)]
pub struct SystemCounters {
    vertices_with_indirect_parent: AtomicU64,
    committed_commands: AtomicU64,
    vertex_store_size: AtomicU64,
    sync_requests_sent: AtomicU64,
}

impl SystemCounters {
    /// Create a new set of counters, all zero.
    pub fn new() -> SystemCounters {
        SystemCounters::default()
    }

    /// Note that a vertex was inserted whose parent does not directly precede it by view.
    pub fn increment_vertices_with_indirect_parent(&self) {
        self.vertices_with_indirect_parent
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn vertices_with_indirect_parent(&self) -> u64 {
        self.vertices_with_indirect_parent.load(Ordering::Relaxed)
    }

    /// Note that a command was handed to the ledger for final application.
    pub fn increment_committed_commands(&self) {
        self.committed_commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn committed_commands(&self) -> u64 {
        self.committed_commands.load(Ordering::Relaxed)
    }

    /// Record the number of vertices currently in the vertex store.
    pub fn set_vertex_store_size(&self, size: u64) {
        self.vertex_store_size.store(size, Ordering::Relaxed);
    }

    pub fn vertex_store_size(&self) -> u64 {
        self.vertex_store_size.load(Ordering::Relaxed)
    }

    /// Note that a vertex-sync request was sent to a peer.
    pub fn increment_sync_requests_sent(&self) {
        self.sync_requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sync_requests_sent(&self) -> u64 {
        self.sync_requests_sent.load(Ordering::Relaxed)
    }
}
