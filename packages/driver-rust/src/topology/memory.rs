//! In-memory [`Topology`] for embedders that manage discovery themselves, and
//! for tests.
//!
//! Snapshots live in an `ArcSwap<TopologyView>` so readers never block behind
//! an update. Handshake descriptions for load-balanced nodes sit in a separate
//! `DashMap`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use arc_swap::ArcSwap;
use dashmap::DashMap;

use super::traits::Topology;
use super::types::ServerDescription;

/// Versioned set of node snapshots. The version advances on every change.
#[derive(Debug, Clone, Default)]
pub struct TopologyView {
    pub version: u64,
    pub servers: HashMap<u32, ServerDescription>,
}

#[derive(Debug, Default)]
pub struct InMemoryTopology {
    view: ArcSwap<TopologyView>,
    handshakes: DashMap<u32, ServerDescription>,
    client_resets: AtomicU64,
    pool_clears: AtomicU64,
    pooled_sessions: AtomicUsize,
}

impl InMemoryTopology {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the snapshot for `description.server_id()`.
    pub fn upsert(&self, description: ServerDescription) {
        self.view.rcu(|current| {
            let mut next = TopologyView::clone(current);
            next.servers
                .insert(description.server_id(), description.clone());
            next.version += 1;
            next
        });
    }

    /// Removes a node. Returns `true` if it was present.
    pub fn remove(&self, server_id: u32) -> bool {
        let previous = self.view.rcu(|current| {
            let mut next = TopologyView::clone(current);
            if next.servers.remove(&server_id).is_some() {
                next.version += 1;
            }
            next
        });
        self.handshakes.remove(&server_id);
        previous.servers.contains_key(&server_id)
    }

    /// Registers the handshake description backing a load-balanced node.
    pub fn set_handshake(&self, description: ServerDescription) {
        self.handshakes.insert(description.server_id(), description);
    }

    #[must_use]
    pub fn view(&self) -> Arc<TopologyView> {
        self.view.load_full()
    }

    /// Simulates a session being checked back into the pool.
    pub fn pool_session(&self) {
        self.pooled_sessions.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn pooled_sessions(&self) -> usize {
        self.pooled_sessions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn client_resets(&self) -> u64 {
        self.client_resets.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn pool_clears(&self) -> u64 {
        self.pool_clears.load(Ordering::Relaxed)
    }
}

impl Topology for InMemoryTopology {
    fn server_description(&self, server_id: u32) -> Option<ServerDescription> {
        self.view.load().servers.get(&server_id).cloned()
    }

    fn handshake_description(&self, server_id: u32) -> anyhow::Result<ServerDescription> {
        self.handshakes
            .get(&server_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| anyhow!("no handshake recorded for server id {server_id}"))
    }

    fn reset_client(&self) {
        self.client_resets.fetch_add(1, Ordering::Relaxed);
    }

    fn clear_session_pool(&self) {
        self.pooled_sessions.store(0, Ordering::Relaxed);
        self.pool_clears.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::types::{HostAddress, ServerType};

    fn sd(id: u32) -> ServerDescription {
        ServerDescription::new(id, HostAddress::new("db", 27017), ServerType::Standalone)
    }

    #[test]
    fn upsert_and_remove_advance_version() {
        let topology = InMemoryTopology::new();
        topology.upsert(sd(1));
        topology.upsert(sd(2));
        assert_eq!(topology.view().version, 2);
        assert!(topology.server_description(1).is_some());

        assert!(topology.remove(1));
        assert!(!topology.remove(1));
        assert!(topology.server_description(1).is_none());
        assert_eq!(topology.view().version, 3);
    }

    #[test]
    fn snapshots_are_copies() {
        let topology = InMemoryTopology::new();
        topology.upsert(sd(1));
        let before = topology.server_description(1).unwrap();
        topology.upsert(sd(1).with_round_trip_time(12));
        assert_eq!(before.round_trip_time(), None);
        assert_eq!(topology.server_description(1).unwrap().round_trip_time(), Some(12));
    }

    #[test]
    fn missing_handshake_is_an_error() {
        let topology = InMemoryTopology::new();
        let err = topology.handshake_description(4).unwrap_err();
        assert_eq!(err.to_string(), "no handshake recorded for server id 4");
    }

    #[test]
    fn resets_are_counted() {
        let topology = InMemoryTopology::new();
        topology.pool_session();
        topology.pool_session();
        topology.reset_client();
        topology.clear_session_pool();
        assert_eq!(topology.client_resets(), 1);
        assert_eq!(topology.pool_clears(), 1);
        assert_eq!(topology.pooled_sessions(), 0);
    }
}
