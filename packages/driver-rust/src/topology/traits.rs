//! Collaborator seam between node handles and whatever monitors the cluster.

use super::types::ServerDescription;

/// The cluster manager's view of its nodes and its shared client state.
///
/// Implementations own connection pools and topology monitoring; node handles
/// only ever read snapshots through this trait and trigger the two fork-safety
/// resets.
pub trait Topology: Send + Sync {
    /// Current snapshot for `server_id`, or `None` when the node is no longer
    /// part of the topology.
    fn server_description(&self, server_id: u32) -> Option<ServerDescription>;

    /// Snapshot built from the handshake of the connection backing
    /// `server_id`. Used for load balancers, whose own snapshot carries an
    /// empty handshake response.
    fn handshake_description(&self, server_id: u32) -> anyhow::Result<ServerDescription>;

    /// Discards live connection state so a forked child never reuses sockets
    /// inherited from its parent. Must be safe to call redundantly.
    fn reset_client(&self);

    /// Drops every pooled server session. Must be safe to call redundantly.
    fn clear_session_pool(&self);
}
