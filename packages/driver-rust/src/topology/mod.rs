//! Topology collaborator: node-state snapshots and the manager-side resets.

pub mod memory;
pub mod traits;
pub mod types;

pub use memory::{InMemoryTopology, TopologyView};
pub use traits::Topology;
pub use types::{HostAddress, ServerDescription, ServerType, RTT_UNSET};
