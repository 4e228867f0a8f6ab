//! `NodeLink` Driver: node handles, fork safety, node-state snapshots, and
//! execution dispatch against one specific node.

pub mod config;
pub mod dispatch;
pub mod fork;
pub mod manager;
pub mod monitoring;
pub mod server;
pub mod topology;

pub use config::ManagerConfig;
pub use dispatch::{Operation, OperationKind, WireExecutor, WireReply, WireRequest};
pub use fork::{ClientMarker, ForkGuard, ProcessIdSource, SystemProcessId};
pub use manager::Manager;
pub use monitoring::{Subscriber, TopologyOpeningEvent};
pub use server::Server;
pub use topology::{HostAddress, InMemoryTopology, ServerDescription, ServerType, Topology};
