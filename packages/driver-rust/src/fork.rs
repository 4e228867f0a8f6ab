//! Fork-safety guard.
//!
//! Every node handle records the process id it was created in. Before any
//! operation that touches a connection, the handle compares that id with the
//! current one. After a fork the child sees a different id and resets the
//! shared client once: live connections are discarded and pooled sessions
//! dropped, so the child never writes to sockets inherited from its parent.
//!
//! Two markers cooperate:
//! - [`ForkGuard`] lives on each handle and short-circuits the common case.
//! - [`ClientMarker`] lives on the manager and makes the reset happen once per
//!   process even when many handles notice the fork at the same time.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::warn;

use crate::topology::Topology;

// ---------------------------------------------------------------------------
// ProcessIdSource
// ---------------------------------------------------------------------------

/// Abstraction over the OS process id for dependency injection.
///
/// The default implementation ([`SystemProcessId`]) reads the real id; tests
/// substitute a source they can change to simulate a fork.
pub trait ProcessIdSource: Send + Sync {
    fn current(&self) -> u32;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessId;

impl ProcessIdSource for SystemProcessId {
    fn current(&self) -> u32 {
        std::process::id()
    }
}

// ---------------------------------------------------------------------------
// ClientMarker
// ---------------------------------------------------------------------------

/// Process id the shared client's connections belong to.
#[derive(Debug)]
pub struct ClientMarker {
    pid: Mutex<u32>,
}

impl ClientMarker {
    #[must_use]
    pub fn new(pid: u32) -> Self {
        Self {
            pid: Mutex::new(pid),
        }
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        *self.pid.lock()
    }

    /// Resets the client and clears the session pool unless that already
    /// happened for `pid`. Returns `true` when a reset was performed.
    pub fn reset_once(&self, topology: &dyn Topology, pid: u32) -> bool {
        let mut owner = self.pid.lock();
        if *owner == pid {
            return false;
        }
        warn!(
            previous_pid = *owner,
            pid, "process id changed, resetting client and clearing session pool"
        );
        topology.reset_client();
        topology.clear_session_pool();
        *owner = pid;
        true
    }
}

// ---------------------------------------------------------------------------
// ForkGuard
// ---------------------------------------------------------------------------

/// Per-handle record of the process id the handle was created in.
#[derive(Debug)]
pub struct ForkGuard {
    created_by_pid: AtomicU32,
}

impl ForkGuard {
    #[must_use]
    pub fn new(pid: u32) -> Self {
        Self {
            created_by_pid: AtomicU32::new(pid),
        }
    }

    #[must_use]
    pub fn created_by_pid(&self) -> u32 {
        self.created_by_pid.load(Ordering::Acquire)
    }

    /// Enforces fork safety before an operation. Returns `true` when this
    /// call performed the client reset.
    ///
    /// The client marker is checked too, so a handle created in a child
    /// process still resets a client inherited from the parent.
    pub fn enforce(
        &self,
        pids: &dyn ProcessIdSource,
        client: &ClientMarker,
        topology: &dyn Topology,
    ) -> bool {
        let current = pids.current();
        if self.created_by_pid() == current && client.pid() == current {
            return false;
        }
        let reset = client.reset_once(topology, current);
        self.created_by_pid.store(current, Ordering::Release);
        reset
    }
}

impl Clone for ForkGuard {
    fn clone(&self) -> Self {
        Self::new(self.created_by_pid())
    }
}
