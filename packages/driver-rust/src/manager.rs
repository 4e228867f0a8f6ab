//! Cluster manager: owner of the shared collaborators that node handles borrow.
//!
//! A [`Server`] handle holds `&Manager`, so the borrow checker enforces that
//! the manager outlives every handle derived from it. The handle never owns
//! the topology, the wire executor, or the session pool.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{doc, Document};
use nodelink_core::version::{DRIVER_NAME, VERSION};
use nodelink_core::Codec;
use tracing::debug;

use crate::config::ManagerConfig;
use crate::dispatch::WireExecutor;
use crate::fork::{ClientMarker, ForkGuard, ProcessIdSource, SystemProcessId};
use crate::monitoring::{Subscriber, SubscriberRegistry, TopologyOpeningEvent};
use crate::server::Server;
use crate::topology::Topology;

pub struct Manager {
    topology: Arc<dyn Topology>,
    executor: Arc<dyn WireExecutor>,
    process_ids: Arc<dyn ProcessIdSource>,
    client: ClientMarker,
    config: ManagerConfig,
    codec: Codec,
    topology_id: ObjectId,
    subscribers: SubscriberRegistry,
    opened: AtomicBool,
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("topology_id", &self.topology_id)
            .field("client_pid", &self.client.pid())
            .field("config", &self.config)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl Manager {
    /// Creates a manager reading the real OS process id.
    pub fn new(
        topology: Arc<dyn Topology>,
        executor: Arc<dyn WireExecutor>,
        config: ManagerConfig,
    ) -> Self {
        Self::with_process_ids(topology, executor, Arc::new(SystemProcessId), config)
    }

    /// Creates a manager with an injected process id source.
    pub fn with_process_ids(
        topology: Arc<dyn Topology>,
        executor: Arc<dyn WireExecutor>,
        process_ids: Arc<dyn ProcessIdSource>,
        config: ManagerConfig,
    ) -> Self {
        let pid = process_ids.current();
        Self {
            topology,
            executor,
            process_ids,
            client: ClientMarker::new(pid),
            codec: Codec::new(config.max_document_depth),
            config,
            topology_id: ObjectId::new(),
            subscribers: SubscriberRegistry::default(),
            opened: AtomicBool::new(false),
        }
    }

    /// Returns a handle for `server_id`. The node is not looked up until the
    /// handle is used, so handles for unknown ids fail on first use.
    pub fn server(&self, server_id: u32) -> Server<'_> {
        self.open();
        Server::new(self, server_id, ForkGuard::new(self.process_ids.current()))
    }

    fn open(&self) {
        if self.opened.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(topology_id = %self.topology_id, "topology opening");
        self.subscribers
            .topology_opening(&TopologyOpeningEvent::new(self.topology_id));
    }

    /// Runs the fork guard of a handle against this manager's shared client.
    pub(crate) fn enforce_fork_safety(&self, guard: &ForkGuard) -> bool {
        guard.enforce(
            self.process_ids.as_ref(),
            &self.client,
            self.topology.as_ref(),
        )
    }

    #[must_use]
    pub fn topology(&self) -> &dyn Topology {
        self.topology.as_ref()
    }

    pub(crate) fn executor(&self) -> &dyn WireExecutor {
        self.executor.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    #[must_use]
    pub fn topology_id(&self) -> ObjectId {
        self.topology_id
    }

    /// Process id the shared client's connections currently belong to.
    #[must_use]
    pub fn client_pid(&self) -> u32 {
        self.client.pid()
    }

    /// Registers a monitoring subscriber. Returns `false` if already registered.
    pub fn add_subscriber(&self, subscriber: Arc<dyn Subscriber>) -> bool {
        self.subscribers.add(subscriber)
    }

    /// Unregisters a monitoring subscriber. Returns `false` if not registered.
    pub fn remove_subscriber(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }

    /// Client metadata sent in the connection handshake.
    #[must_use]
    pub fn handshake_metadata(&self) -> Document {
        let mut metadata = doc! {
            "driver": { "name": DRIVER_NAME, "version": VERSION },
        };
        if let Some(app_name) = &self.config.app_name {
            metadata.insert("application", doc! { "name": app_name.as_str() });
        }
        metadata
    }
}
