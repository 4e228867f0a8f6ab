//! Shared fixtures: an in-memory topology, a recording wire executor, and a
//! process id source the tests can change to simulate a fork.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bson::{Document, RawDocumentBuf};
use nodelink_core::{Error, ExecuteOptions, Result};
use nodelink_driver::{
    HostAddress, InMemoryTopology, Manager, ManagerConfig, Operation, OperationKind,
    ProcessIdSource, ServerDescription, ServerType, WireExecutor, WireRequest,
};
use parking_lot::Mutex;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Process ids
// ---------------------------------------------------------------------------

pub struct MockPids(AtomicU32);

impl MockPids {
    pub fn new(pid: u32) -> Self {
        Self(AtomicU32::new(pid))
    }

    /// Pretends the process forked and this is the child.
    pub fn fork_to(&self, pid: u32) {
        self.0.store(pid, Ordering::SeqCst);
    }
}

impl ProcessIdSource for MockPids {
    fn current(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Wire executor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Recorded {
    pub kind: OperationKind,
    pub server_id: u32,
    /// Database for commands, namespace for queries and bulk writes.
    pub target: String,
    pub command_name: Option<String>,
    pub models: usize,
    pub options: ExecuteOptions,
    pub batch_size: u32,
    pub max_await_time_ms: u32,
}

pub struct RecordingExecutor {
    calls: Mutex<Vec<Recorded>>,
    reply: Mutex<Document>,
    failure: Mutex<Option<String>>,
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reply: Mutex::new(bson::doc! { "ok": 1.0 }),
            failure: Mutex::new(None),
        }
    }
}

impl RecordingExecutor {
    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().clone()
    }

    pub fn last(&self) -> Recorded {
        self.calls.lock().last().cloned().expect("no call recorded")
    }

    pub fn reply_with(&self, reply: Document) {
        *self.reply.lock() = reply;
    }

    /// Makes every following call fail with a connection error.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }
}

impl WireExecutor for RecordingExecutor {
    fn execute(&self, request: &WireRequest<'_>) -> Result<RawDocumentBuf> {
        let (target, command_name, models) = match request.operation {
            Operation::Command { db, command } => {
                (db.to_string(), command.name().map(str::to_string), 0)
            }
            Operation::Query { namespace, .. } => (namespace.to_string(), None, 0),
            Operation::BulkWrite { namespace, bulk } => {
                (namespace.to_string(), None, bulk.count())
            }
        };
        self.calls.lock().push(Recorded {
            kind: request.kind,
            server_id: request.server_id,
            target,
            command_name,
            models,
            options: request.options.clone(),
            batch_size: request.batch_size,
            max_await_time_ms: request.max_await_time_ms,
        });
        if let Some(message) = self.failure.lock().clone() {
            return Err(Error::Connection(message));
        }
        Ok(RawDocumentBuf::from_document(&self.reply.lock())?)
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

pub const PARENT_PID: u32 = 4242;

pub struct Fixture {
    pub topology: Arc<InMemoryTopology>,
    pub executor: Arc<RecordingExecutor>,
    pub pids: Arc<MockPids>,
    pub manager: Manager,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        init_tracing();
        let topology = Arc::new(InMemoryTopology::new());
        let executor = Arc::new(RecordingExecutor::default());
        let pids = Arc::new(MockPids::new(PARENT_PID));
        let manager =
            Manager::with_process_ids(topology.clone(), executor.clone(), pids.clone(), config);
        Self {
            topology,
            executor,
            pids,
            manager,
        }
    }
}

pub fn description(id: u32, host: &str, port: u16, server_type: ServerType) -> ServerDescription {
    ServerDescription::new(id, HostAddress::new(host, port), server_type)
}

pub fn raw(doc: Document) -> RawDocumentBuf {
    RawDocumentBuf::from_document(&doc).expect("valid document")
}
