//! Execution dispatcher.
//!
//! Routes a descriptor to the wire executor addressed at one specific node.
//! No server selection happens here: the node id travels with the request and
//! the executor must use a connection to exactly that node.
//!
//! Each call is wrapped in an `execute` span that records `duration_ms` and
//! `outcome`, the same fields the operation metrics use elsewhere.

use std::borrow::Cow;
use std::time::Instant;

use bson::{RawDocument, RawDocumentBuf};
use nodelink_core::options::LegacyKey;
use nodelink_core::{BulkWrite, Codec, Command, Error, ExecuteOptions, Query, Result, Value};
use tracing::{info, info_span};

use crate::manager::Manager;

// ---------------------------------------------------------------------------
// OperationKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Raw command, sent as-is.
    Command,
    ReadCommand,
    WriteCommand,
    ReadWriteCommand,
    Query,
    BulkWrite,
}

impl OperationKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::ReadCommand => "read_command",
            Self::WriteCommand => "write_command",
            Self::ReadWriteCommand => "read_write_command",
            Self::Query => "query",
            Self::BulkWrite => "bulk_write",
        }
    }

    /// The bare legacy value this entry point still accepts in place of an
    /// options mapping.
    #[must_use]
    pub fn legacy_option(self) -> Option<LegacyKey> {
        match self {
            Self::Command | Self::Query => Some(LegacyKey::ReadPreference),
            Self::BulkWrite => Some(LegacyKey::WriteConcern),
            Self::ReadCommand | Self::WriteCommand | Self::ReadWriteCommand => None,
        }
    }

    fn inherits_read_preference(self) -> bool {
        matches!(self, Self::Command | Self::ReadCommand | Self::Query)
    }

    fn inherits_write_concern(self) -> bool {
        matches!(
            self,
            Self::WriteCommand | Self::ReadWriteCommand | Self::BulkWrite
        )
    }
}

// ---------------------------------------------------------------------------
// Wire request / reply
// ---------------------------------------------------------------------------

/// The descriptor being executed, with its target database or namespace.
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    Command { db: &'a str, command: &'a Command },
    Query { namespace: &'a str, query: &'a Query },
    BulkWrite { namespace: &'a str, bulk: &'a BulkWrite },
}

/// Everything the wire executor needs for one call.
#[derive(Debug, Clone, Copy)]
pub struct WireRequest<'a> {
    pub kind: OperationKind,
    /// The node to use. Executors must not select a different one.
    pub server_id: u32,
    pub operation: Operation<'a>,
    pub options: &'a ExecuteOptions,
    /// Cursor batch size derived from the descriptor, 0 when unset.
    pub batch_size: u32,
    /// Advisory await time for tailable cursors, 0 when unset.
    pub max_await_time_ms: u32,
}

/// Sends requests over an established connection.
///
/// Network failures should be reported as `Error::Connection`, server-side
/// failures as `Error::Runtime`. Nothing is retried by the caller.
pub trait WireExecutor: Send + Sync {
    fn execute(&self, request: &WireRequest<'_>) -> Result<RawDocumentBuf>;
}

/// Raw reply plus the cursor settings a cursor wrapper needs.
#[derive(Debug, Clone, PartialEq)]
pub struct WireReply {
    server_id: u32,
    kind: OperationKind,
    reply: RawDocumentBuf,
    batch_size: u32,
    max_await_time_ms: u32,
    codec: Codec,
}

impl WireReply {
    #[must_use]
    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn reply(&self) -> &RawDocument {
        &self.reply
    }

    #[must_use]
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    #[must_use]
    pub fn max_await_time_ms(&self) -> u32 {
        self.max_await_time_ms
    }

    /// Decodes the reply into host values.
    ///
    /// # Errors
    ///
    /// `Decode` for malformed or too deeply nested replies.
    pub fn decode(&self) -> Result<Value> {
        Ok(self.codec.decode_document(&self.reply)?)
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

fn validate_target(operation: &Operation<'_>) -> Result<()> {
    match operation {
        Operation::Command { db, .. } => {
            if db.is_empty() {
                return Err(Error::invalid_argument("Database name cannot be empty"));
            }
        }
        Operation::Query { namespace, .. } | Operation::BulkWrite { namespace, .. } => {
            let valid = namespace
                .split_once('.')
                .is_some_and(|(db, coll)| !db.is_empty() && !coll.is_empty());
            if !valid {
                return Err(Error::invalid_argument(format!(
                    "Invalid namespace provided: {namespace}"
                )));
            }
        }
    }
    Ok(())
}

/// Rejects an operation that cannot be sent: a bad database or namespace, or
/// a node the topology no longer knows.
pub(crate) fn preflight(
    manager: &Manager,
    server_id: u32,
    operation: &Operation<'_>,
) -> Result<()> {
    validate_target(operation)?;
    if manager.topology().server_description(server_id).is_none() {
        return Err(Error::runtime("Failed to get node state"));
    }
    Ok(())
}

/// Executes `operation` against `server_id`.
///
/// The caller has already run the fork guard and normalized `options`.
/// Manager defaults fill in a read preference or write concern the operation
/// did not set.
pub(crate) fn dispatch(
    manager: &Manager,
    server_id: u32,
    kind: OperationKind,
    operation: Operation<'_>,
    mut options: Cow<'_, ExecuteOptions>,
) -> Result<WireReply> {
    preflight(manager, server_id, &operation)?;

    let config = manager.config();
    if kind.inherits_read_preference() && options.read_preference.is_none() {
        options.to_mut().read_preference = Some(config.read_preference.clone());
    }
    if kind.inherits_write_concern() && options.write_concern.is_none() {
        if let Some(write_concern) = &config.write_concern {
            options.to_mut().write_concern = Some(write_concern.clone());
        }
    }

    let (batch_size, max_await_time_ms) = match operation {
        Operation::Command { command, .. } => (command.batch_size(), command.max_await_time_ms()),
        Operation::Query { query, .. } => (query.batch_size(), query.max_await_time_ms()),
        Operation::BulkWrite { .. } => (0, 0),
    };
    let request = WireRequest {
        kind,
        server_id,
        operation,
        options: &*options,
        batch_size,
        max_await_time_ms,
    };

    let span = info_span!(
        "execute",
        kind = kind.name(),
        server_id,
        duration_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );
    let _entered = span.enter();
    let start = Instant::now();
    let result = manager.executor().execute(&request);
    let outcome = if result.is_ok() { "ok" } else { "error" };

    #[allow(clippy::cast_possible_truncation)]
    let duration_ms = start.elapsed().as_millis() as u64;
    span.record("duration_ms", duration_ms);
    span.record("outcome", outcome);
    info!(duration_ms, outcome, "operation completed");

    Ok(WireReply {
        server_id,
        kind,
        reply: result?,
        batch_size,
        max_await_time_ms,
        codec: *manager.codec(),
    })
}

#[cfg(test)]
mod tests {
    use nodelink_core::CommandOptions;

    use super::*;

    #[test]
    fn legacy_options_per_kind() {
        assert_eq!(
            OperationKind::Command.legacy_option(),
            Some(LegacyKey::ReadPreference)
        );
        assert_eq!(
            OperationKind::Query.legacy_option(),
            Some(LegacyKey::ReadPreference)
        );
        assert_eq!(
            OperationKind::BulkWrite.legacy_option(),
            Some(LegacyKey::WriteConcern)
        );
        assert_eq!(OperationKind::ReadCommand.legacy_option(), None);
        assert_eq!(OperationKind::WriteCommand.legacy_option(), None);
        assert_eq!(OperationKind::ReadWriteCommand.legacy_option(), None);
    }

    #[test]
    fn namespace_validation() {
        let query = Query::new(&Value::Map(nodelink_core::Map::new()), &nodelink_core::QueryOptions::default())
            .unwrap();
        for bad in ["", "db", ".coll", "db."] {
            let op = Operation::Query {
                namespace: bad,
                query: &query,
            };
            assert!(validate_target(&op).unwrap_err().is_invalid_argument());
        }
        let op = Operation::Query {
            namespace: "db.coll.sub",
            query: &query,
        };
        assert!(validate_target(&op).is_ok());
    }

    #[test]
    fn empty_database_is_rejected() {
        let command = Command::new(
            &Value::Map([("ping", 1)].into_iter().collect()),
            Some(&CommandOptions::default()),
        )
        .unwrap();
        let op = Operation::Command {
            db: "",
            command: &command,
        };
        assert!(validate_target(&op).is_err());
    }
}
