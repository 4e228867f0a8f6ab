//! Node handle.
//!
//! A [`Server`] is a manager reference plus a node id. It never caches a
//! snapshot or a connection: every accessor fetches the current
//! [`ServerDescription`] from the topology, so a handle always reflects what
//! the manager knows right now and fails once the node leaves the topology.
//!
//! Every `execute_*` method runs the fork guard before touching the wire.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use bson::raw::RawBsonRef;
use bson::RawDocument;
use nodelink_core::codec::{as_bool, find_case_insensitive};
use nodelink_core::options::normalize;
use nodelink_core::{
    BulkWrite, Command, Error, ExecuteOptions, Map, OptionsArg, Query, Result, Value,
};

use crate::dispatch::{dispatch, preflight, Operation, OperationKind, WireReply};
use crate::fork::ForkGuard;
use crate::manager::Manager;
use crate::topology::{ServerDescription, ServerType};

const NO_DESCRIPTION: &str = "Failed to get server description";

#[derive(Clone)]
pub struct Server<'m> {
    manager: &'m Manager,
    server_id: u32,
    guard: ForkGuard,
}

impl fmt::Debug for Server<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("server_id", &self.server_id)
            .field("created_by_pid", &self.guard.created_by_pid())
            .finish_non_exhaustive()
    }
}

impl<'m> Server<'m> {
    pub(crate) fn new(manager: &'m Manager, server_id: u32, guard: ForkGuard) -> Self {
        Self {
            manager,
            server_id,
            guard,
        }
    }

    #[must_use]
    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    #[must_use]
    pub fn manager(&self) -> &'m Manager {
        self.manager
    }

    /// Process id recorded by this handle's fork guard.
    #[must_use]
    pub fn created_by_pid(&self) -> u32 {
        self.guard.created_by_pid()
    }

    // -- execution --

    /// Executes a raw command. Accepts a bare read preference in place of
    /// options.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unusable options, `Runtime`/`Connection` when the
    /// node is unknown or the wire layer fails.
    pub fn execute_command(
        &self,
        db: &str,
        command: &Command,
        options: Option<&OptionsArg>,
    ) -> Result<WireReply> {
        self.execute_with_arg(
            OperationKind::Command,
            Operation::Command { db, command },
            options,
        )
    }

    /// Executes a command that only reads.
    ///
    /// # Errors
    ///
    /// See [`Server::execute_command`].
    pub fn execute_read_command(
        &self,
        db: &str,
        command: &Command,
        options: Option<&ExecuteOptions>,
    ) -> Result<WireReply> {
        self.execute_with_options(
            OperationKind::ReadCommand,
            Operation::Command { db, command },
            options,
        )
    }

    /// Executes a command that only writes.
    ///
    /// # Errors
    ///
    /// See [`Server::execute_command`].
    pub fn execute_write_command(
        &self,
        db: &str,
        command: &Command,
        options: Option<&ExecuteOptions>,
    ) -> Result<WireReply> {
        self.execute_with_options(
            OperationKind::WriteCommand,
            Operation::Command { db, command },
            options,
        )
    }

    /// Executes a command that both reads and writes (e.g. `aggregate` with
    /// `$out`).
    ///
    /// # Errors
    ///
    /// See [`Server::execute_command`].
    pub fn execute_read_write_command(
        &self,
        db: &str,
        command: &Command,
        options: Option<&ExecuteOptions>,
    ) -> Result<WireReply> {
        self.execute_with_options(
            OperationKind::ReadWriteCommand,
            Operation::Command { db, command },
            options,
        )
    }

    /// Executes a find query against `namespace` (`"db.collection"`).
    /// Accepts a bare read preference in place of options.
    ///
    /// # Errors
    ///
    /// See [`Server::execute_command`].
    pub fn execute_query(
        &self,
        namespace: &str,
        query: &Query,
        options: Option<&OptionsArg>,
    ) -> Result<WireReply> {
        self.execute_with_arg(
            OperationKind::Query,
            Operation::Query { namespace, query },
            options,
        )
    }

    /// Executes a bulk write against `namespace`. Accepts a bare write concern
    /// in place of options. The bulk is consumed once it passes namespace and
    /// node checks: executing it again fails.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty or already executed bulk, otherwise see
    /// [`Server::execute_command`].
    pub fn execute_bulk_write(
        &self,
        namespace: &str,
        bulk: &mut BulkWrite,
        options: Option<&OptionsArg>,
    ) -> Result<WireReply> {
        self.manager.enforce_fork_safety(&self.guard);
        let kind = OperationKind::BulkWrite;
        let options = normalize(options, kind.legacy_option())?;
        preflight(
            self.manager,
            self.server_id,
            &Operation::BulkWrite {
                namespace,
                bulk: &*bulk,
            },
        )?;
        bulk.mark_executed()?;
        dispatch(
            self.manager,
            self.server_id,
            kind,
            Operation::BulkWrite {
                namespace,
                bulk: &*bulk,
            },
            options,
        )
    }

    fn execute_with_arg(
        &self,
        kind: OperationKind,
        operation: Operation<'_>,
        options: Option<&OptionsArg>,
    ) -> Result<WireReply> {
        self.manager.enforce_fork_safety(&self.guard);
        let options = normalize(options, kind.legacy_option())?;
        dispatch(self.manager, self.server_id, kind, operation, options)
    }

    fn execute_with_options(
        &self,
        kind: OperationKind,
        operation: Operation<'_>,
        options: Option<&ExecuteOptions>,
    ) -> Result<WireReply> {
        self.manager.enforce_fork_safety(&self.guard);
        let options = options.map_or_else(Cow::default, Cow::Borrowed);
        dispatch(self.manager, self.server_id, kind, operation, options)
    }

    // -- description --

    /// Current snapshot for this node.
    ///
    /// # Errors
    ///
    /// `Runtime` when the node is no longer part of the topology.
    pub fn server_description(&self) -> Result<ServerDescription> {
        self.manager
            .topology()
            .server_description(self.server_id)
            .ok_or_else(|| Error::runtime(NO_DESCRIPTION))
    }

    /// # Errors
    ///
    /// `Runtime` when the node is no longer part of the topology.
    pub fn host(&self) -> Result<String> {
        Ok(self.server_description()?.host().host.clone())
    }

    /// # Errors
    ///
    /// `Runtime` when the node is no longer part of the topology.
    pub fn port(&self) -> Result<u16> {
        Ok(self.server_description()?.host().port)
    }

    /// # Errors
    ///
    /// `Runtime` when the node is no longer part of the topology.
    pub fn server_type(&self) -> Result<ServerType> {
        Ok(self.server_description()?.server_type())
    }

    /// Round-trip time in milliseconds, `None` while unmeasured.
    ///
    /// # Errors
    ///
    /// `Runtime` when the node is no longer part of the topology.
    pub fn latency(&self) -> Result<Option<i64>> {
        Ok(self.server_description()?.round_trip_time())
    }

    /// Replica set tags from the handshake response; empty when absent.
    ///
    /// # Errors
    ///
    /// `Runtime` when the node is unknown, `Decode` for malformed tags.
    pub fn tags(&self) -> Result<Map> {
        let sd = self.server_description()?;
        Ok(self.decode_tags(sd.hello_response())?.unwrap_or_default())
    }

    /// Handshake response of this node. For a load balancer, whose own
    /// response is empty, the response of the backing connection's handshake.
    ///
    /// # Errors
    ///
    /// `Runtime` when the node is unknown or the handshake description cannot
    /// be fetched, `Decode` for malformed responses.
    pub fn info(&self) -> Result<Value> {
        let sd = self.server_description()?;
        self.effective_hello_response(&sd)
    }

    /// # Errors
    ///
    /// `Runtime` when the node is no longer part of the topology.
    pub fn is_primary(&self) -> Result<bool> {
        self.type_is(ServerType::RsPrimary)
    }

    /// # Errors
    ///
    /// `Runtime` when the node is no longer part of the topology.
    pub fn is_secondary(&self) -> Result<bool> {
        self.type_is(ServerType::RsSecondary)
    }

    /// # Errors
    ///
    /// `Runtime` when the node is no longer part of the topology.
    pub fn is_arbiter(&self) -> Result<bool> {
        self.type_is(ServerType::RsArbiter)
    }

    /// # Errors
    ///
    /// `Runtime` when the node is no longer part of the topology.
    pub fn is_hidden(&self) -> Result<bool> {
        Ok(flag(self.server_description()?.hello_response(), "hidden"))
    }

    /// # Errors
    ///
    /// `Runtime` when the node is no longer part of the topology.
    pub fn is_passive(&self) -> Result<bool> {
        Ok(flag(self.server_description()?.hello_response(), "passive"))
    }

    fn type_is(&self, server_type: ServerType) -> Result<bool> {
        Ok(self.server_description()?.type_name() == server_type.name())
    }

    fn decode_tags(&self, hello: &RawDocument) -> Result<Option<Map>> {
        match hello.get("tags") {
            Ok(Some(RawBsonRef::Document(tags))) => {
                match self.manager.codec().decode_document(tags)? {
                    Value::Map(map) => Ok(Some(map)),
                    _ => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    fn effective_hello_response(&self, sd: &ServerDescription) -> Result<Value> {
        let codec = self.manager.codec();
        if sd.type_name() != ServerType::LoadBalancer.name() {
            return Ok(codec.decode_document(sd.hello_response())?);
        }
        let handshake = self
            .manager
            .topology()
            .handshake_description(self.server_id)
            .map_err(|e| {
                Error::runtime(format!("Failed to get handshake server description: {e}"))
            })?;
        Ok(codec.decode_document(handshake.hello_response())?)
    }

    /// Full-state record: host, port, type code, the five predicates, tags
    /// when present, the handshake response as `last_hello_response`, and the
    /// round-trip time (null while unmeasured). Any decoding failure aborts
    /// the whole record.
    ///
    /// # Errors
    ///
    /// `Runtime` when the node or its handshake description is unavailable,
    /// `Decode` for malformed nested documents.
    pub fn to_document(&self) -> Result<Value> {
        let sd = self.server_description()?;
        let hello = sd.hello_response();
        let type_name = sd.type_name();

        let mut out = Map::new();
        out.insert("host", sd.host().host.as_str());
        out.insert("port", i64::from(sd.host().port));
        out.insert("type", i64::from(sd.server_type().code()));
        out.insert("is_primary", type_name == ServerType::RsPrimary.name());
        out.insert("is_secondary", type_name == ServerType::RsSecondary.name());
        out.insert("is_arbiter", type_name == ServerType::RsArbiter.name());
        out.insert("is_hidden", flag(hello, "hidden"));
        out.insert("is_passive", flag(hello, "passive"));
        if let Some(tags) = self.decode_tags(hello)? {
            out.insert("tags", tags);
        }
        out.insert("last_hello_response", self.effective_hello_response(&sd)?);
        out.insert(
            "round_trip_time",
            sd.round_trip_time().map_or(Value::Null, Value::Int),
        );
        Ok(Value::Map(out))
    }

    // -- comparison --

    /// Orders handles by their `host:port`, compared case-insensitively.
    ///
    /// # Errors
    ///
    /// `Runtime` when either node is no longer part of the topology.
    pub fn try_cmp(&self, other: &Server<'_>) -> Result<Ordering> {
        let (Ok(ours), Ok(theirs)) = (self.server_description(), other.server_description())
        else {
            return Err(Error::runtime("Failed to get server description(s)"));
        };
        Ok(cmp_ignore_ascii_case(
            &ours.host_and_port(),
            &theirs.host_and_port(),
        ))
    }

    /// # Errors
    ///
    /// See [`Server::try_cmp`].
    pub fn try_eq(&self, other: &Server<'_>) -> Result<bool> {
        Ok(self.try_cmp(other)? == Ordering::Equal)
    }
}

/// Case-insensitive key lookup plus truthiness; an absent key is `false`.
fn flag(hello: &RawDocument, key: &str) -> bool {
    find_case_insensitive(hello, key).is_some_and(as_bool)
}

fn cmp_ignore_ascii_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn ordering_ignores_ascii_case(a in "[a-zA-Z0-9.:]{0,16}", b in "[a-zA-Z0-9.:]{0,16}") {
            let expected = a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase());
            prop_assert_eq!(cmp_ignore_ascii_case(&a, &b), expected);
            prop_assert_eq!(cmp_ignore_ascii_case(&b, &a), expected.reverse());
            prop_assert_eq!(cmp_ignore_ascii_case(&a, &a.to_ascii_uppercase()), Ordering::Equal);
        }
    }

    #[test]
    fn ascii_case_insensitive_ordering() {
        assert_eq!(cmp_ignore_ascii_case("a:27017", "A:27017"), Ordering::Equal);
        assert_eq!(cmp_ignore_ascii_case("a:1", "B:1"), Ordering::Less);
        assert_eq!(cmp_ignore_ascii_case("db2:1", "DB1:1"), Ordering::Greater);
    }

    #[test]
    fn flag_lookup() {
        let hello = bson::rawdoc! { "Hidden": 1, "passive": false };
        assert!(flag(&hello, "hidden"));
        assert!(!flag(&hello, "passive"));
        assert!(!flag(&hello, "arbiterOnly"));
    }
}
