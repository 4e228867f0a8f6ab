mod common;

use bson::doc;
use common::{description, Fixture, PARENT_PID};
use nodelink_core::{Command, Value};
use nodelink_driver::ServerType;

fn ping() -> Command {
    Command::new(&Value::Map([("ping", 1)].into_iter().collect()), None).unwrap()
}

fn fixture() -> Fixture {
    let fx = Fixture::new();
    fx.topology
        .upsert(description(1, "db1", 27017, ServerType::Standalone));
    fx.topology
        .upsert(description(2, "db2", 27017, ServerType::Standalone));
    fx
}

#[test]
fn same_process_never_resets() {
    let fx = fixture();
    let server = fx.manager.server(1);

    server.execute_command("admin", &ping(), None).unwrap();
    server.execute_command("admin", &ping(), None).unwrap();

    assert_eq!(fx.topology.client_resets(), 0);
    assert_eq!(fx.topology.pool_clears(), 0);
    assert_eq!(server.created_by_pid(), PARENT_PID);
}

#[test]
fn fork_resets_once_and_updates_marker() {
    let fx = fixture();
    fx.topology.pool_session();
    let server = fx.manager.server(1);

    fx.pids.fork_to(PARENT_PID + 1);
    server.execute_command("admin", &ping(), None).unwrap();
    server.execute_command("admin", &ping(), None).unwrap();

    assert_eq!(fx.topology.client_resets(), 1);
    assert_eq!(fx.topology.pool_clears(), 1);
    assert_eq!(fx.topology.pooled_sessions(), 0);
    assert_eq!(server.created_by_pid(), PARENT_PID + 1);
    assert_eq!(fx.manager.client_pid(), PARENT_PID + 1);
}

#[test]
fn handles_from_before_the_fork_share_one_reset() {
    let fx = fixture();
    let first = fx.manager.server(1);
    let second = fx.manager.server(2);

    fx.pids.fork_to(9000);
    first.execute_command("admin", &ping(), None).unwrap();
    second.execute_read_command("admin", &ping(), None).unwrap();

    assert_eq!(fx.topology.client_resets(), 1);
    assert_eq!(second.created_by_pid(), 9000);
}

#[test]
fn every_fork_generation_resets_again() {
    let fx = fixture();
    let server = fx.manager.server(1);

    fx.pids.fork_to(10);
    server.execute_command("admin", &ping(), None).unwrap();
    fx.pids.fork_to(11);
    server.execute_command("admin", &ping(), None).unwrap();

    assert_eq!(fx.topology.client_resets(), 2);
}

#[test]
fn guard_runs_before_validation_failures() {
    let fx = fixture();
    let server = fx.manager.server(1);
    let mut empty = nodelink_core::BulkWrite::new(nodelink_core::BulkWriteOptions::default());

    fx.pids.fork_to(77);
    assert!(server.execute_bulk_write("db.coll", &mut empty, None).is_err());
    assert_eq!(fx.topology.client_resets(), 1);
    assert!(fx.executor.calls().is_empty());
}

#[test]
fn describing_a_node_does_not_reset() {
    let fx = fixture();
    let server = fx.manager.server(1);

    fx.pids.fork_to(55);
    server.host().unwrap();
    server.to_document().unwrap();
    assert_eq!(fx.topology.client_resets(), 0);

    fx.executor.reply_with(doc! { "ok": 1 });
    server.execute_query(
        "db.coll",
        &nodelink_core::Query::new(&Value::Map(nodelink_core::Map::new()), &Default::default())
            .unwrap(),
        None,
    )
    .unwrap();
    assert_eq!(fx.topology.client_resets(), 1);
}

#[test]
fn handle_created_in_child_resets_inherited_client() {
    let fx = fixture();
    fx.topology.pool_session();
    fx.manager
        .server(1)
        .execute_command("admin", &ping(), None)
        .unwrap();

    fx.pids.fork_to(PARENT_PID + 1);
    let child = fx.manager.server(1);
    assert_eq!(child.created_by_pid(), PARENT_PID + 1);
    child.execute_command("admin", &ping(), None).unwrap();
    child.execute_command("admin", &ping(), None).unwrap();

    assert_eq!(fx.topology.client_resets(), 1);
    assert_eq!(fx.topology.pooled_sessions(), 0);
    assert_eq!(fx.manager.client_pid(), PARENT_PID + 1);
}
