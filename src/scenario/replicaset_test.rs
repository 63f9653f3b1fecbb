use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::sync::Arc;

use bson::doc;
use bson::Document;
use parking_lot::Mutex;
use tracing_test::traced_test;

use super::replicaset::check_single_node;
use super::replicaset::ReplicaSetSuite;
use super::report::ScenarioOutcome;
use super::ScenarioContext;
use super::Suite;
use crate::topology::TopologyKind;
use crate::topology::TopologySnapshot;
use crate::AcceptanceConfig;
use crate::ClusterHandle;
use crate::CommandError;
use crate::ConsistencyMode;
use crate::Error;
use crate::Flag;
use crate::MockClusterHandle;
use crate::MockConnector;
use crate::Port;

fn config(
    nodes: usize,
    replicated: bool,
) -> AcceptanceConfig {
    AcceptanceConfig {
        mongo_hosts: (0..nodes).map(|i| format!("db-{i}")).collect(),
        mongo_ports: vec![Port(27017); nodes],
        mongo_replica_set_name: "rs0".into(),
        mongo_replica_set_enable: Flag(replicated),
        mongo_root_username: "root".into(),
        mongo_root_password: "secret".into(),
        ..Default::default()
    }
}

fn context(config: AcceptanceConfig) -> ScenarioContext {
    ScenarioContext::new(config, Arc::new(MockConnector::new()))
}

fn snapshot(
    kind: TopologyKind,
    set_name: Option<&str>,
) -> TopologySnapshot {
    TopologySnapshot {
        is_primary: true,
        primary_id: None,
        self_id: None,
        set_name: set_name.map(str::to_string),
        ok: true,
        kind,
    }
}

#[test]
fn single_replicated_node_reports_the_configured_set() {
    let ctx = context(config(1, true));

    check_single_node(&ctx, snapshot(TopologyKind::ReplicaSetMember, Some("rs0"))).unwrap();

    let err = check_single_node(&ctx, snapshot(TopologyKind::ReplicaSetMember, Some("other"))).unwrap_err();
    assert!(matches!(err, Error::Verification(ref v) if v.snapshot.is_some()));
    assert!(check_single_node(&ctx, snapshot(TopologyKind::Standalone, None)).is_err());
}

#[test]
fn single_unreplicated_node_is_a_standalone() {
    let ctx = context(config(1, false));

    check_single_node(&ctx, snapshot(TopologyKind::Standalone, None)).unwrap();
    assert!(check_single_node(&ctx, snapshot(TopologyKind::ReplicaSetMember, Some("rs0"))).is_err());

    let mut unhealthy = snapshot(TopologyKind::Standalone, None);
    unhealthy.ok = false;
    assert!(check_single_node(&ctx, unhealthy).is_err());
}

#[tokio::test]
#[traced_test]
async fn skips_without_members() {
    let report = ReplicaSetSuite.run(&context(config(0, true))).await;
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.failed(), 0);
}

#[tokio::test]
#[traced_test]
async fn multi_node_without_replication_is_a_failure() {
    let report = ReplicaSetSuite.run(&context(config(3, false))).await;

    assert_eq!(report.scenarios().len(), 1);
    match &report.scenarios()[0].outcome {
        ScenarioOutcome::Failed { reason, .. } => assert!(reason.contains("replication is enabled")),
        other => panic!("unexpected {other:?}"),
    }
}

/// Two members: the secondary read runs, the shutdown chain is skipped
#[tokio::test(start_paused = true)]
#[traced_test]
async fn fixture_becomes_visible_on_a_secondary() {
    let modes = Arc::new(Mutex::new(vec![]));
    let recorded = modes.clone();
    let mut counts: VecDeque<u64> = vec![1, 0, 0, 1, 0].into();

    let mut handle = MockClusterHandle::new();
    handle.expect_insert_one().times(1).returning(|_, _| Ok(()));
    handle
        .expect_count()
        .times(5)
        .returning(move |_, _| Ok(counts.pop_front().unwrap_or(0)));
    handle.expect_run_command().returning(|_, _| {
        Ok(doc! {
            "ismaster": false,
            "secondary": true,
            "setName": "rs0",
            "primary": "db-0:27017",
            "me": "db-1:27017",
            "hosts": ["db-0:27017", "db-1:27017"],
            "ok": 1.0,
        })
    });
    handle
        .expect_set_consistency_mode()
        .returning(move |mode, _| {
            recorded.lock().push(mode);
            Ok(())
        });
    handle
        .expect_consistency_mode()
        .return_const(ConsistencyMode::Secondary);
    handle.expect_drop_database().times(1).returning(|_| Ok(()));
    handle.expect_close().times(1).return_const(());

    let mut handle = Some(handle);
    let mut connector = MockConnector::new();
    connector
        .expect_connect()
        .withf(|endpoint| endpoint.replica_set() == Some("rs0") && endpoint.addresses().len() == 2)
        .times(1)
        .returning(move |_| Ok(Arc::new(handle.take().unwrap_or_default()) as Arc<dyn ClusterHandle>));

    let ctx = ScenarioContext::new(config(2, true), Arc::new(connector));
    let report = ReplicaSetSuite.run(&ctx).await;

    assert_eq!(report.passed(), 1, "{:?}", report.scenarios());
    assert_eq!(report.skipped(), 1);
    assert_eq!(
        *modes.lock(),
        vec![ConsistencyMode::Secondary, ConsistencyMode::Strong]
    );

    let shutdown = &report.scenarios()[1];
    assert_eq!(shutdown.name, "primary shutdown elects, rejoins and demotes");
    assert_eq!(
        shutdown.outcome,
        ScenarioOutcome::Skipped {
            reason: "needs 3 members, 2 configured".into()
        }
    );
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn read_answered_by_the_primary_fails() {
    let mut handle = MockClusterHandle::new();
    handle.expect_insert_one().returning(|_, _| Ok(()));
    handle.expect_count().returning(|_, filter| Ok(if filter.is_empty() { 0 } else { 1 }));
    handle.expect_run_command().returning(|_, _| {
        Ok(doc! {
            "ismaster": true,
            "setName": "rs0",
            "primary": "db-0:27017",
            "me": "db-0:27017",
            "ok": 1.0,
        })
    });
    handle.expect_set_consistency_mode().returning(|_, _| Ok(()));
    handle
        .expect_consistency_mode()
        .return_const(ConsistencyMode::Secondary);
    handle.expect_drop_database().returning(|_| Ok(()));
    handle.expect_close().return_const(());

    let mut handle = Some(handle);
    let mut connector = MockConnector::new();
    connector
        .expect_connect()
        .returning(move |_| Ok(Arc::new(handle.take().unwrap_or_default()) as Arc<dyn ClusterHandle>));

    let ctx = ScenarioContext::new(config(2, true), Arc::new(connector));
    let report = ReplicaSetSuite.run(&ctx).await;

    match &report.scenarios()[0].outcome {
        ScenarioOutcome::Failed { reason, snapshot } => {
            assert!(reason.contains("read is served by a secondary"));
            assert!(snapshot.as_ref().is_some_and(|s| s.is_primary));
        }
        other => panic!("unexpected {other:?}"),
    }
}

const DB0: &str = "db-0:27017";
const DB1: &str = "db-1:27017";
const DB2: &str = "db-2:27017";

fn member_reply(
    me: &str,
    primary: &str,
) -> Document {
    doc! {
        "ismaster": me == primary,
        "secondary": me != primary,
        "setName": "rs0",
        "primary": primary,
        "me": me,
        "hosts": [DB0, DB1, DB2],
        "ok": 1.0,
    }
}

/// Member handle whose successive `isMaster` replies come from `replies`,
/// the last one repeating. Counts find the fixture once and nothing else.
fn member(replies: Vec<Document>) -> MockClusterHandle {
    let mut replies: VecDeque<Document> = replies.into();
    let mut handle = MockClusterHandle::new();
    handle.expect_run_command().returning(move |_, _| {
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        Ok(reply.unwrap_or_default())
    });
    handle.expect_insert_one().returning(|_, _| Ok(()));
    handle
        .expect_count()
        .returning(|_, filter| Ok(if filter.is_empty() { 0 } else { 1 }));
    handle
        .expect_list_live_members()
        .returning(|| Ok([DB0, DB1, DB2].iter().map(|m| m.to_string()).collect::<BTreeSet<_>>()));
    handle.expect_set_consistency_mode().returning(|_, _| Ok(()));
    handle
        .expect_consistency_mode()
        .return_const(ConsistencyMode::Strong);
    handle.expect_drop_database().returning(|_| Ok(()));
    handle.expect_close().return_const(());
    handle
}

fn dying_member() -> MockClusterHandle {
    let mut handle = MockClusterHandle::new();
    handle
        .expect_run_command()
        .withf(|db, command| db.to_string() == "admin" && command.contains_key("shutdown"))
        .times(1)
        .returning(|_, _| {
            Err(CommandError::ConnectionTerminated {
                command: "shutdown".into(),
                address: DB0.into(),
            }
            .into())
        });
    handle.expect_close().return_const(());
    handle
}

/// Routed connects get `routed` in order, direct connects to the old
/// primary get `direct` in order
fn failover_connector(
    routed: Vec<MockClusterHandle>,
    direct: Vec<MockClusterHandle>,
) -> MockConnector {
    let mut routed: VecDeque<MockClusterHandle> = routed.into();
    let mut direct: VecDeque<MockClusterHandle> = direct.into();
    let (routed_count, direct_count) = (routed.len(), direct.len());

    let mut connector = MockConnector::new();
    connector
        .expect_connect()
        .withf(|endpoint| !endpoint.is_direct() && endpoint.replica_set() == Some("rs0"))
        .times(routed_count)
        .returning(move |_| Ok(Arc::new(routed.pop_front().unwrap_or_default()) as Arc<dyn ClusterHandle>));
    connector
        .expect_connect()
        .withf(|endpoint| endpoint.is_direct() && endpoint.addresses() == [DB0])
        .times(direct_count)
        .returning(move |_| Ok(Arc::new(direct.pop_front().unwrap_or_default()) as Arc<dyn ClusterHandle>));
    connector
}

/// Three members: db-0 is shut down, db-1 takes over and db-0 comes back
/// as a secondary holding the fixture
#[tokio::test(start_paused = true)]
#[traced_test]
async fn primary_shutdown_elects_rejoins_and_demotes() {
    let connector = failover_connector(
        vec![
            member(vec![member_reply(DB1, DB0)]),
            member(vec![member_reply(DB0, DB0), member_reply(DB1, DB1)]),
        ],
        vec![dying_member(), member(vec![member_reply(DB0, DB1)])],
    );
    let ctx = ScenarioContext::new(config(3, true), Arc::new(connector));

    let report = ReplicaSetSuite.run(&ctx).await;

    assert_eq!(report.passed(), 2, "{:?}", report.scenarios());
    assert_eq!(report.scenarios()[1].name, "primary shutdown elects, rejoins and demotes");
    assert!(logs_contain("new primary elected"));
    assert!(logs_contain("old primary rejoined as a secondary"));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn old_primary_still_primary_fails_the_shutdown_chain() {
    let connector = failover_connector(
        vec![
            member(vec![member_reply(DB1, DB0)]),
            member(vec![member_reply(DB0, DB0), member_reply(DB1, DB1)]),
        ],
        vec![dying_member(), member(vec![member_reply(DB0, DB0)])],
    );
    let ctx = ScenarioContext::new(config(3, true), Arc::new(connector));

    let report = ReplicaSetSuite.run(&ctx).await;

    assert_eq!(report.passed(), 1, "{:?}", report.scenarios());
    match &report.scenarios()[1].outcome {
        ScenarioOutcome::Failed { reason, snapshot } => {
            assert!(reason.contains("old primary is no longer primary"), "{reason}");
            assert!(snapshot.as_ref().is_some_and(|s| s.is_primary));
        }
        other => panic!("unexpected {other:?}"),
    }
}
