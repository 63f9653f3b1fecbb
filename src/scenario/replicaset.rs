//! Replica set suite
//!
//! Topology shape checks, reads served by a secondary, and the primary
//! shutdown chain: election, rejoin, demotion of the old primary.

use async_trait::async_trait;
use tracing::info;
use tracing::warn;

use super::crud::CrudScenarioRunner;
use super::crud::Fixture;
use super::report::with_teardown;
use super::report::SuiteReport;
use super::ScenarioContext;
use super::Suite;
use crate::convergence::poll_until;
use crate::convergence::ConvergenceVerifier;
use crate::convergence::PollPolicy;
use crate::convergence::PollStatus;
use crate::convergence::RecoveryPredicate;
use crate::topology::probe;
use crate::topology::TopologyKind;
use crate::topology::TopologySnapshot;
use crate::ClusterHandle;
use crate::ClusterRole;
use crate::ConsistencyMode;
use crate::ConvergenceError;
use crate::Namespace;
use crate::Result;
use crate::VerificationError;

const COLLECTION: &str = "TestCollection";
const FIXTURE_NAME: &str = "some-item";

#[derive(Debug, Default)]
pub struct ReplicaSetSuite;

impl ReplicaSetSuite {
    /// One configured member: the node must look exactly like what the
    /// replication flag declares
    async fn single_node_shape(ctx: &ScenarioContext) -> Result<()> {
        let handle = ctx.connect(&ctx.endpoint(ClusterRole::Cluster, true)).await?;
        let snapshot = probe(handle.as_ref()).await;
        handle.close().await;
        check_single_node(ctx, snapshot?)
    }

    async fn read_on_secondary(ctx: &ScenarioContext) -> Result<()> {
        let handle = ctx.connect(&ctx.endpoint(ClusterRole::Cluster, true)).await?;
        let crud = CrudScenarioRunner::new(handle.clone(), namespace(ctx));
        let fixture = Fixture::new(FIXTURE_NAME);

        let body = async {
            crud.insert_and_verify(&fixture).await?;

            let read = match handle.set_consistency_mode(ConsistencyMode::Secondary, true) {
                Ok(()) => read_fixture_from_secondary(ctx, handle.as_ref(), &crud, &fixture).await,
                Err(e) => Err(e),
            };
            handle.set_consistency_mode(ConsistencyMode::Strong, true)?;
            read
        };

        let result = with_teardown(body, crud.teardown()).await;
        handle.close().await;
        result
    }

    async fn primary_shutdown(ctx: &ScenarioContext) -> Result<()> {
        let endpoint = ctx.endpoint(ClusterRole::Cluster, true);
        let handle = ctx.connect(&endpoint).await?;
        let crud = CrudScenarioRunner::new(handle.clone(), namespace(ctx));
        let fixture = Fixture::new(FIXTURE_NAME);

        let mut verifier = ConvergenceVerifier::new(
            handle.clone(),
            ctx.connector().clone(),
            endpoint.clone(),
            ctx.config().node_count(),
            ctx.timeouts(),
        )
        .with_force_shutdown(ctx.config().force_shutdown);

        let body = async {
            let durability = Some((&crud, &fixture));
            verifier.establish_baseline(durability).await?;
            verifier.inject_failure().await?;

            verifier
                .await_convergence(RecoveryPredicate::NewPrimaryElected)
                .await?;
            let new_primary = verifier.verify_new_primary(durability).await?;
            info!(%new_primary, "fixture survived the election");

            verifier
                .await_convergence(RecoveryPredicate::FullMembershipRestored)
                .await?;
            verifier.verify_rejoined()?;

            let demoted = verifier.verify_old_primary_demoted(durability).await?;
            info!(%demoted, "old primary rejoined as a secondary");
            Ok(())
        };

        let result = with_teardown(body, crud.teardown()).await;
        handle.close().await;
        result
    }
}

fn namespace(ctx: &ScenarioContext) -> Namespace {
    Namespace::new(ctx.unique_name("TestDatabase"), COLLECTION)
}

pub(crate) fn check_single_node(
    ctx: &ScenarioContext,
    snapshot: TopologySnapshot,
) -> Result<()> {
    let config = ctx.config();
    if config.replica_set_enabled() {
        let expected = config.replica_set_name(ClusterRole::Cluster);
        if snapshot.set_name != expected {
            return Err(VerificationError::new("replica set name", expected, snapshot.set_name.clone())
                .with_snapshot(Some(snapshot))
                .into());
        }
        return Ok(());
    }

    if snapshot.kind != TopologyKind::Standalone || !snapshot.ok {
        return Err(VerificationError::new(
            "node is a healthy standalone",
            "Standalone with ok",
            (snapshot.kind, snapshot.ok, snapshot.set_name.clone()),
        )
        .with_snapshot(Some(snapshot))
        .into());
    }
    Ok(())
}

/// Expects the routed handle to already be in [`ConsistencyMode::Secondary`]
async fn read_fixture_from_secondary(
    ctx: &ScenarioContext,
    handle: &dyn ClusterHandle,
    crud: &CrudScenarioRunner,
    fixture: &Fixture,
) -> Result<()> {
    let snapshot = probe(handle).await?;
    let answered_by_primary = snapshot.is_primary
        || snapshot.self_id.is_some() && snapshot.self_id == snapshot.primary_id;
    if answered_by_primary {
        return Err(VerificationError::new(
            "read is served by a secondary",
            "a non-primary member",
            snapshot.self_id.clone(),
        )
        .with_snapshot(Some(snapshot))
        .into());
    }

    let timeouts = ctx.timeouts();
    let policy = PollPolicy::new(timeouts.secondary_read_deadline, timeouts.poll_interval);
    let visible = poll_until(policy, |attempt| async move {
        match crud.count_matching(fixture.by_value()).await {
            Ok(0) => PollStatus::Pending(Some(0)),
            Ok(count) => PollStatus::Ready(count),
            Err(e) => {
                warn!(attempt, "secondary read failed while polling: {}", e);
                PollStatus::Pending(None)
            }
        }
    })
    .await;

    match visible {
        Ok(1) => Ok(()),
        Ok(count) => Err(VerificationError::new("fixture is replicated once", 1u64, count)
            .with_snapshot(Some(snapshot))
            .into()),
        Err(timeout) => Err(ConvergenceError::Timeout {
            predicate: "fixture-visible-on-secondary",
            waited: timeout.waited,
            last_snapshot: Some(snapshot),
        }
        .into()),
    }
}

#[async_trait]
impl Suite for ReplicaSetSuite {
    fn name(&self) -> &'static str {
        "replicaset"
    }

    async fn run(
        &self,
        ctx: &ScenarioContext,
    ) -> SuiteReport {
        let mut report = SuiteReport::new(self.name());
        let config = ctx.config();
        let nodes = config.node_count();

        match nodes {
            0 => {
                report.skip("replicaset", "no cluster members configured");
                return report;
            }
            1 => {
                report
                    .run("single node matches the replication flag", Self::single_node_shape(ctx))
                    .await;
                return report;
            }
            _ if !config.replica_set_enabled() => {
                let misconfigured = VerificationError::new(
                    "replication is enabled for a multi-node deployment",
                    true,
                    false,
                );
                report
                    .run("multi-node deployment is replicated", async move { Err(misconfigured.into()) })
                    .await;
                return report;
            }
            _ => {}
        }

        report
            .run("read on secondary", Self::read_on_secondary(ctx))
            .await;

        let shutdown = "primary shutdown elects, rejoins and demotes";
        if nodes < 3 {
            report.skip(shutdown, format!("needs 3 members, {nodes} configured"));
        } else {
            report.run(shutdown, Self::primary_shutdown(ctx)).await;
        }

        report
    }
}
