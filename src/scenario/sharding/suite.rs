use std::sync::Arc;

use async_trait::async_trait;
use bson::doc;
use tracing::info;
use tracing::warn;

use super::ShardingController;
use super::SHARD_COLLECTION;
use crate::convergence::ConvergenceVerifier;
use crate::convergence::RecoveryPredicate;
use crate::scenario::crud::CrudScenarioRunner;
use crate::scenario::crud::Fixture;
use crate::scenario::crud::Lookup;
use crate::scenario::report::with_teardown;
use crate::scenario::report::SuiteReport;
use crate::scenario::users;
use crate::scenario::ScenarioContext;
use crate::scenario::Suite;
use crate::ClusterHandle;
use crate::ClusterRole;
use crate::Credentials;
use crate::Namespace;
use crate::Result;
use crate::VerificationError;

const BULK_PREFIX: &str = "some-item-shard";

/// Members a replica set needs before losing its primary is survivable
const MIN_FAILOVER_MEMBERS: usize = 3;

/// Scenarios against a sharded deployment, driven through its routers
#[derive(Debug, Default)]
pub struct ShardingSuite;

/// Sharded database, collection and user owned by one scenario
struct ShardScope {
    root: Arc<dyn ClusterHandle>,
    namespace: Namespace,
    user: Credentials,
}

impl ShardScope {
    async fn open(ctx: &ScenarioContext) -> Result<Self> {
        let root = ctx.connect(&ctx.endpoint(ClusterRole::Router, true)).await?;
        let database = ctx.unique_name("ShardTestDatabase");
        let namespace = Namespace::new(&database, SHARD_COLLECTION);

        let setup = async {
            let controller = ShardingController::new(root.clone());
            controller.enable_sharding(&database).await?;
            controller
                .shard_collection(&namespace, ShardingController::hashed_id_key())
                .await?;
            users::upsert_user(
                root.as_ref(),
                &database,
                &ctx.unique_name("TestUsername"),
                &ctx.unique_name("TestPassword"),
                &users::SCENARIO_ROLES,
            )
            .await
        };

        match setup.await {
            Ok(user) => Ok(Self { root, namespace, user }),
            Err(e) => {
                if let Err(cleanup) = root.drop_database(&database).await {
                    warn!(%database, "cleanup after failed setup: {}", cleanup);
                }
                root.close().await;
                Err(e)
            }
        }
    }

    fn controller(&self) -> ShardingController {
        ShardingController::new(self.root.clone())
    }

    async fn login(
        &self,
        ctx: &ScenarioContext,
    ) -> Result<Arc<dyn ClusterHandle>> {
        users::login(
            ctx.connector().as_ref(),
            &ctx.endpoint(ClusterRole::Router, true),
            &self.user,
        )
        .await
    }

    /// Removes the user and the database, checks the user is gone, then
    /// closes the root handle
    async fn teardown(&self) -> Result<()> {
        let result = async {
            let database = &self.namespace.database;
            users::remove_user(self.root.as_ref(), database, &self.user.username).await?;
            CrudScenarioRunner::new(self.root.clone(), self.namespace.clone())
                .teardown()
                .await?;
            users::ensure_removed(self.root.as_ref(), database, &self.user.username).await
        }
        .await;
        self.root.close().await;
        result
    }

    /// Tears the scope down and folds the outcome into `result`
    async fn finish(
        self,
        result: Result<()>,
    ) -> Result<()> {
        with_teardown(async { result }, self.teardown()).await
    }
}

impl ShardingSuite {
    async fn login_as_user(ctx: &ScenarioContext) -> Result<()> {
        let scope = ShardScope::open(ctx).await?;
        let result = match scope.login(ctx).await {
            Ok(handle) => {
                users::logout(handle).await;
                Ok(())
            }
            Err(e) => Err(e),
        };
        scope.finish(result).await
    }

    async fn crud_through_router(ctx: &ScenarioContext) -> Result<()> {
        let scope = ShardScope::open(ctx).await?;
        let result = async {
            let handle = scope.login(ctx).await?;
            let crud = CrudScenarioRunner::new(handle.clone(), scope.namespace.clone());
            let fixture = Fixture::new("some-item");
            let result = with_teardown(
                crud.run_full_cycle(&fixture, Lookup::ById, "New-Item"),
                crud.drop_collection(),
            )
            .await;
            users::logout(handle).await;
            result
        }
        .await;
        scope.finish(result).await
    }

    async fn distribution(ctx: &ScenarioContext) -> Result<()> {
        let scope = ShardScope::open(ctx).await?;
        let result = async {
            let handle = scope.login(ctx).await?;
            let controller = scope.controller();
            let result = async {
                let total = controller
                    .bulk_insert(
                        handle.as_ref(),
                        &scope.namespace,
                        BULK_PREFIX,
                        ctx.config().shard_bulk_documents,
                    )
                    .await?;

                let shard = ctx.connect(&ctx.endpoint(ClusterRole::Cluster, true)).await?;
                let local = controller
                    .verify_distribution(shard.as_ref(), &scope.namespace, total)
                    .await;
                shard.close().await;
                local.map(|_| ())
            }
            .await;
            users::logout(handle).await;
            result
        }
        .await;
        scope.finish(result).await
    }

    /// Kills the primary of `role`'s replica set and checks the router still
    /// reports every document once the set has recovered
    async fn primary_loss(
        ctx: &ScenarioContext,
        role: ClusterRole,
    ) -> Result<()> {
        let scope = ShardScope::open(ctx).await?;
        let result = async {
            let handle = scope.login(ctx).await?;
            let result = Self::survive_primary_loss(ctx, role, &scope, handle.as_ref()).await;
            users::logout(handle).await;
            result
        }
        .await;
        scope.finish(result).await
    }

    async fn survive_primary_loss(
        ctx: &ScenarioContext,
        role: ClusterRole,
        scope: &ShardScope,
        user: &dyn ClusterHandle,
    ) -> Result<()> {
        let before = scope
            .controller()
            .bulk_insert(
                user,
                &scope.namespace,
                BULK_PREFIX,
                ctx.config().shard_bulk_documents,
            )
            .await?;

        let endpoint = ctx.endpoint(role, true);
        let set = ctx.connect(&endpoint).await?;
        let mut verifier = ConvergenceVerifier::new(
            set.clone(),
            ctx.connector().clone(),
            endpoint.clone(),
            endpoint.addresses().len(),
            ctx.timeouts(),
        )
        .with_force_shutdown(ctx.config().force_shutdown);

        let recovery = async {
            verifier.establish_baseline(None).await?;
            verifier.inject_failure().await?;
            verifier
                .await_convergence(RecoveryPredicate::NewPrimaryElected)
                .await?;
            verifier
                .await_convergence(RecoveryPredicate::FullMembershipRestored)
                .await?;
            verifier.verify_rejoined()
        }
        .await;
        set.close().await;
        recovery?;

        let after = user.count(&scope.namespace, doc! {}).await?;
        info!(%role, before, after, "router count after primary loss");
        if after != before {
            return Err(VerificationError::new(
                format!("router reports every document after {role} primary loss"),
                before,
                after,
            )
            .into());
        }
        Ok(())
    }

    async fn shard_count(ctx: &ScenarioContext) -> Result<usize> {
        let router = ctx.connect(&ctx.endpoint(ClusterRole::Router, true)).await?;
        let shards = ShardingController::new(router.clone()).shard_count().await;
        router.close().await;
        shards
    }
}

#[async_trait]
impl Suite for ShardingSuite {
    fn name(&self) -> &'static str {
        "sharding"
    }

    async fn run(
        &self,
        ctx: &ScenarioContext,
    ) -> SuiteReport {
        let mut report = SuiteReport::new(self.name());

        if !ctx.config().has_role(ClusterRole::Router) {
            report.skip("sharding", "no mongos routers configured");
            return report;
        }

        report
            .run("login as scenario user through the router", Self::login_as_user(ctx))
            .await;
        report
            .run("CRUD through the router", Self::crud_through_router(ctx))
            .await;

        let distribution = "documents are spread over the shards";
        match Self::shard_count(ctx).await {
            Err(e) => {
                warn!("unable to list shards: {}", e);
                report.run(distribution, async move { Err(e) }).await;
            }
            Ok(shards) if shards < 2 => {
                report.skip(distribution, format!("needs at least 2 shards, found {shards}"));
            }
            Ok(_) if !ctx.config().has_role(ClusterRole::Cluster) => {
                report.skip(distribution, "shard 0 members are not configured");
            }
            Ok(_) => report.run(distribution, Self::distribution(ctx)).await,
        }

        for (role, name) in [
            (ClusterRole::Cluster, "shard primary loss keeps every document"),
            (
                ClusterRole::ConfigServer,
                "config server primary loss keeps every document",
            ),
        ] {
            let members = ctx.config().addresses(role).len();
            if members < MIN_FAILOVER_MEMBERS {
                report.skip(
                    name,
                    format!("needs {MIN_FAILOVER_MEMBERS} {role} members, {members} configured"),
                );
                continue;
            }
            report.run(name, Self::primary_loss(ctx, role)).await;
        }

        report
    }
}
