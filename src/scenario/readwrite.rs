//! Readwrite suite: one CRUD cycle against the standalone server, as a
//! temporary user on a throwaway database.

use async_trait::async_trait;
use tracing::warn;

use super::crud::CrudScenarioRunner;
use super::crud::Fixture;
use super::crud::Lookup;
use super::report::with_teardown;
use super::report::SuiteReport;
use super::users;
use super::ScenarioContext;
use super::Suite;
use crate::ClusterEndpoint;
use crate::Namespace;
use crate::Result;

const COLLECTION: &str = "TestCollection";

#[derive(Debug, Default)]
pub struct ReadWriteSuite;

impl ReadWriteSuite {
    async fn crud_cycle(
        ctx: &ScenarioContext,
        endpoint: ClusterEndpoint,
    ) -> Result<()> {
        let root = ctx.connect(&endpoint).await?;
        let namespace = Namespace::new(ctx.unique_name("TestDatabase"), COLLECTION);
        let database = namespace.database.clone();

        let user = match users::upsert_user(
            root.as_ref(),
            &database,
            &ctx.unique_name("TestUsername"),
            &ctx.unique_name("TestPassword"),
            &users::SCENARIO_ROLES,
        )
        .await
        {
            Ok(user) => user,
            Err(e) => {
                root.close().await;
                return Err(e);
            }
        };

        let body = async {
            let handle = users::login(ctx.connector().as_ref(), &endpoint, &user).await?;
            let crud = CrudScenarioRunner::new(handle.clone(), namespace.clone());
            let fixture = Fixture::new("some-item");
            let cycle = crud.run_full_cycle(&fixture, Lookup::ByValue, "New-Item").await;
            users::logout(handle).await;
            cycle
        };

        let teardown = async {
            users::remove_user(root.as_ref(), &database, &user.username).await?;
            CrudScenarioRunner::new(root.clone(), namespace.clone())
                .teardown()
                .await?;
            users::ensure_removed(root.as_ref(), &database, &user.username).await
        };

        let result = with_teardown(body, teardown).await;
        root.close().await;
        result
    }
}

#[async_trait]
impl Suite for ReadWriteSuite {
    fn name(&self) -> &'static str {
        "readwrite"
    }

    async fn run(
        &self,
        ctx: &ScenarioContext,
    ) -> SuiteReport {
        let mut report = SuiteReport::new(self.name());
        let scenario = "insert, find, update, find, delete, find";

        let Some(endpoint) = ctx.endpoints().standalone() else {
            warn!("readwrite suite needs host and port");
            report.skip(scenario, "no standalone host configured");
            return report;
        };

        report.run(scenario, Self::crud_cycle(ctx, endpoint)).await;
        report
    }
}
