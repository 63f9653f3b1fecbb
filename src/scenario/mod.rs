//! Acceptance suites
//!
//! A [`Suite`] runs its scenarios one after another against the deployment
//! described by a [`ScenarioContext`] and returns a [`SuiteReport`]. A
//! scenario failure is recorded, never propagated: the next scenario still
//! runs.

pub mod crud;
pub mod readwrite;
pub mod replicaset;
pub mod report;
pub mod sharding;
pub mod users;

mod context;
pub use context::*;

#[cfg(test)]
mod replicaset_test;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tracing::info;

use self::readwrite::ReadWriteSuite;
use self::replicaset::ReplicaSetSuite;
use self::report::SuiteReport;
use self::sharding::ShardingSuite;

#[async_trait]
pub trait Suite: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        ctx: &ScenarioContext,
    ) -> SuiteReport;
}

/// Suite selection accepted by the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuiteKind {
    ReadWrite,
    ReplicaSet,
    Sharding,
    #[default]
    All,
}

impl SuiteKind {
    pub fn suites(self) -> Vec<Box<dyn Suite>> {
        match self {
            SuiteKind::ReadWrite => vec![Box::new(ReadWriteSuite)],
            SuiteKind::ReplicaSet => vec![Box::new(ReplicaSetSuite)],
            SuiteKind::Sharding => vec![Box::new(ShardingSuite)],
            SuiteKind::All => vec![
                Box::new(ReadWriteSuite),
                Box::new(ReplicaSetSuite),
                Box::new(ShardingSuite),
            ],
        }
    }
}

impl fmt::Display for SuiteKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            SuiteKind::ReadWrite => "readwrite",
            SuiteKind::ReplicaSet => "replicaset",
            SuiteKind::Sharding => "sharding",
            SuiteKind::All => "all",
        };
        f.write_str(name)
    }
}

impl FromStr for SuiteKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "readwrite" => Ok(SuiteKind::ReadWrite),
            "replicaset" => Ok(SuiteKind::ReplicaSet),
            "sharding" => Ok(SuiteKind::Sharding),
            "all" => Ok(SuiteKind::All),
            other => Err(format!(
                "unknown suite {other:?}, expected readwrite, replicaset, sharding or all"
            )),
        }
    }
}

/// Runs the selected suites in order and merges their reports
pub async fn run_suites(
    kind: SuiteKind,
    ctx: &ScenarioContext,
) -> SuiteReport {
    let mut summary = SuiteReport::new("all");
    for suite in kind.suites() {
        info!(suite = suite.name(), "suite started");
        let report = suite.run(ctx).await;
        info!(
            suite = suite.name(),
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "suite finished"
        );
        summary.merge(report);
    }
    summary
}
