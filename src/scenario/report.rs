use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::topology::TopologySnapshot;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioOutcome {
    Passed,
    Failed {
        reason: String,
        snapshot: Option<TopologySnapshot>,
    },
    /// Precondition not met by the configured topology
    Skipped { reason: String },
}

impl ScenarioOutcome {
    pub fn failed(err: &Error) -> Self {
        ScenarioOutcome::Failed {
            reason: err.to_string(),
            snapshot: err.last_snapshot().cloned(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        ScenarioOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ScenarioOutcome::Failed { .. })
    }
}

impl From<Result<()>> for ScenarioOutcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => ScenarioOutcome::Passed,
            Err(e) => ScenarioOutcome::failed(&e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub suite: &'static str,
    pub name: String,
    pub outcome: ScenarioOutcome,
    pub elapsed: Duration,
}

impl fmt::Display for ScenarioReport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let elapsed = self.elapsed.as_secs_f64();
        match &self.outcome {
            ScenarioOutcome::Passed => {
                write!(f, "PASS {}: {} ({:.1}s)", self.suite, self.name, elapsed)
            }
            ScenarioOutcome::Failed { reason, snapshot } => {
                write!(f, "FAIL {}: {} ({:.1}s): {}", self.suite, self.name, elapsed, reason)?;
                if let Some(snapshot) = snapshot {
                    write!(f, "; last snapshot: {snapshot}")?;
                }
                Ok(())
            }
            ScenarioOutcome::Skipped { reason } => {
                write!(f, "SKIP {}: {}: {}", self.suite, self.name, reason)
            }
        }
    }
}

/// Outcomes of one suite run, in execution order
#[derive(Debug, Clone)]
pub struct SuiteReport {
    suite: &'static str,
    scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn new(suite: &'static str) -> Self {
        Self {
            suite,
            scenarios: vec![],
        }
    }

    pub fn suite(&self) -> &'static str {
        self.suite
    }

    pub fn scenarios(&self) -> &[ScenarioReport] {
        &self.scenarios
    }

    pub fn record(
        &mut self,
        name: impl Into<String>,
        outcome: ScenarioOutcome,
        elapsed: Duration,
    ) {
        let report = ScenarioReport {
            suite: self.suite,
            name: name.into(),
            outcome,
            elapsed,
        };
        match &report.outcome {
            ScenarioOutcome::Passed => info!("{}", report),
            ScenarioOutcome::Failed { .. } => error!("{}", report),
            ScenarioOutcome::Skipped { .. } => warn!("{}", report),
        }
        self.scenarios.push(report);
    }

    pub fn skip(
        &mut self,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.record(name, ScenarioOutcome::skipped(reason), Duration::ZERO);
    }

    /// Runs one scenario body and records its outcome
    pub async fn run<F>(
        &mut self,
        name: impl Into<String>,
        scenario: F,
    ) where
        F: Future<Output = Result<()>>,
    {
        let name = name.into();
        info!(suite = self.suite, scenario = %name, "scenario started");
        let start = Instant::now();
        let outcome = ScenarioOutcome::from(scenario.await);
        self.record(name, outcome, start.elapsed());
    }

    pub fn merge(
        &mut self,
        other: SuiteReport,
    ) {
        self.scenarios.extend(other.scenarios);
    }

    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(ScenarioOutcome::is_failure)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ScenarioOutcome::Skipped { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn count(
        &self,
        predicate: impl Fn(&ScenarioOutcome) -> bool,
    ) -> usize {
        self.scenarios
            .iter()
            .filter(|s| predicate(&s.outcome))
            .count()
    }
}

/// Runs `body`, then `teardown` whatever happened.
///
/// The body's failure wins; a teardown failure after a passing body fails
/// the scenario.
pub async fn with_teardown<B, T>(
    body: B,
    teardown: T,
) -> Result<()>
where
    B: Future<Output = Result<()>>,
    T: Future<Output = Result<()>>,
{
    let result = body.await;
    let cleanup = teardown.await;
    match (result, cleanup) {
        (Err(e), Err(cleanup)) => {
            warn!("teardown failed after scenario failure: {}", cleanup);
            Err(e)
        }
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}
