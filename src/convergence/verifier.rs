use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::poll_until;
use super::FailoverContext;
use super::PollPolicy;
use super::PollStatus;
use super::RecoveryPredicate;
use super::VerifierState;
use crate::failure::FailureInjector;
use crate::failure::Termination;
use crate::scenario::crud::CrudScenarioRunner;
use crate::scenario::crud::Fixture;
use crate::topology::probe;
use crate::topology::TopologySnapshot;
use crate::utils::scoped_timer::ScopedTimer;
use crate::ClusterEndpoint;
use crate::ClusterHandle;
use crate::Connector;
use crate::ConsistencyMode;
use crate::ConvergenceError;
use crate::Error;
use crate::Result;
use crate::TimeoutPolicy;
use crate::VerificationError;

/// Fixture lookup used as the durability probe
pub type FixtureProbe<'a> = (&'a CrudScenarioRunner, &'a Fixture);

enum Recovery {
    NewPrimary {
        id: String,
        snapshot: TopologySnapshot,
    },
    Members(BTreeSet<String>),
}

type CheckStatus = PollStatus<Result<Recovery>, TopologySnapshot>;

pub struct ConvergenceVerifier {
    /// Routed handle on the replica set that loses its primary
    handle: Arc<dyn ClusterHandle>,
    connector: Arc<dyn Connector>,
    /// Source of credentials, TLS and timeouts for direct connections
    template: ClusterEndpoint,
    injector: FailureInjector,
    configured_nodes: usize,
    timeouts: TimeoutPolicy,
    relaxed_mode: ConsistencyMode,
    state: VerifierState,
    context: Option<FailoverContext>,
    last_snapshot: Option<TopologySnapshot>,
}

impl ConvergenceVerifier {
    pub fn new(
        handle: Arc<dyn ClusterHandle>,
        connector: Arc<dyn Connector>,
        template: ClusterEndpoint,
        configured_nodes: usize,
        timeouts: TimeoutPolicy,
    ) -> Self {
        let injector = FailureInjector::new(connector.clone(), template.clone());
        Self {
            handle,
            connector,
            template,
            injector,
            configured_nodes,
            timeouts,
            relaxed_mode: ConsistencyMode::SecondaryPreferred,
            state: VerifierState::Baseline,
            context: None,
            last_snapshot: None,
        }
    }

    /// Mode the handle polls in, `SecondaryPreferred` unless set.
    ///
    /// A set without primary cannot answer `Strong` reads, so that mode is
    /// ignored.
    pub fn with_relaxed_mode(
        mut self,
        mode: ConsistencyMode,
    ) -> Self {
        if mode.is_relaxed() {
            self.relaxed_mode = mode;
        } else {
            warn!(%mode, relaxed = %self.relaxed_mode, "polling mode must be relaxed, keeping default");
        }
        self
    }

    pub fn with_force_shutdown(
        mut self,
        force: bool,
    ) -> Self {
        self.injector = FailureInjector::new(self.connector.clone(), self.template.clone()).with_force(force);
        self
    }

    pub fn state(&self) -> VerifierState {
        self.state
    }

    pub fn context(&self) -> Option<&FailoverContext> {
        self.context.as_ref()
    }

    pub fn last_snapshot(&self) -> Option<&TopologySnapshot> {
        self.last_snapshot.as_ref()
    }

    fn transition(
        &mut self,
        next: VerifierState,
    ) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::Fatal(format!(
                "invalid verifier transition {:?} -> {:?}",
                self.state, next
            )));
        }
        info!(from = ?self.state, to = ?next, "verifier transition");
        self.state = next;
        Ok(())
    }

    fn expect_state(
        &self,
        expected: VerifierState,
    ) -> Result<()> {
        if self.state != expected {
            return Err(Error::Fatal(format!(
                "verifier is {:?}, expected {:?}",
                self.state, expected
            )));
        }
        Ok(())
    }

    fn context_ref(&self) -> Result<&FailoverContext> {
        self.context
            .as_ref()
            .ok_or_else(|| Error::Fatal("no failover context before baseline".to_string()))
    }

    fn context_mut(&mut self) -> Result<&mut FailoverContext> {
        self.context
            .as_mut()
            .ok_or_else(|| Error::Fatal("no failover context before baseline".to_string()))
    }

    fn failed(
        &self,
        err: VerificationError,
    ) -> Error {
        err.with_snapshot(self.last_snapshot.clone()).into()
    }

    fn attach_snapshot(
        &self,
        err: Error,
    ) -> Error {
        match err {
            Error::Verification(v) => self.failed(v),
            other => other,
        }
    }

    /// Records the current primary under strong reads and, when given,
    /// writes and reads back the durability fixture.
    pub async fn establish_baseline(
        &mut self,
        fixture: Option<FixtureProbe<'_>>,
    ) -> Result<TopologySnapshot> {
        self.expect_state(VerifierState::Baseline)?;
        if self.configured_nodes < 2 {
            return Err(VerificationError::new(
                "deployment can fail over",
                "at least 2 configured members",
                self.configured_nodes,
            )
            .into());
        }

        self.handle.set_consistency_mode(ConsistencyMode::Strong, false)?;
        let snapshot = probe(self.handle.as_ref()).await?;
        self.last_snapshot = Some(snapshot.clone());

        let old_primary = match (&snapshot.primary_id, snapshot.ok) {
            (Some(primary), true) => primary.clone(),
            _ => {
                return Err(self.failed(VerificationError::new(
                    "baseline reports a primary",
                    "ok with a primary",
                    (snapshot.ok, snapshot.primary_id.clone()),
                )))
            }
        };

        if let Some((crud, fixture)) = fixture {
            crud.insert_and_verify(fixture)
                .await
                .map_err(|e| self.attach_snapshot(e))?;
        }

        info!(%old_primary, configured = self.configured_nodes, "baseline established");
        self.context = Some(FailoverContext::new(old_primary, self.configured_nodes));
        self.transition(VerifierState::AwaitingFailure)?;
        Ok(snapshot)
    }

    /// Shuts the baseline primary down
    pub async fn inject_failure(&mut self) -> Result<Termination> {
        self.expect_state(VerifierState::AwaitingFailure)?;
        let target = self.context_ref()?.old_primary_id().to_string();

        let termination = self
            .injector
            .shutdown_node(&target, self.template.credentials())
            .await?;

        self.transition(VerifierState::Polling)?;
        Ok(termination)
    }

    /// Polls in the relaxed mode until `predicate` holds or its deadline
    /// passes, then restores strong reads.
    pub async fn await_convergence(
        &mut self,
        predicate: RecoveryPredicate,
    ) -> Result<()> {
        if matches!(self.state, VerifierState::Converged(_)) {
            self.transition(VerifierState::Polling)?;
        }
        self.expect_state(VerifierState::Polling)?;
        let _timer = ScopedTimer::new("convergence::await");

        let deadline = match predicate {
            RecoveryPredicate::NewPrimaryElected => self.timeouts.election_deadline,
            RecoveryPredicate::FullMembershipRestored => self.timeouts.rejoin_deadline,
        };
        let policy = PollPolicy::new(deadline, self.timeouts.poll_interval);
        self.context_mut()?.arm(deadline, policy.interval);
        let context = self.context_ref()?.clone();

        info!(%predicate, mode = %self.relaxed_mode, ?deadline, "polling for convergence");
        if let Err(e) = self.handle.set_consistency_mode(self.relaxed_mode, true) {
            self.handle.set_consistency_mode(ConsistencyMode::Strong, false)?;
            return Err(e);
        }

        let handle = self.handle.clone();
        let outcome = poll_until(policy, |attempt| {
            let handle = handle.clone();
            let context = context.clone();
            async move {
                match predicate {
                    RecoveryPredicate::NewPrimaryElected => {
                        check_new_primary(handle.as_ref(), &context, attempt).await
                    }
                    RecoveryPredicate::FullMembershipRestored => {
                        check_membership(handle.as_ref(), &context, attempt).await
                    }
                }
            }
        })
        .await;

        self.handle.set_consistency_mode(ConsistencyMode::Strong, true)?;

        match outcome {
            Ok(Ok(Recovery::NewPrimary { id, snapshot })) => {
                self.last_snapshot = Some(snapshot);
                let context = self.context_mut()?;
                context.record_new_primary(id)?;
                info!(
                    old_primary = %context.old_primary_id(),
                    new_primary = ?context.new_primary_id(),
                    "new primary elected"
                );
            }
            Ok(Ok(Recovery::Members(live))) => {
                info!(live = ?live, "membership restored");
                self.context_mut()?.record_live_members(live)?;
            }
            Ok(Err(e)) => return Err(e),
            Err(timeout) => {
                if timeout.last_observation.is_some() {
                    self.last_snapshot = timeout.last_observation;
                }
                self.transition(VerifierState::TimedOut(predicate))?;
                warn!(%predicate, attempts = timeout.attempts, waited = ?timeout.waited, "convergence timed out");
                return Err(ConvergenceError::Timeout {
                    predicate: predicate.name(),
                    waited: timeout.waited,
                    last_snapshot: self.last_snapshot.clone(),
                }
                .into());
            }
        }

        self.transition(VerifierState::Converged(predicate))
    }

    /// Post-conditions of an election: a distinct primary and, when given,
    /// the fixture still found exactly once under strong reads.
    pub async fn verify_new_primary(
        &self,
        fixture: Option<FixtureProbe<'_>>,
    ) -> Result<String> {
        self.expect_state(VerifierState::Converged(RecoveryPredicate::NewPrimaryElected))?;
        let context = self.context_ref()?;

        let new_primary = match context.new_primary_id() {
            Some(id) if !context.is_old_primary(id) => id.to_string(),
            other => {
                return Err(self.failed(VerificationError::new(
                    "new primary differs from the old primary",
                    format!("anything but {}", context.old_primary_id()),
                    other,
                )))
            }
        };

        if let Some((crud, fixture)) = fixture {
            crud.expect_count("fixture survives the failover", fixture.by_value(), 1)
                .await
                .map_err(|e| self.attach_snapshot(e))?;
        }
        Ok(new_primary)
    }

    /// The killed member is back among the live members
    pub fn verify_rejoined(&self) -> Result<()> {
        self.expect_state(VerifierState::Converged(RecoveryPredicate::FullMembershipRestored))?;
        let context = self.context_ref()?;

        if !context.old_primary_is_live() {
            return Err(self.failed(VerificationError::new(
                "old primary is a live member",
                context.old_primary_id(),
                context.live_members(),
            )));
        }
        Ok(())
    }

    /// Asks the old primary directly, under eventual reads, who it is now.
    ///
    /// It must answer as itself, as a non-primary member, and hold the
    /// fixture when one is given.
    pub async fn verify_old_primary_demoted(
        &self,
        fixture: Option<FixtureProbe<'_>>,
    ) -> Result<TopologySnapshot> {
        if !matches!(self.state, VerifierState::Converged(_)) {
            return Err(Error::Fatal(format!(
                "verifier is {:?}, expected a converged cluster",
                self.state
            )));
        }
        let old_primary = self.context_ref()?.old_primary_id().to_string();
        let endpoint = self.template.direct_to(&old_primary);
        let direct = self.connector.connect(&endpoint).await?;

        let context = self.context_ref()?;
        let result: Result<TopologySnapshot> = async {
            direct.set_consistency_mode(ConsistencyMode::Eventual, false)?;
            let snapshot = probe(direct.as_ref()).await?;
            let with_snapshot = |err: VerificationError| -> Error { err.with_snapshot(Some(snapshot.clone())).into() };

            let answers_as_itself = snapshot
                .self_id
                .as_deref()
                .is_some_and(|me| context.is_old_primary(me));
            if !answers_as_itself {
                return Err(with_snapshot(VerificationError::new(
                    "old primary answers as itself",
                    &old_primary,
                    &snapshot.self_id,
                )));
            }
            if snapshot.is_primary {
                return Err(with_snapshot(VerificationError::new(
                    "old primary is no longer primary",
                    false,
                    true,
                )));
            }

            if let Some((crud, fixture)) = fixture {
                CrudScenarioRunner::new(direct.clone(), crud.namespace().clone())
                    .expect_count("old primary holds the fixture", fixture.by_value(), 1)
                    .await?;
            }
            debug!(%snapshot, "old primary rejoined as a secondary");
            Ok(snapshot)
        }
        .await;

        direct.close().await;
        result
    }
}

async fn check_new_primary(
    handle: &dyn ClusterHandle,
    context: &FailoverContext,
    attempt: u32,
) -> CheckStatus {
    match probe(handle).await {
        Err(e) => {
            warn!(attempt, "probe failed while polling: {}", e);
            PollStatus::Pending(None)
        }
        Ok(snapshot) if !snapshot.ok => {
            warn!(attempt, %snapshot, "cluster reports ok != 1 while polling");
            PollStatus::Pending(Some(snapshot))
        }
        Ok(snapshot) => match snapshot.primary_id.clone() {
            Some(primary) if !context.is_old_primary(&primary) => PollStatus::Ready(Ok(Recovery::NewPrimary {
                id: primary,
                snapshot,
            })),
            _ => {
                debug!(attempt, %snapshot, "no new primary yet");
                PollStatus::Pending(Some(snapshot))
            }
        },
    }
}

async fn check_membership(
    handle: &dyn ClusterHandle,
    context: &FailoverContext,
    attempt: u32,
) -> CheckStatus {
    let snapshot = probe(handle).await.ok();

    match handle.list_live_members().await {
        Err(e) => {
            warn!(attempt, "live member listing failed while polling: {}", e);
            PollStatus::Pending(snapshot)
        }
        Ok(live) if live.len() > context.configured_nodes() => PollStatus::Ready(Err(ConvergenceError::MembershipOverflow {
            observed: live.len(),
            configured: context.configured_nodes(),
        }
        .into())),
        Ok(live) if live.len() == context.configured_nodes() => PollStatus::Ready(Ok(Recovery::Members(live))),
        Ok(live) => {
            debug!(attempt, live = live.len(), configured = context.configured_nodes(), "membership not restored yet");
            PollStatus::Pending(snapshot)
        }
    }
}
