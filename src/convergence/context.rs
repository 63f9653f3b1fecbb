use std::collections::BTreeSet;
use std::time::Duration;

use crate::utils::net::member_key;
use crate::ConvergenceError;
use crate::Result;
use crate::VerificationError;

/// State of one failover scenario, owned by the verifier
#[derive(Debug, Clone, PartialEq)]
pub struct FailoverContext {
    old_primary_id: String,
    new_primary_id: Option<String>,
    live_members: BTreeSet<String>,
    configured_nodes: usize,
    deadline: Duration,
    poll_interval: Duration,
}

impl FailoverContext {
    pub fn new(
        old_primary_id: impl Into<String>,
        configured_nodes: usize,
    ) -> Self {
        Self {
            old_primary_id: old_primary_id.into(),
            new_primary_id: None,
            live_members: BTreeSet::new(),
            configured_nodes,
            deadline: Duration::ZERO,
            poll_interval: Duration::ZERO,
        }
    }

    pub fn old_primary_id(&self) -> &str {
        &self.old_primary_id
    }

    pub fn new_primary_id(&self) -> Option<&str> {
        self.new_primary_id.as_deref()
    }

    pub fn live_members(&self) -> &BTreeSet<String> {
        &self.live_members
    }

    pub fn configured_nodes(&self) -> usize {
        self.configured_nodes
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub(crate) fn arm(
        &mut self,
        deadline: Duration,
        poll_interval: Duration,
    ) {
        self.deadline = deadline;
        self.poll_interval = poll_interval;
    }

    /// Whether `id` names the member that was killed
    pub fn is_old_primary(
        &self,
        id: &str,
    ) -> bool {
        member_key(id) == member_key(&self.old_primary_id)
    }

    /// Records the elected primary. It must not be the killed one.
    pub fn record_new_primary(
        &mut self,
        id: impl Into<String>,
    ) -> Result<()> {
        let id = id.into();
        if self.is_old_primary(&id) {
            return Err(VerificationError::new(
                "new primary differs from the old primary",
                format!("anything but {}", self.old_primary_id),
                &id,
            )
            .into());
        }
        self.new_primary_id = Some(id);
        Ok(())
    }

    /// Records the live set. It can never exceed the configured node count.
    pub fn record_live_members(
        &mut self,
        live: BTreeSet<String>,
    ) -> Result<()> {
        if live.len() > self.configured_nodes {
            return Err(ConvergenceError::MembershipOverflow {
                observed: live.len(),
                configured: self.configured_nodes,
            }
            .into());
        }
        self.live_members = live;
        Ok(())
    }

    pub fn membership_restored(&self) -> bool {
        self.live_members.len() == self.configured_nodes
    }

    pub fn old_primary_is_live(&self) -> bool {
        self.live_members.iter().any(|m| self.is_old_primary(m))
    }
}
