//! Convergence Verifier
//!
//! Drives one induced failure from baseline to a verdict:
//!
//! ```text
//! Baseline -> AwaitingFailure -> Polling -> Converged
//!                                    |         |
//!                                    |         +-> Polling (next predicate)
//!                                    +-> TimedOut
//! ```
//!
//! Polling runs the handle in a relaxed consistency mode and always puts it
//! back to [`ConsistencyMode::Strong`](crate::ConsistencyMode::Strong) before
//! returning, whatever the outcome.

mod context;
mod poll;
mod verifier;

pub use context::*;
pub use poll::*;
pub use verifier::*;

#[cfg(test)]
mod context_test;

use std::fmt;

/// What "recovered" means for a polling phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPredicate {
    /// A primary other than the killed one is reported
    NewPrimaryElected,
    /// Every configured member answers again
    FullMembershipRestored,
}

impl RecoveryPredicate {
    pub fn name(self) -> &'static str {
        match self {
            RecoveryPredicate::NewPrimaryElected => "new-primary-elected",
            RecoveryPredicate::FullMembershipRestored => "full-membership-restored",
        }
    }
}

impl fmt::Display for RecoveryPredicate {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierState {
    Baseline,
    AwaitingFailure,
    Polling,
    Converged(RecoveryPredicate),
    TimedOut(RecoveryPredicate),
}

impl VerifierState {
    pub(crate) fn can_transition_to(
        self,
        next: VerifierState,
    ) -> bool {
        use VerifierState::*;
        matches!(
            (self, next),
            (Baseline, AwaitingFailure)
                | (AwaitingFailure, Polling)
                | (Polling, Converged(_))
                | (Polling, TimedOut(_))
                | (Converged(_), Polling)
        )
    }
}
