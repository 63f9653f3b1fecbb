//! Acceptance Harness Error Hierarchy
//!
//! Errors are grouped by the component that raises them. Every variant is
//! fatal to the scenario that observed it; the only retry-like behavior in
//! the crate is the bounded polling of the convergence verifier.

use std::time::Duration;

use config::ConfigError;

use crate::topology::TopologySnapshot;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unreachable deployment, rejected credentials, failed TLS handshake
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Administrative or data command rejected by the cluster
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Induced shutdown ended in anything but the expected termination
    #[error(transparent)]
    Injection(#[from] InjectionError),

    /// Deadline exceeded while waiting for the cluster to recover
    #[error(transparent)]
    Convergence(#[from] ConvergenceError),

    /// Observable guarantee violated
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Malformed host/port pair
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Credentials rejected by the server
    #[error("Authentication failed against {address}: {message}")]
    Authentication { address: String, message: String },

    /// TLS negotiation or CA material failures
    #[error("TLS handshake with {address} failed: {message}")]
    Tls { address: String, message: String },

    /// No suitable member answered within the connect timeout
    #[error("Unable to reach {address}: {message}")]
    Unreachable { address: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Server answered with `ok: 0` or a command error document
    #[error("Command `{command}` rejected (code {code} {code_name}): {message}")]
    Rejected {
        command: String,
        code: i32,
        code_name: String,
        message: String,
    },

    /// Connection closed or reset while the command was in flight
    #[error("Connection to {address} terminated during `{command}`")]
    ConnectionTerminated { command: String, address: String },

    /// Any other transport level failure
    #[error("Command `{command}` failed: {message}")]
    Transport { command: String, message: String },

    /// Reply could not be decoded into its typed form
    #[error("Invalid reply to `{command}`: {reason}")]
    InvalidReply { command: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum InjectionError {
    /// The node answered the shutdown command with a refusal
    #[error("Shutdown of {address} rejected: {reason}")]
    Rejected { address: String, reason: String },

    /// Anything other than an end-of-stream while shutting the node down
    #[error("Unexpected failure while shutting down {address}: {source}")]
    Unexpected {
        address: String,
        #[source]
        source: Box<Error>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConvergenceError {
    #[error("Cluster did not converge ({predicate}) within {waited:?}; last snapshot: {last_snapshot:?}")]
    Timeout {
        predicate: &'static str,
        waited: Duration,
        last_snapshot: Option<TopologySnapshot>,
    },

    #[error("Observed {observed} live members but only {configured} are configured")]
    MembershipOverflow { observed: usize, configured: usize },
}

#[derive(Debug, thiserror::Error)]
#[error("Assertion failed: {what} (expected {expected}, got {actual})")]
pub struct VerificationError {
    pub what: String,
    pub expected: String,
    pub actual: String,
    pub snapshot: Option<TopologySnapshot>,
}

impl VerificationError {
    pub fn new(
        what: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        Self {
            what: what.into(),
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
            snapshot: None,
        }
    }

    pub fn with_snapshot(
        mut self,
        snapshot: Option<TopologySnapshot>,
    ) -> Self {
        self.snapshot = snapshot;
        self
    }
}

impl Error {
    /// Last cluster snapshot attached to the failure, if any
    pub fn last_snapshot(&self) -> Option<&TopologySnapshot> {
        match self {
            Error::Convergence(ConvergenceError::Timeout { last_snapshot, .. }) => {
                last_snapshot.as_ref()
            }
            Error::Verification(v) => v.snapshot.as_ref(),
            _ => None,
        }
    }
}
