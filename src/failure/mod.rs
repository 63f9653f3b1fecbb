//! Failure Injector
//!
//! Shuts a single member down through a direct connection. The member
//! normally dies before answering, so a dropped connection on the shutdown
//! command is the expected outcome, not an error.


use std::sync::Arc;

use bson::doc;
use bson::Bson;
use bson::Document;
use tracing::info;
use tracing::warn;

use crate::utils::scoped_timer::ScopedTimer;
use crate::ClusterEndpoint;
use crate::CommandError;
use crate::Connector;
use crate::Credentials;
use crate::Error;
use crate::InjectionError;
use crate::Result;

/// How an induced shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Connection closed while the command was in flight
    ConnectionDropped,
    /// The member replied `ok: 1` before going away
    Acknowledged,
}

pub struct FailureInjector {
    connector: Arc<dyn Connector>,
    /// Source of TLS and timeout settings for the direct connection
    template: ClusterEndpoint,
    force: bool,
}

impl FailureInjector {
    pub fn new(
        connector: Arc<dyn Connector>,
        template: ClusterEndpoint,
    ) -> Self {
        Self {
            connector,
            template,
            force: false,
        }
    }

    /// Shut down even a primary without an electable secondary caught up
    pub fn with_force(
        mut self,
        force: bool,
    ) -> Self {
        self.force = force;
        self
    }

    /// Connects directly to `address` and asks it to shut down.
    ///
    /// No rollback: bringing the member back is the deployment's job.
    pub async fn shutdown_node(
        &self,
        address: &str,
        credentials: &Credentials,
    ) -> Result<Termination> {
        let _timer = ScopedTimer::new("failure::shutdown_node");

        let endpoint = self
            .template
            .direct_to(address)
            .with_credentials(credentials.clone());

        let handle = self.connector.connect(&endpoint).await.map_err(|e| {
            warn!(%address, "unable to open direct connection for shutdown: {}", e);
            Error::from(InjectionError::Unexpected {
                address: address.to_string(),
                source: Box::new(e),
            })
        })?;

        let mut command = doc! { "shutdown": 1 };
        if self.force {
            command.insert("force", true);
        }

        info!(%address, force = self.force, "shutting member down");
        let result = handle.run_command("admin", command).await;
        handle.close().await;

        let termination = classify_shutdown(address, result)?;
        info!(%address, ?termination, "member shut down");
        Ok(termination)
    }
}

/// Maps the outcome of a shutdown command to the expected termination or an
/// injection failure
pub(crate) fn classify_shutdown(
    address: &str,
    result: Result<Document>,
) -> Result<Termination> {
    let address = address.to_string();
    match result {
        Err(Error::Command(CommandError::ConnectionTerminated { .. })) => {
            Ok(Termination::ConnectionDropped)
        }
        Err(Error::Command(CommandError::Rejected {
            code,
            code_name,
            message,
            ..
        })) => Err(InjectionError::Rejected {
            address,
            reason: format!("{code_name} ({code}): {message}"),
        }
        .into()),
        Err(e) => Err(InjectionError::Unexpected {
            address,
            source: Box::new(e),
        }
        .into()),
        Ok(reply) => {
            if reply_ok(&reply) {
                Ok(Termination::Acknowledged)
            } else {
                let reason = reply
                    .get_str("errmsg")
                    .unwrap_or("reply without ok: 1")
                    .to_string();
                Err(InjectionError::Rejected { address, reason }.into())
            }
        }
    }
}

fn reply_ok(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(Bson::Double(v)) => *v == 1.0,
        Some(Bson::Int32(v)) => *v == 1,
        Some(Bson::Int64(v)) => *v == 1,
        Some(Bson::Boolean(v)) => *v,
        _ => false,
    }
}
