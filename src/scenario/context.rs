use std::sync::Arc;

use crate::utils::unique::unique_name;
use crate::AcceptanceConfig;
use crate::ClusterEndpoint;
use crate::ClusterHandle;
use crate::ClusterRole;
use crate::Connector;
use crate::EndpointBuilder;
use crate::Result;
use crate::TimeoutPolicy;

/// Everything a scenario needs to build its own endpoints and handles.
///
/// Holds no handle itself: each scenario connects, uses and closes its own.
#[derive(Clone)]
pub struct ScenarioContext {
    config: Arc<AcceptanceConfig>,
    endpoints: EndpointBuilder,
    connector: Arc<dyn Connector>,
}

impl ScenarioContext {
    pub fn new(
        config: AcceptanceConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            endpoints: EndpointBuilder::new(&config),
            config: Arc::new(config),
            connector,
        }
    }

    pub fn config(&self) -> &AcceptanceConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &EndpointBuilder {
        &self.endpoints
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn timeouts(&self) -> TimeoutPolicy {
        self.config.timeouts()
    }

    /// Fresh endpoint for a role
    pub fn endpoint(
        &self,
        role: ClusterRole,
        fail_fast: bool,
    ) -> ClusterEndpoint {
        self.endpoints.role(role).with_fail_fast(fail_fast)
    }

    pub async fn connect(
        &self,
        endpoint: &ClusterEndpoint,
    ) -> Result<Arc<dyn ClusterHandle>> {
        self.connector.connect(endpoint).await
    }

    /// `<prefix>-<random>` name no other scenario will use
    pub fn unique_name(
        &self,
        prefix: &str,
    ) -> String {
        unique_name(prefix)
    }
}
