use std::fmt;

use super::invalid;
use super::AcceptanceConfig;
use super::Port;
use crate::Result;

/// Deployment roles an endpoint can be built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterRole {
    /// Replica set members, or the first shard in a sharded deployment
    Cluster,
    /// mongos query routers
    Router,
    /// Config server replica set
    ConfigServer,
}

impl ClusterRole {
    pub const ALL: [ClusterRole; 3] = [
        ClusterRole::Cluster,
        ClusterRole::Router,
        ClusterRole::ConfigServer,
    ];

    fn field_prefix(self) -> &'static str {
        match self {
            ClusterRole::Cluster => "mongo",
            ClusterRole::Router => "mongo_mongos",
            ClusterRole::ConfigServer => "mongo_cfgsrv",
        }
    }
}

impl fmt::Display for ClusterRole {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            ClusterRole::Cluster => "cluster",
            ClusterRole::Router => "router",
            ClusterRole::ConfigServer => "config-server",
        };
        f.write_str(name)
    }
}

impl AcceptanceConfig {
    fn role_lists(
        &self,
        role: ClusterRole,
    ) -> (&[String], &[Port]) {
        match role {
            ClusterRole::Cluster => (&self.mongo_hosts, &self.mongo_ports),
            ClusterRole::Router => (&self.mongo_mongos_hosts, &self.mongo_mongos_ports),
            ClusterRole::ConfigServer => (&self.mongo_cfgsrv_hosts, &self.mongo_cfgsrv_ports),
        }
    }

    /// `host:port` seed list for a role, in configuration order
    pub fn addresses(
        &self,
        role: ClusterRole,
    ) -> Vec<String> {
        let (hosts, ports) = self.role_lists(role);
        hosts
            .iter()
            .zip(ports.iter())
            .map(|(host, port)| format!("{}:{}", host.trim(), port))
            .collect()
    }

    /// Whether the deployment declares any member for this role
    pub fn has_role(
        &self,
        role: ClusterRole,
    ) -> bool {
        !self.role_lists(role).0.is_empty()
    }

    /// Replica set name to require when connecting to a role, if any.
    ///
    /// Routers never belong to a replica set. The cluster role only carries
    /// its set name when replication is enabled.
    pub fn replica_set_name(
        &self,
        role: ClusterRole,
    ) -> Option<String> {
        let name = match role {
            ClusterRole::Router => return None,
            ClusterRole::Cluster if !self.replica_set_enabled() => return None,
            ClusterRole::Cluster => &self.mongo_replica_set_name,
            ClusterRole::ConfigServer => &self.mongo_cfgsrv_replica_set_name,
        };
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    /// Seed address of the standalone readwrite target
    pub fn standalone_address(&self) -> Option<String> {
        let host = self.host.trim();
        (!host.is_empty()).then(|| format!("{}:{}", host, self.port))
    }

    pub(super) fn validate_role(
        &self,
        role: ClusterRole,
    ) -> Result<()> {
        let (hosts, ports) = self.role_lists(role);
        let prefix = role.field_prefix();

        if hosts.len() != ports.len() {
            return Err(invalid(format!(
                "{prefix}_hosts has {} entries but {prefix}_ports has {}",
                hosts.len(),
                ports.len()
            )));
        }

        if let Some(empty) = hosts.iter().position(|h| h.trim().is_empty()) {
            return Err(invalid(format!("{prefix}_hosts[{empty}] cannot be empty")));
        }

        let mut seen = std::collections::HashSet::new();
        for address in self.addresses(role) {
            if !seen.insert(address.clone()) {
                return Err(invalid(format!("Duplicate {role} address {address}")));
            }
        }

        if role == ClusterRole::Cluster
            && self.replica_set_enabled()
            && !hosts.is_empty()
            && self.mongo_replica_set_name.trim().is_empty()
        {
            return Err(invalid(
                "mongo_replica_set_name is required when mongo_replica_set_enable is set",
            ));
        }

        Ok(())
    }
}
