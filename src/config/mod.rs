//! Configuration for the acceptance suites.
//!
//! The record is flat, field names follow the JSON contract shared with the
//! deployment tooling. Sources are merged with priority:
//! 1. Type defaults (lowest priority)
//! 2. Configuration file named by `CONFIG_PATH` (JSON or TOML)
//! 3. Environment variables with the `ACCEPTANCE__` prefix (highest priority)
//!
//! Typed views over the record live in the submodules: [`ClusterRole`]
//! address lists, [`TlsSettings`] and the scaled [`TimeoutPolicy`].

mod cluster;
mod flag;
mod timeouts;
mod tls;
pub use cluster::*;
pub use flag::*;
pub use timeouts::*;
pub use tls::*;

#[cfg(test)]
mod config_test;
#[cfg(test)]
mod tls_test;

use std::env;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
pub const ENV_PREFIX: &str = "ACCEPTANCE";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AcceptanceConfig {
    /// Multiplier applied to every deadline and timeout
    /// Default: 1.0
    #[serde(default = "default_timeout_scale")]
    pub timeout_scale: f64,

    /// Standalone server used by the readwrite suite
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: Port,

    /// Replica set (or shard 0) members
    #[serde(default)]
    pub mongo_hosts: Vec<String>,
    #[serde(default)]
    pub mongo_ports: Vec<Port>,

    #[serde(default)]
    pub mongo_root_username: String,
    #[serde(default)]
    pub mongo_root_password: String,

    #[serde(default)]
    pub mongo_replica_set_name: String,
    #[serde(default)]
    pub mongo_replica_set_enable: Flag,

    #[serde(default)]
    pub mongo_require_ssl: Flag,
    /// CA certificate in PEM format, required when `mongo_require_ssl` is set
    #[serde(default)]
    pub mongo_cert: String,

    /// Routers (mongos)
    #[serde(default)]
    pub mongo_mongos_hosts: Vec<String>,
    #[serde(default)]
    pub mongo_mongos_ports: Vec<Port>,

    /// Config server replica set
    #[serde(default)]
    pub mongo_cfgsrv_hosts: Vec<String>,
    #[serde(default)]
    pub mongo_cfgsrv_ports: Vec<Port>,
    #[serde(default)]
    pub mongo_cfgsrv_replica_set_name: String,

    /// Interval between two topology probes while polling
    /// Default: 2000 ms
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Deadline for a new primary to be elected
    /// Default: 60 s
    #[serde(default = "default_election_deadline_secs")]
    pub election_deadline_secs: u64,

    /// Deadline for every original member to be live again
    /// Default: 180 s
    #[serde(default = "default_rejoin_deadline_secs")]
    pub rejoin_deadline_secs: u64,

    /// Deadline for a write to become visible on a secondary
    /// Default: 60 s
    #[serde(default = "default_secondary_read_deadline_secs")]
    pub secondary_read_deadline_secs: u64,

    /// Connection establishment timeout
    /// Default: 120 s
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Documents inserted by the sharding distribution scenarios
    /// Default: 200
    #[serde(default = "default_shard_bulk_documents")]
    pub shard_bulk_documents: usize,

    /// Send `force: true` with the shutdown command
    /// Default: false
    #[serde(default)]
    pub force_shutdown: bool,
}

impl Default for AcceptanceConfig {
    fn default() -> Self {
        Self {
            timeout_scale: default_timeout_scale(),
            host: String::new(),
            port: default_port(),
            mongo_hosts: vec![],
            mongo_ports: vec![],
            mongo_root_username: String::new(),
            mongo_root_password: String::new(),
            mongo_replica_set_name: String::new(),
            mongo_replica_set_enable: Flag::default(),
            mongo_require_ssl: Flag::default(),
            mongo_cert: String::new(),
            mongo_mongos_hosts: vec![],
            mongo_mongos_ports: vec![],
            mongo_cfgsrv_hosts: vec![],
            mongo_cfgsrv_ports: vec![],
            mongo_cfgsrv_replica_set_name: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            election_deadline_secs: default_election_deadline_secs(),
            rejoin_deadline_secs: default_rejoin_deadline_secs(),
            secondary_read_deadline_secs: default_secondary_read_deadline_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            shard_bulk_documents: default_shard_bulk_documents(),
            force_shutdown: false,
        }
    }
}

impl AcceptanceConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// # Note
    /// Callers MUST call [`validate()`](Self::validate) before handing the
    /// configuration to a suite.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "/var/vcap/jobs/acceptance/config.json");
    /// let cfg = AcceptanceConfig::load()?.validate()?;
    /// ```
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies an additional configuration file on top of the current values.
    ///
    /// Environment variables keep the highest priority.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// # Errors
    /// Returns `Error::Config` when:
    /// - `timeout_scale` is not strictly positive
    /// - a role's host and port lists differ in length
    /// - TLS is required but the CA certificate is unreadable
    /// - a polling interval or deadline is zero
    pub fn validate(self) -> Result<Self> {
        if self.timeout_scale <= 0.0 || !self.timeout_scale.is_finite() {
            return Err(invalid(format!(
                "timeout_scale must be a positive number, got {}",
                self.timeout_scale
            )));
        }

        for role in ClusterRole::ALL {
            self.validate_role(role)?;
        }

        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms cannot be 0"));
        }
        if self.election_deadline_secs == 0 || self.rejoin_deadline_secs == 0 {
            return Err(invalid("convergence deadlines cannot be 0"));
        }
        if self.shard_bulk_documents < 2 {
            return Err(invalid("shard_bulk_documents must be at least 2"));
        }

        self.tls().validate()?;

        Ok(self)
    }

    /// TLS material shared by every role
    pub fn tls(&self) -> TlsSettings {
        TlsSettings {
            enabled: self.mongo_require_ssl.is_set(),
            ca_file: self.mongo_cert.clone(),
        }
    }

    /// Deadlines and intervals with `timeout_scale` applied
    pub fn timeouts(&self) -> TimeoutPolicy {
        TimeoutPolicy::from_config(self)
    }

    /// Whether the deployment was declared with replication enabled
    pub fn replica_set_enabled(&self) -> bool {
        self.mongo_replica_set_enable.is_set()
    }

    /// Number of data-bearing members configured for the cluster role
    pub fn node_count(&self) -> usize {
        self.mongo_hosts.len()
    }
}

pub(crate) fn invalid(message: impl Into<String>) -> Error {
    Error::Config(ConfigError::Message(message.into()))
}

fn default_timeout_scale() -> f64 {
    1.0
}
fn default_port() -> Port {
    Port(27017)
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_election_deadline_secs() -> u64 {
    60
}
fn default_rejoin_deadline_secs() -> u64 {
    180
}
fn default_secondary_read_deadline_secs() -> u64 {
    60
}
fn default_connect_timeout_secs() -> u64 {
    120
}
fn default_shard_bulk_documents() -> usize {
    200
}
