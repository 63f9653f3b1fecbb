use std::fmt;
use std::time::Duration;

use crate::config::AcceptanceConfig;
use crate::config::ClusterRole;
use crate::config::TlsSettings;

/// Authentication material for a handle
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Database the user is defined in
    pub source: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            source: source.into(),
        }
    }

    /// Root user defined in `admin`
    pub fn root(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::new(username, password, "admin")
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Everything needed to open a handle on one deployment role.
///
/// Immutable once built; every scenario builds its own.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterEndpoint {
    addresses: Vec<String>,
    replica_set: Option<String>,
    credentials: Credentials,
    tls: TlsSettings,
    connect_timeout: Duration,
    fail_fast: bool,
    direct: bool,
}

impl ClusterEndpoint {
    pub fn new(
        addresses: Vec<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            addresses,
            replica_set: None,
            credentials,
            tls: TlsSettings::default(),
            connect_timeout: Duration::from_secs(120),
            fail_fast: false,
            direct: false,
        }
    }

    pub fn with_replica_set(
        mut self,
        name: Option<String>,
    ) -> Self {
        self.replica_set = name;
        self
    }

    pub fn with_tls(
        mut self,
        tls: TlsSettings,
    ) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_connect_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_fail_fast(
        mut self,
        fail_fast: bool,
    ) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Same deployment, different user (login)
    pub fn with_credentials(
        &self,
        credentials: Credentials,
    ) -> Self {
        Self {
            credentials,
            ..self.clone()
        }
    }

    /// Non-routed endpoint on exactly one member, bypassing topology discovery
    pub fn direct_to(
        &self,
        address: impl Into<String>,
    ) -> Self {
        Self {
            addresses: vec![address.into()],
            replica_set: None,
            direct: true,
            fail_fast: true,
            ..self.clone()
        }
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn replica_set(&self) -> Option<&str> {
        self.replica_set.as_deref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn tls(&self) -> &TlsSettings {
        &self.tls
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn is_direct(&self) -> bool {
        self.direct
    }

    /// Seed list rendered for error messages
    pub fn display_addresses(&self) -> String {
        self.addresses.join(",")
    }
}

/// Builds fresh endpoints per scenario from the suite configuration
#[derive(Debug, Clone)]
pub struct EndpointBuilder {
    config: AcceptanceConfig,
}

impl EndpointBuilder {
    pub fn new(config: &AcceptanceConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn root_credentials(&self) -> Credentials {
        Credentials::root(
            self.config.mongo_root_username.clone(),
            self.config.mongo_root_password.clone(),
        )
    }

    fn template(
        &self,
        addresses: Vec<String>,
    ) -> ClusterEndpoint {
        ClusterEndpoint::new(addresses, self.root_credentials())
            .with_tls(self.config.tls())
            .with_connect_timeout(self.config.timeouts().connect_timeout)
    }

    /// Routed endpoint over every configured member of a role
    pub fn role(
        &self,
        role: ClusterRole,
    ) -> ClusterEndpoint {
        self.template(self.config.addresses(role))
            .with_replica_set(self.config.replica_set_name(role))
    }

    /// Endpoint of the readwrite suite's standalone server
    pub fn standalone(&self) -> Option<ClusterEndpoint> {
        self.config
            .standalone_address()
            .map(|address| self.template(vec![address]).with_fail_fast(true))
    }
}
