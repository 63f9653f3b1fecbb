use std::time::Duration;

use crate::config::AcceptanceConfig;
use crate::config::ClusterRole;
use crate::config::Flag;
use crate::config::Port;
use crate::ClusterEndpoint;
use crate::Credentials;
use crate::EndpointBuilder;

fn sharded_config() -> AcceptanceConfig {
    AcceptanceConfig {
        timeout_scale: 0.5,
        mongo_hosts: vec!["shard0-a".into(), "shard0-b".into(), "shard0-c".into()],
        mongo_ports: vec![Port(27018), Port(27018), Port(27018)],
        mongo_root_username: "root".into(),
        mongo_root_password: "secret".into(),
        mongo_replica_set_name: "shard0".into(),
        mongo_replica_set_enable: Flag(true),
        mongo_mongos_hosts: vec!["router".into()],
        mongo_mongos_ports: vec![Port(27017)],
        mongo_cfgsrv_hosts: vec!["cfg-a".into(), "cfg-b".into(), "cfg-c".into()],
        mongo_cfgsrv_ports: vec![Port(27019), Port(27019), Port(27019)],
        mongo_cfgsrv_replica_set_name: "cfgrs".into(),
        ..Default::default()
    }
}

#[test]
fn role_endpoint_carries_seeds_set_name_and_scaled_timeout() {
    let builder = EndpointBuilder::new(&sharded_config());

    let cluster = builder.role(ClusterRole::Cluster);
    assert_eq!(
        cluster.addresses(),
        ["shard0-a:27018", "shard0-b:27018", "shard0-c:27018"]
    );
    assert_eq!(cluster.replica_set(), Some("shard0"));
    assert_eq!(cluster.connect_timeout(), Duration::from_secs(60));
    assert!(!cluster.is_direct());
    assert!(!cluster.fail_fast());

    let router = builder.role(ClusterRole::Router);
    assert_eq!(router.addresses(), ["router:27017"]);
    assert_eq!(router.replica_set(), None);

    let cfg = builder.role(ClusterRole::ConfigServer);
    assert_eq!(cfg.replica_set(), Some("cfgrs"));
}

#[test]
fn direct_endpoint_targets_exactly_one_member() {
    let builder = EndpointBuilder::new(&sharded_config());
    let cluster = builder.role(ClusterRole::Cluster);

    let direct = cluster.direct_to("shard0-b:27018");
    assert_eq!(direct.addresses(), ["shard0-b:27018"]);
    assert!(direct.is_direct());
    assert!(direct.fail_fast());
    assert_eq!(direct.replica_set(), None);
    assert_eq!(direct.credentials(), cluster.credentials());
}

#[test]
fn with_credentials_keeps_everything_else() {
    let builder = EndpointBuilder::new(&sharded_config());
    let router = builder.role(ClusterRole::Router);
    let user = Credentials::new("TestUsername-x", "TestPassword", "ShardTestDatabase-x");

    let login = router.with_credentials(user.clone());
    assert_eq!(login.credentials(), &user);
    assert_eq!(login.addresses(), router.addresses());
    assert_eq!(builder.root_credentials(), Credentials::root("root", "secret"));
}

#[test]
fn standalone_endpoint_requires_a_host() {
    let mut config = AcceptanceConfig::default();
    assert!(EndpointBuilder::new(&config).standalone().is_none());

    config.host = "localhost".into();
    let endpoint = EndpointBuilder::new(&config).standalone().unwrap();
    assert_eq!(endpoint.addresses(), ["localhost:27017"]);
    assert!(endpoint.fail_fast());
}

#[test]
fn credentials_debug_redacts_password() {
    let credentials = Credentials::root("root", "secret");
    let rendered = format!("{credentials:?}");

    assert!(rendered.contains("root"));
    assert!(!rendered.contains("secret"));
    assert!(Credentials::default().is_anonymous());
}

#[test]
fn display_addresses_joins_seeds() {
    let endpoint = ClusterEndpoint::new(
        vec!["a:1".into(), "b:2".into()],
        Credentials::default(),
    );
    assert_eq!(endpoint.display_addresses(), "a:1,b:2");
}
