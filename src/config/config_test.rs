use serial_test::serial;
use temp_env::with_vars;

use super::*;
use crate::Error;

fn cleanup_all_acceptance_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("ACCEPTANCE__") || key == CONFIG_PATH_ENV {
            std::env::remove_var(&key);
        }
    }
}

fn replica_set_config() -> AcceptanceConfig {
    AcceptanceConfig {
        mongo_hosts: vec!["10.0.0.1".into(), "10.0.0.2".into(), "10.0.0.3".into()],
        mongo_ports: vec![Port(27017), Port(27017), Port(27017)],
        mongo_replica_set_name: "rs0".into(),
        mongo_replica_set_enable: Flag(true),
        ..Default::default()
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = AcceptanceConfig::default();

    assert_eq!(config.timeout_scale, 1.0);
    assert_eq!(config.port, Port(27017));
    assert_eq!(config.poll_interval_ms, 2000);
    assert_eq!(config.election_deadline_secs, 60);
    assert_eq!(config.rejoin_deadline_secs, 180);
    assert_eq!(config.shard_bulk_documents, 200);
    assert!(!config.replica_set_enabled());
    assert!(!config.tls().enabled);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn load_should_read_json_file_from_config_path() {
    cleanup_all_acceptance_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("acceptance.json");
    std::fs::write(
        &config_path,
        r#"{
            "timeout_scale": 1.5,
            "mongo_hosts": ["mongo-0", "mongo-1", "mongo-2"],
            "mongo_ports": ["27017", "27018", "27019"],
            "mongo_root_username": "root",
            "mongo_root_password": "secret",
            "mongo_replica_set_name": "rs0",
            "mongo_replica_set_enable": 1,
            "mongo_require_ssl": 0,
            "mongo_cert": ""
        }"#,
    )
    .unwrap();

    with_vars(
        vec![(CONFIG_PATH_ENV, Some(config_path.to_str().unwrap()))],
        || {
            let config = AcceptanceConfig::load().unwrap().validate().unwrap();

            assert_eq!(config.timeout_scale, 1.5);
            assert_eq!(config.node_count(), 3);
            assert_eq!(
                config.addresses(ClusterRole::Cluster),
                vec!["mongo-0:27017", "mongo-1:27018", "mongo-2:27019"]
            );
            assert!(config.replica_set_enabled());
            assert_eq!(
                config.replica_set_name(ClusterRole::Cluster),
                Some("rs0".to_string())
            );
            assert!(!config.tls().enabled);
        },
    );
}

#[test]
#[serial]
fn environment_variables_should_have_highest_priority() {
    cleanup_all_acceptance_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("acceptance.json");
    std::fs::write(&config_path, r#"{ "timeout_scale": 1.5, "poll_interval_ms": 500 }"#).unwrap();

    with_vars(
        vec![
            (CONFIG_PATH_ENV, Some(config_path.to_str().unwrap())),
            ("ACCEPTANCE__TIMEOUT_SCALE", Some("3")),
        ],
        || {
            let config = AcceptanceConfig::load().unwrap();

            assert_eq!(config.timeout_scale, 3.0);
            assert_eq!(config.poll_interval_ms, 500);
        },
    );
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_acceptance_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("override.toml");
    std::fs::write(
        &config_path,
        r#"
        mongo_mongos_hosts = ["router-0"]
        mongo_mongos_ports = [27020]
        rejoin_deadline_secs = 30
        "#,
    )
    .unwrap();

    let base = AcceptanceConfig::default();
    let config = base.with_override_config(config_path.to_str().unwrap()).unwrap();

    assert_eq!(config.addresses(ClusterRole::Router), vec!["router-0:27020"]);
    assert_eq!(config.rejoin_deadline_secs, 30);
    assert_eq!(config.replica_set_name(ClusterRole::Router), None);
}

#[test]
#[serial]
fn load_should_reject_zero_port() {
    cleanup_all_acceptance_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("acceptance.json");
    std::fs::write(
        &config_path,
        r#"{ "mongo_hosts": ["mongo-0"], "mongo_ports": ["0"] }"#,
    )
    .unwrap();

    with_vars(
        vec![(CONFIG_PATH_ENV, Some(config_path.to_str().unwrap()))],
        || {
            let result = AcceptanceConfig::load();
            assert!(matches!(result, Err(Error::Config(_))));
        },
    );
}

#[test]
#[serial]
fn load_should_fail_when_config_path_is_missing() {
    cleanup_all_acceptance_env_vars();
    with_vars(
        vec![(CONFIG_PATH_ENV, Some("/nonexistent/acceptance.json"))],
        || {
            assert!(AcceptanceConfig::load().is_err());
        },
    );
}

#[test]
fn validation_should_fail_with_mismatched_host_and_port_lists() {
    let mut config = replica_set_config();
    config.mongo_ports.pop();

    let error = config.validate().unwrap_err();
    assert!(error.to_string().contains("mongo_ports has 2"));
}

#[test]
fn validation_should_fail_with_duplicate_addresses() {
    let mut config = replica_set_config();
    config.mongo_hosts[1] = "10.0.0.1".into();

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_require_replica_set_name_when_enabled() {
    let mut config = replica_set_config();
    config.mongo_replica_set_name = " ".into();

    let error = config.validate().unwrap_err();
    assert!(error.to_string().contains("mongo_replica_set_name"));
}

#[test]
fn validation_should_reject_non_positive_timeout_scale() {
    for scale in [0.0, -1.0, f64::NAN] {
        let config = AcceptanceConfig {
            timeout_scale: scale,
            ..Default::default()
        };
        assert!(config.validate().is_err(), "scale {scale} should be rejected");
    }
}

#[test]
fn validation_should_detect_tls_without_ca_file() {
    let config = AcceptanceConfig {
        mongo_require_ssl: Flag(true),
        ..Default::default()
    };

    assert!(config.validate().is_err());
}

#[test]
fn replica_set_name_is_absent_when_replication_disabled() {
    let mut config = replica_set_config();
    config.mongo_replica_set_enable = Flag(false);

    assert_eq!(config.replica_set_name(ClusterRole::Cluster), None);
}

#[test]
fn standalone_address_uses_host_and_port() {
    let config = AcceptanceConfig {
        host: "standalone".into(),
        port: Port(27100),
        ..Default::default()
    };

    assert_eq!(config.standalone_address(), Some("standalone:27100".to_string()));
    assert_eq!(AcceptanceConfig::default().standalone_address(), None);
}

#[test]
fn flag_should_accept_integers_booleans_and_strings() {
    #[derive(serde::Deserialize)]
    struct Holder {
        flag: Flag,
    }

    let parse = |raw: &str| -> Flag {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Json))
            .build()
            .unwrap();
        settings.try_deserialize::<Holder>().unwrap().flag
    };

    assert_eq!(parse(r#"{ "flag": 1 }"#), Flag(true));
    assert_eq!(parse(r#"{ "flag": 0 }"#), Flag(false));
    assert_eq!(parse(r#"{ "flag": true }"#), Flag(true));
    assert_eq!(parse(r#"{ "flag": "1" }"#), Flag(true));
}
