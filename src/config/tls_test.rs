use std::io::Write;

use tempfile::NamedTempFile;

use crate::config::tls::TlsSettings;
use crate::Error;

const PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBszCCAVmgAwIBAgIU\n-----END CERTIFICATE-----\n";

#[test]
fn test_tls_settings_default_values() {
    let settings = TlsSettings::default();

    assert!(!settings.enabled);
    assert!(settings.ca_file.is_empty());
    assert!(
        settings.validate().is_ok(),
        "Default settings should validate when TLS is disabled"
    );
    assert_eq!(settings.ca_path(), None);
}

#[test]
fn test_validate_tls_enabled_without_ca_should_fail() {
    let settings = TlsSettings {
        enabled: true,
        ca_file: String::new(),
    };

    let error = settings.validate().unwrap_err();
    assert!(matches!(error, Error::Config(_)));
    assert!(error.to_string().contains("mongo_cert is required"));
}

#[test]
fn test_validate_missing_ca_file_should_fail() {
    let settings = TlsSettings {
        enabled: true,
        ca_file: "/nonexistent/ca.pem".into(),
    };

    let error = settings.validate().unwrap_err();
    assert!(error.to_string().contains("not found"));
}

#[test]
fn test_validate_non_pem_ca_file_should_fail() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "not a certificate").unwrap();

    let settings = TlsSettings {
        enabled: true,
        ca_file: file.path().to_str().unwrap().to_string(),
    };

    let error = settings.validate().unwrap_err();
    assert!(error.to_string().contains("not a PEM certificate"));
}

#[test]
fn test_validate_pem_ca_file_should_succeed() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(PEM.as_bytes()).unwrap();

    let settings = TlsSettings {
        enabled: true,
        ca_file: file.path().to_str().unwrap().to_string(),
    };

    assert!(settings.validate().is_ok());
    assert_eq!(settings.ca_path(), Some(file.path().to_path_buf()));
}

#[test]
fn test_ca_path_ignored_when_tls_disabled() {
    let settings = TlsSettings {
        enabled: false,
        ca_file: "/etc/ssl/certs/ca.pem".into(),
    };

    assert_eq!(settings.ca_path(), None);
}
