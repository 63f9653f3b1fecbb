use std::fs;
use std::path::Path;
use std::path::PathBuf;

use config::ConfigError;

use crate::Error;
use crate::Result;

/// TLS requirements for every connection opened by the harness
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// Connections must be encrypted
    /// Default: false (disabled)
    pub enabled: bool,

    /// Path to the Certificate Authority root certificate in PEM format
    pub ca_file: String,
}

impl TlsSettings {
    /// Validates TLS configuration consistency and CA file existence
    /// # Errors
    /// Returns `Error::Config` when TLS is required and the CA certificate
    /// is missing, unreadable or not PEM encoded.
    pub fn validate(&self) -> Result<()> {
        // No further validation needed if TLS is disabled
        if !self.enabled {
            return Ok(());
        }

        if self.ca_file.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "mongo_cert is required when mongo_require_ssl is set".into(),
            )));
        }

        self.validate_cert_file(Path::new(&self.ca_file), "CA certificate")
    }

    /// CA path handed to the driver, only when TLS is enabled
    pub fn ca_path(&self) -> Option<PathBuf> {
        (self.enabled && !self.ca_file.trim().is_empty()).then(|| PathBuf::from(&self.ca_file))
    }

    fn validate_cert_file(
        &self,
        path: &Path,
        name: &str,
    ) -> Result<()> {
        if !path.exists() {
            return Err(Error::Config(ConfigError::Message(format!(
                "{} file {} not found",
                name,
                path.display()
            ))));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(ConfigError::Message(format!(
                "{} file {} is unreadable: {}",
                name,
                path.display(),
                e
            )))
        })?;

        if !content.contains("-----BEGIN CERTIFICATE-----") {
            return Err(Error::Config(ConfigError::Message(format!(
                "{} file {} is not a PEM certificate",
                name,
                path.display()
            ))));
        }

        Ok(())
    }
}
