//! Application configuration structures.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::protocol::CredentialSet;

use super::validation::{check_cidr, cidr_contains, expand_cidr, ConfigError};

// =============================================================================
// Constants
// =============================================================================

/// Default collection cycle time (5 minutes).
pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_secs(300);

/// Default maximum bindings per sub-request.
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 3;

/// Default plugin document file name.
pub const DEFAULT_PLUGIN_DOCUMENT: &str = "default.yaml";

fn default_cycle_time() -> Duration {
    DEFAULT_CYCLE_TIME
}

fn default_max_request_size() -> usize {
    DEFAULT_MAX_REQUEST_SIZE
}

fn default_plugin_document() -> String {
    DEFAULT_PLUGIN_DOCUMENT.to_string()
}

// =============================================================================
// Section Configurations
// =============================================================================

/// Plugin document directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
    /// Directory holding the plugin documents.
    pub dir: String,

    /// File name of the default document (default: "default.yaml").
    #[serde(default = "default_plugin_document")]
    pub default: String,
}

/// Symbol registry directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Directory holding the registry module files.
    pub dir: String,
}

/// One named credential set.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialDecl {
    pub id: String,

    #[serde(flatten)]
    pub set: CredentialSet,
}

/// One device declaration: a single address or an IPv4 CIDR block, plus the
/// credential sets to try in order. An empty list means every declared set.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceDecl {
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub cidr: Option<String>,

    #[serde(default)]
    pub credentials: Vec<String>,
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Collection cycle time (default: 5m).
    #[serde(default = "default_cycle_time", with = "humantime_serde")]
    pub cycle_time: Duration,

    /// Maximum bindings per sub-request (default: 3).
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,

    /// Plugin document directory.
    pub plugins: PluginsConfig,

    /// Symbol registry directory.
    pub registry: RegistryConfig,

    /// Path to a simulated-fleet fixture, for the demo transport.
    #[serde(default)]
    pub fleet: Option<String>,

    /// Named credential sets.
    #[serde(default)]
    pub credentials: Vec<CredentialDecl>,

    /// Polled devices.
    #[serde(default)]
    pub devices: Vec<DeviceDecl>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_time.is_zero() {
            return Err(ConfigError::ValidationError(
                "cycle_time must be positive".to_string(),
            ));
        }

        if self.max_request_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_request_size must be positive".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for credential in &self.credentials {
            if !ids.insert(credential.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate credential id: '{}'",
                    credential.id
                )));
            }
        }

        for (i, device) in self.devices.iter().enumerate() {
            match (&device.address, &device.cidr) {
                (Some(_), Some(_)) => {
                    return Err(ConfigError::ValidationError(format!(
                        "device #{i} declares both address and cidr"
                    )));
                }
                (None, None) => {
                    return Err(ConfigError::ValidationError(format!(
                        "device #{i} declares neither address nor cidr"
                    )));
                }
                (None, Some(cidr)) => {
                    check_cidr(cidr)?;
                }
                (Some(_), None) => {}
            }
            for id in &device.credentials {
                if !ids.contains(id.as_str()) {
                    return Err(ConfigError::ValidationError(format!(
                        "device #{i} references unknown credential id: '{id}'"
                    )));
                }
            }
        }

        Ok(())
    }

    /// The full device address list, CIDR blocks expanded. Built fresh on
    /// every call so each cycle starts from the declared configuration.
    pub fn device_addresses(&self) -> Vec<String> {
        let mut addresses = Vec::new();
        for device in &self.devices {
            if let Some(address) = &device.address {
                addresses.push(address.clone());
            } else if let Some(cidr) = &device.cidr {
                match expand_cidr(cidr) {
                    Ok(hosts) => addresses.extend(hosts),
                    // Validated at load; a failure here is a programming error.
                    Err(err) => warn!(cidr, error = %err, "skipping CIDR block"),
                }
            }
        }
        addresses
    }

    /// The ordered credential sets to try for one device address.
    pub fn credentials_for(&self, address: &str) -> Vec<CredentialSet> {
        let decl = self.devices.iter().find(|device| {
            match (&device.address, &device.cidr) {
                (Some(declared), _) => declared == address,
                (None, Some(cidr)) => cidr_contains(cidr, address).unwrap_or(false),
                (None, None) => false,
            }
        });

        let ids: Vec<&str> = match decl {
            Some(device) if !device.credentials.is_empty() => {
                device.credentials.iter().map(String::as_str).collect()
            }
            // No declaration or no explicit list: every set, declared order.
            _ => self.credentials.iter().map(|c| c.id.as_str()).collect(),
        };
        ids.iter()
            .filter_map(|id| {
                self.credentials
                    .iter()
                    .find(|c| c.id == *id)
                    .map(|c| c.set.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> AppConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    const BASE: &str = r#"
plugins: { dir: plugins }
registry: { dir: registry }
credentials:
  - { id: main, community: public }
  - { id: backup, community: private }
devices:
  - { address: 192.0.2.1, credentials: [main, backup] }
  - { cidr: 192.0.3.0/30, credentials: [backup] }
"#;

    #[test]
    fn test_defaults() {
        let config = config(BASE);
        assert_eq!(config.cycle_time, DEFAULT_CYCLE_TIME);
        assert_eq!(config.max_request_size, DEFAULT_MAX_REQUEST_SIZE);
        assert_eq!(config.plugins.default, DEFAULT_PLUGIN_DOCUMENT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_device_addresses_expand_cidr() {
        let config = config(BASE);
        assert_eq!(
            config.device_addresses(),
            vec!["192.0.2.1", "192.0.3.1", "192.0.3.2"]
        );
    }

    #[test]
    fn test_credentials_in_declared_order() {
        let config = config(BASE);
        let sets = config.credentials_for("192.0.2.1");
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].community, "public");
        assert_eq!(sets[1].community, "private");

        let cidr_sets = config.credentials_for("192.0.3.2");
        assert_eq!(cidr_sets.len(), 1);
        assert_eq!(cidr_sets[0].community, "private");
    }

    #[test]
    fn test_unlisted_device_gets_all_credentials() {
        let config = config(BASE);
        assert_eq!(config.credentials_for("198.51.100.9").len(), 2);
    }

    #[test]
    fn test_validation_rejects_unknown_credential() {
        let config = config(
            r#"
plugins: { dir: plugins }
registry: { dir: registry }
credentials:
  - { id: main, community: public }
devices:
  - { address: 192.0.2.1, credentials: [missing] }
"#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_ambiguous_device() {
        let config = config(
            r#"
plugins: { dir: plugins }
registry: { dir: registry }
devices:
  - { address: 192.0.2.1, cidr: 192.0.2.0/24 }
"#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_wide_cidr() {
        let config = config(
            r#"
plugins: { dir: plugins }
registry: { dir: registry }
devices:
  - { cidr: 10.0.0.0/8 }
"#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_request_size() {
        let config = config(
            r#"
max_request_size: 0
plugins: { dir: plugins }
registry: { dir: registry }
"#,
        );
        assert!(config.validate().is_err());
    }
}
