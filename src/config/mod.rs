//! Configuration module.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Collection settings (cycle time, request sizing)
//! - Plugin and registry directories
//! - Credential sets and the polled device list

mod app;
mod validation;

pub use app::{AppConfig, CredentialDecl, DeviceDecl, PluginsConfig, RegistryConfig};
pub use validation::{check_cidr, cidr_contains, expand_cidr, ConfigError, MIN_CIDR_PREFIX};

// Re-export constants
pub use app::{DEFAULT_CYCLE_TIME, DEFAULT_MAX_REQUEST_SIZE, DEFAULT_PLUGIN_DOCUMENT};
