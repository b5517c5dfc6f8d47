//! Topograph - Network Topology Collector
//!
//! This crate polls a fleet of network devices over SNMP-style
//! request/response exchanges, converts vendor-specific answers into a
//! generic entity model via declarative, capability-selected extraction
//! rules, and maps the result onto a graph of devices, interfaces and the
//! cables between them.
//!
//! # Architecture
//!
//! - **protocol**: identifiers, request/response units, the transport seam,
//!   the size-bounded multi-credential walker, and a simulated fleet
//! - **registry**: symbolic name → numeric identifier resolution
//! - **plugin**: declarative extraction documents, capability selection
//! - **extract**: the rule interpreter running before and after each walk
//! - **template**: per-class attribute schemas and decode rules
//! - **analyze**: per-class mapping onto the downstream graph store
//! - **poller**: the per-cycle collection scheduler
//! - **config**: YAML configuration with validation

pub mod analyze;
pub mod config;
pub mod extract;
pub mod plugin;
pub mod poller;
pub mod protocol;
pub mod registry;
pub mod template;

pub use analyze::{analyze, GraphStore, MemoryGraph};
pub use config::{AppConfig, ConfigError};
pub use extract::ExtractionEngine;
pub use plugin::{PluginDocument, PluginStore};
pub use poller::Poller;
pub use protocol::{CredentialSet, Oid, Pdu, Transport, Walker};
pub use registry::{FileRegistry, SymbolRegistry};
pub use template::{Template, TemplateClass};
