//! Transport seam between the walker and the wire.
//!
//! The walker only ever needs one primitive: send a request under one
//! credential set and maybe get a response back. Retries and timeouts are
//! the transport's concern, bounded by the credential set it is handed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::pdu::Pdu;

/// Default exchange timeout (1.5 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1500);

/// Default number of retries per exchange.
pub const DEFAULT_RETRIES: u32 = 2;

/// Default management port.
pub const DEFAULT_PORT: u16 = 161;

fn default_version() -> SnmpVersion {
    SnmpVersion::V2c
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Protocol version of a credential set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnmpVersion {
    #[serde(rename = "1")]
    V1,
    #[serde(rename = "2c")]
    V2c,
    #[serde(rename = "3")]
    V3,
}

/// One authentication tuple for a device. Devices carry an ordered list of
/// these; the walker tries them in order until one yields a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSet {
    /// Protocol version (default: 2c).
    #[serde(default = "default_version")]
    pub version: SnmpVersion,

    /// Shared secret.
    pub community: String,

    /// Retries per exchange (default: 2).
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Timeout per exchange attempt (default: 1500ms).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Management port (default: 161).
    #[serde(default = "default_port")]
    pub port: u16,
}

impl CredentialSet {
    pub fn new(community: impl Into<String>) -> Self {
        Self {
            version: SnmpVersion::V2c,
            community: community.into(),
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            port: DEFAULT_PORT,
        }
    }
}

/// Wire form of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    /// Read the named instances.
    Get,
    /// Read the lexicographic successors of the named identifiers.
    Next,
}

/// One request/response exchange against one device.
///
/// `None` means the exchange yielded nothing within the credential set's
/// own retry/timeout budget. That is a normal outcome, not an error.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(
        &self,
        device: &str,
        credentials: &CredentialSet,
        request: &Pdu,
        kind: PduKind,
    ) -> Option<Pdu>;
}
