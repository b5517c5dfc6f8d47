//! Configuration validation utilities and network range expansion.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Shortest prefix accepted for polled device blocks. Anything wider
/// expands to more hosts than one poller should ever fan out to.
pub const MIN_CIDR_PREFIX: u8 = 16;

fn parse_cidr(cidr: &str) -> Result<(Ipv4Addr, u8), ConfigError> {
    let invalid = || ConfigError::ValidationError(format!("invalid CIDR block: '{cidr}'"));
    let (addr, len) = cidr.split_once('/').ok_or_else(invalid)?;
    let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
    let len: u8 = len.parse().map_err(|_| invalid())?;
    if len > 32 {
        return Err(invalid());
    }
    Ok((addr, len))
}

/// Check a device CIDR block without expanding it.
pub fn check_cidr(cidr: &str) -> Result<(), ConfigError> {
    let (_, len) = parse_cidr(cidr)?;
    if len < MIN_CIDR_PREFIX {
        return Err(ConfigError::ValidationError(format!(
            "CIDR block '{cidr}' is wider than /{MIN_CIDR_PREFIX}"
        )));
    }
    Ok(())
}

fn mask(len: u8) -> u32 {
    if len == 0 {
        0
    } else {
        u32::MAX << (32 - len)
    }
}

/// Expand an IPv4 CIDR block to its host addresses. Network and broadcast
/// addresses are skipped for prefixes shorter than /31; blocks wider than
/// the accepted floor are rejected.
pub fn expand_cidr(cidr: &str) -> Result<Vec<String>, ConfigError> {
    check_cidr(cidr)?;
    let (addr, len) = parse_cidr(cidr)?;
    let base = u32::from(addr) & mask(len);
    let size: u64 = 1u64 << (32 - len);

    let range: Box<dyn Iterator<Item = u64>> = if len >= 31 {
        Box::new(0..size)
    } else {
        Box::new(1..size - 1)
    };
    Ok(range
        .map(|offset| Ipv4Addr::from(base + offset as u32).to_string())
        .collect())
}

/// Whether an address falls within a CIDR block.
pub fn cidr_contains(cidr: &str, address: &str) -> Result<bool, ConfigError> {
    let (net, len) = parse_cidr(cidr)?;
    let Ok(address) = address.parse::<Ipv4Addr>() else {
        return Ok(false);
    };
    Ok(u32::from(address) & mask(len) == u32::from(net) & mask(len))
}
