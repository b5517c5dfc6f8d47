//! Fixture-driven simulated device fleet.
//!
//! The wire codec is owned by an external transport collaborator, so the
//! crate ships a [`Transport`] over an in-memory fleet instead: each
//! simulated device is a community string plus a sorted identifier/value
//! map. Get answers exact instances, next answers lexicographic successors,
//! and a community mismatch behaves like a timeout. The demo binary and the
//! integration tests run against this.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use super::oid::{Oid, ParseOidError};
use super::pdu::{Pdu, Value, VarBind};
use super::transport::{CredentialSet, PduKind, Transport};

/// Errors raised while loading a fleet fixture.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Failed to read the fixture file.
    #[error("failed to read fleet fixture: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the fixture YAML.
    #[error("failed to parse fleet fixture: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value key is not a valid identifier.
    #[error(transparent)]
    Oid(#[from] ParseOidError),

    /// A value is of a kind the simulation cannot represent.
    #[error("device '{device}': unsupported value for '{oid}'")]
    UnsupportedValue { device: String, oid: String },
}

/// On-disk shape of a fleet fixture.
#[derive(Debug, Default, Deserialize)]
pub struct FleetSpec {
    #[serde(default)]
    pub devices: HashMap<String, DeviceSpec>,
}

/// One simulated device: the community it answers to and its value tree.
#[derive(Debug, Deserialize)]
pub struct DeviceSpec {
    pub community: String,
    #[serde(default)]
    pub values: BTreeMap<String, serde_yaml::Value>,
}

struct SimDevice {
    community: String,
    values: BTreeMap<Oid, Value>,
}

/// In-memory [`Transport`] over a simulated fleet.
pub struct FleetTransport {
    devices: HashMap<String, SimDevice>,
}

impl FleetTransport {
    /// Load a fleet fixture from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FleetError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let spec: FleetSpec = serde_yaml::from_str(&content)?;
        Self::from_spec(spec)
    }

    pub fn from_spec(spec: FleetSpec) -> Result<Self, FleetError> {
        let mut devices = HashMap::new();
        for (address, device) in spec.devices {
            let mut values = BTreeMap::new();
            for (key, raw) in &device.values {
                let oid: Oid = key.parse()?;
                let value = convert(raw).ok_or_else(|| FleetError::UnsupportedValue {
                    device: address.clone(),
                    oid: key.clone(),
                })?;
                values.insert(oid, value);
            }
            devices.insert(
                address,
                SimDevice {
                    community: device.community,
                    values,
                },
            );
        }
        Ok(Self { devices })
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}

fn convert(raw: &serde_yaml::Value) -> Option<Value> {
    match raw {
        serde_yaml::Value::Number(n) => n.as_i64().map(Value::Int),
        serde_yaml::Value::String(s) => Some(Value::Text(s.clone())),
        serde_yaml::Value::Null => Some(Value::Null),
        _ => None,
    }
}

#[async_trait::async_trait]
impl Transport for FleetTransport {
    async fn exchange(
        &self,
        device: &str,
        credentials: &CredentialSet,
        request: &Pdu,
        kind: PduKind,
    ) -> Option<Pdu> {
        let sim = self.devices.get(device)?;
        if sim.community != credentials.community {
            return None;
        }

        let mut response = Pdu::with_id(request.request_id());
        for vb in &request.bindings {
            let answered = match kind {
                PduKind::Get => sim
                    .values
                    .get(&vb.oid)
                    .map(|v| VarBind::new(vb.oid.clone(), v.clone())),
                PduKind::Next => sim
                    .values
                    .range((Bound::Excluded(vb.oid.clone()), Bound::Unbounded))
                    .next()
                    .map(|(o, v)| VarBind::new(o.clone(), v.clone())),
            };
            response.push(answered.unwrap_or_else(|| VarBind::unset(vb.oid.clone())));
        }
        Some(response)
    }
}
