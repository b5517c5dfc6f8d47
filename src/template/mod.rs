//! Collection templates: the fixed slot tables each probe fills.
//!
//! A template names a class, its attribute slots and how each raw value is
//! decoded once extraction has resolved it. Slots fill at most once per
//! resolution; a later write to a filled slot is ignored.

use chrono::{DateTime, Utc};

use crate::protocol::{Oid, OperationKind};

/// The six collected classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateClass {
    Capability,
    Device,
    Interface,
    LldpLocalPort,
    LldpRemotePort,
    LldpRemoteSystem,
}

impl TemplateClass {
    /// Class name as used in plugin documents.
    pub fn name(self) -> &'static str {
        match self {
            TemplateClass::Capability => "capability",
            TemplateClass::Device => "device",
            TemplateClass::Interface => "interface",
            TemplateClass::LldpLocalPort => "lldpLocalPort",
            TemplateClass::LldpRemotePort => "lldpRemotePort",
            TemplateClass::LldpRemoteSystem => "lldpRemoteSystem",
        }
    }

    /// Scalar classes read named instances; tabular classes are walked.
    pub fn operation(self) -> OperationKind {
        match self {
            TemplateClass::Capability | TemplateClass::Device => OperationKind::Get,
            _ => OperationKind::Walk,
        }
    }

    pub fn slots(self) -> &'static [SlotDef] {
        match self {
            TemplateClass::Capability => CAPABILITY_SLOTS,
            TemplateClass::Device => DEVICE_SLOTS,
            TemplateClass::Interface => INTERFACE_SLOTS,
            TemplateClass::LldpLocalPort => LLDP_LOCAL_PORT_SLOTS,
            TemplateClass::LldpRemotePort => LLDP_REMOTE_PORT_SLOTS,
            TemplateClass::LldpRemoteSystem => LLDP_REMOTE_SYSTEM_SLOTS,
        }
    }
}

/// How a resolved text value becomes a typed attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decode {
    /// Keep the text as-is.
    Text,
    /// Parse as a signed integer.
    Int,
    /// Hundredths of a second to milliseconds.
    TicksToMillis,
    /// Hundredths of a second of age to an epoch-millisecond timestamp,
    /// anchored at the collection cycle.
    TicksToEpoch,
}

/// One attribute slot of a template class.
#[derive(Debug, Clone, Copy)]
pub struct SlotDef {
    pub name: &'static str,
    pub decode: Decode,
}

const fn text(name: &'static str) -> SlotDef {
    SlotDef {
        name,
        decode: Decode::Text,
    }
}

const fn int(name: &'static str) -> SlotDef {
    SlotDef {
        name,
        decode: Decode::Int,
    }
}

const CAPABILITY_SLOTS: &[SlotDef] = &[text("objectId")];

const DEVICE_SLOTS: &[SlotDef] = &[
    text("description"),
    SlotDef {
        name: "uptime",
        decode: Decode::TicksToEpoch,
    },
    text("contact"),
    text("name"),
    text("location"),
    int("services"),
    text("serial"),
    text("brand"),
    text("model"),
    int("numberOfIf"),
    text("chassisSubtype"),
    text("chassisId"),
];

const INTERFACE_SLOTS: &[SlotDef] = &[
    int("index"),
    text("adminStatus"),
    text("operStatus"),
    text("name"),
    text("description"),
    text("media"),
    SlotDef {
        name: "lastChange",
        decode: Decode::TicksToMillis,
    },
    int("mtu"),
    text("type"),
    text("alias"),
    text("nameX"),
];

const LLDP_LOCAL_PORT_SLOTS: &[SlotDef] = &[text("subtype"), text("id"), text("portnumber")];

const LLDP_REMOTE_PORT_SLOTS: &[SlotDef] = &[
    text("localPort"),
    text("index"),
    text("chassisSubtype"),
    text("chassisId"),
    text("subtype"),
    text("id"),
    text("description"),
    text("systemName"),
    text("systemDescription"),
];

const LLDP_REMOTE_SYSTEM_SLOTS: &[SlotDef] = &[text("ifSubtype"), text("ifId")];

#[derive(Debug, Clone)]
struct Slot {
    def: SlotDef,
    value: Option<serde_json::Value>,
    oid: Option<Oid>,
}

/// One class instance being filled for one device during one cycle.
#[derive(Debug, Clone)]
pub struct Template {
    class: TemplateClass,
    slots: Vec<Slot>,
    device: String,
    cycle_ts: DateTime<Utc>,
}

impl Template {
    pub fn new(class: TemplateClass, device: &str, cycle_ts: DateTime<Utc>) -> Self {
        Self {
            class,
            slots: class
                .slots()
                .iter()
                .map(|def| Slot {
                    def: *def,
                    value: None,
                    oid: None,
                })
                .collect(),
            device: device.to_string(),
            cycle_ts,
        }
    }

    pub fn class(&self) -> TemplateClass {
        self.class
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn cycle_ts(&self) -> DateTime<Utc> {
        self.cycle_ts
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.def.name == name)
    }

    /// Fill a slot from resolved text. Blank text leaves the slot unset, a
    /// filled slot keeps its first value, and a value the decode cannot
    /// parse leaves the slot unset.
    pub fn set_value(&mut self, name: &str, raw: &str) {
        let cycle_ts = self.cycle_ts;
        let Some(slot) = self.slots.iter_mut().find(|slot| slot.def.name == name) else {
            return;
        };
        if slot.value.is_some() {
            return;
        }
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return;
        }
        slot.value = decode(slot.def.decode, trimmed, cycle_ts);
    }

    /// Record the identifier a slot is requested under. Like values, the
    /// first write wins.
    pub fn set_oid(&mut self, name: &str, oid: Oid) {
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.def.name == name) {
            if slot.oid.is_none() {
                slot.oid = Some(oid);
            }
        }
    }

    pub fn value(&self, name: &str) -> Option<&serde_json::Value> {
        self.slots
            .iter()
            .find(|slot| slot.def.name == name)?
            .value
            .as_ref()
    }

    /// Text view of a slot's decoded value.
    pub fn value_text(&self, name: &str) -> Option<String> {
        match self.value(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn oid(&self, name: &str) -> Option<&Oid> {
        self.slots
            .iter()
            .find(|slot| slot.def.name == name)?
            .oid
            .as_ref()
    }

    /// All filled attributes, in slot order.
    pub fn attributes(&self) -> Vec<(&'static str, serde_json::Value)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.value.clone().map(|v| (slot.def.name, v)))
            .collect()
    }
}

fn decode(decode: Decode, raw: &str, cycle_ts: DateTime<Utc>) -> Option<serde_json::Value> {
    match decode {
        Decode::Text => Some(serde_json::Value::String(raw.to_string())),
        Decode::Int => raw.parse::<i64>().ok().map(Into::into),
        Decode::TicksToMillis => raw.parse::<i64>().ok().map(|ticks| (ticks * 10).into()),
        Decode::TicksToEpoch => raw
            .parse::<i64>()
            .ok()
            .map(|ticks| (cycle_ts.timestamp_millis() - ticks * 10).into()),
    }
}
