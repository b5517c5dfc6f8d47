//! Analyzers: map resolved templates onto the downstream graph store.
//!
//! Devices are keyed by chassis id and/or network address, interfaces by
//! whichever of index/alias/name/portnumber the probe produced. Every write
//! is idempotent; a template with unset slots still lands, the missing
//! attributes are simply omitted. Nodes refresh per cycle: a node first seen
//! in an older cycle has its non-identity properties cleared before the new
//! cycle's values land.

mod memory;

use thiserror::Error;
use tracing::debug;

pub use memory::MemoryGraph;

use crate::template::{Template, TemplateClass};

/// Handle to a graph node.
pub type NodeId = u64;

/// Link kinds between graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// Device owns interface. Directional.
    Has,
    /// Physical connection between two interfaces. Symmetric.
    Cable,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph store failure: {0}")]
    Store(String),
}

/// Identity keys of an interface node. Matching tries `index`, `alias`,
/// `name`, `port_number` in that order: the first provided key with an
/// existing match wins, and any provided key creates when nothing matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceKey {
    pub index: Option<String>,
    pub alias: Option<String>,
    pub name: Option<String>,
    pub port_number: Option<String>,
}

/// Downstream graph store.
pub trait GraphStore: Send + Sync {
    /// Get-or-create a device node by chassis id and/or address. When both
    /// are given and match two distinct nodes, those nodes merge.
    fn device(
        &self,
        chassis_id: Option<&str>,
        address: Option<&str>,
    ) -> Result<NodeId, GraphError>;

    /// Get-or-create an interface node under a device.
    fn interface(&self, device: NodeId, key: &InterfaceKey) -> Result<NodeId, GraphError>;

    fn update(
        &self,
        node: NodeId,
        property: &str,
        value: serde_json::Value,
    ) -> Result<(), GraphError>;

    fn property(&self, node: NodeId, property: &str)
        -> Result<Option<serde_json::Value>, GraphError>;

    /// Drop a node's non-identity properties.
    fn clear(&self, node: NodeId) -> Result<(), GraphError>;

    /// Idempotent; `Cable` links are direction-insensitive.
    fn link(&self, a: NodeId, b: NodeId, relation: Relation) -> Result<(), GraphError>;
}

/// Route one resolved template to its per-class analyzer.
pub fn analyze(template: &Template, graph: &dyn GraphStore) -> Result<(), GraphError> {
    debug!(
        class = template.class().name(),
        device = template.device(),
        "analyzing template"
    );
    match template.class() {
        // Capability templates drive plugin selection, not the graph.
        TemplateClass::Capability => Ok(()),
        TemplateClass::Device => analyze_device(template, graph),
        TemplateClass::Interface => analyze_interface(template, graph),
        TemplateClass::LldpLocalPort => analyze_lldp_local_port(template, graph),
        TemplateClass::LldpRemotePort => analyze_lldp_remote_port(template, graph),
        TemplateClass::LldpRemoteSystem => analyze_lldp_remote_system(template, graph),
    }
}

fn cycle_ms(template: &Template) -> i64 {
    template.cycle_ts().timestamp_millis()
}

/// Set `cycleTime` on a fresh node; a node carried over from an older cycle
/// is cleared first so stale properties do not survive.
fn refresh_cycle(graph: &dyn GraphStore, node: NodeId, time_ms: i64) -> Result<(), GraphError> {
    match graph.property(node, "cycleTime")? {
        None => graph.update(node, "cycleTime", time_ms.into()),
        Some(seen) if seen.as_i64().is_some_and(|t| t < time_ms) => {
            graph.clear(node)?;
            graph.update(node, "cycleTime", time_ms.into())
        }
        Some(_) => Ok(()),
    }
}

fn update_all(
    graph: &dyn GraphStore,
    node: NodeId,
    template: &Template,
) -> Result<(), GraphError> {
    for (name, value) in template.attributes() {
        graph.update(node, name, value)?;
    }
    Ok(())
}

fn analyze_device(template: &Template, graph: &dyn GraphStore) -> Result<(), GraphError> {
    let chassis = template.value_text("chassisId");
    let device = graph.device(chassis.as_deref(), Some(template.device()))?;
    graph.update(device, "cycleTime", cycle_ms(template).into())?;
    update_all(graph, device, template)
}

fn analyze_interface(template: &Template, graph: &dyn GraphStore) -> Result<(), GraphError> {
    let device = graph.device(None, Some(template.device()))?;
    refresh_cycle(graph, device, cycle_ms(template))?;

    let key = InterfaceKey {
        index: template.value_text("index"),
        alias: template.value_text("alias"),
        name: template.value_text("nameX"),
        ..InterfaceKey::default()
    };
    let iface = graph.interface(device, &key)?;
    refresh_cycle(graph, iface, cycle_ms(template))?;
    graph.link(device, iface, Relation::Has)?;
    update_all(graph, iface, template)
}

/// Port-id subtype dispatch shared by the LLDP analyzers: which identity
/// field the reported id keys.
fn subtype_key(subtype: Option<&str>, id: Option<String>) -> InterfaceKey {
    let mut key = InterfaceKey::default();
    match subtype {
        Some("interfaceAlias") => key.alias = id,
        Some("interfaceName") => key.name = id,
        Some("local") => key.index = id,
        _ => {}
    }
    key
}

fn analyze_lldp_local_port(template: &Template, graph: &dyn GraphStore) -> Result<(), GraphError> {
    let device = graph.device(None, Some(template.device()))?;
    refresh_cycle(graph, device, cycle_ms(template))?;

    let mut key = subtype_key(
        template.value_text("subtype").as_deref(),
        template.value_text("id"),
    );
    key.port_number = template
        .value_text("portnumber")
        .or_else(|| key.index.clone());
    let iface = graph.interface(device, &key)?;
    refresh_cycle(graph, iface, cycle_ms(template))?;
    if let Some(portnumber) = &key.port_number {
        graph.update(iface, "portnumber", portnumber.as_str().into())?;
    }
    Ok(())
}

fn analyze_lldp_remote_port(template: &Template, graph: &dyn GraphStore) -> Result<(), GraphError> {
    let device = graph.device(None, Some(template.device()))?;
    refresh_cycle(graph, device, cycle_ms(template))?;

    let local_key = InterfaceKey {
        port_number: template.value_text("localPort"),
        ..InterfaceKey::default()
    };
    let local_iface = graph.interface(device, &local_key)?;
    refresh_cycle(graph, local_iface, cycle_ms(template))?;
    graph.link(device, local_iface, Relation::Has)?;

    // Without a remote chassis id there is no remote side to record.
    let Some(chassis) = template.value_text("chassisId") else {
        return Ok(());
    };
    let remote_device = graph.device(Some(&chassis), None)?;
    refresh_cycle(graph, remote_device, cycle_ms(template))?;

    let mut remote_key = subtype_key(
        template.value_text("subtype").as_deref(),
        template.value_text("id"),
    );
    if remote_key.index.is_none() {
        remote_key.index = template.value_text("index");
    }
    let remote_iface = graph.interface(remote_device, &remote_key)?;
    refresh_cycle(graph, remote_iface, cycle_ms(template))?;
    graph.link(remote_device, remote_iface, Relation::Has)?;

    if let Some(description) = template.value_text("description") {
        graph.update(remote_iface, "description", description.into())?;
    }
    if let Some(name) = template.value_text("systemName") {
        graph.update(remote_device, "name", name.into())?;
    }
    if let Some(description) = template.value_text("systemDescription") {
        graph.update(remote_device, "description", description.into())?;
    }
    graph.link(local_iface, remote_iface, Relation::Cable)
}

fn analyze_lldp_remote_system(
    template: &Template,
    graph: &dyn GraphStore,
) -> Result<(), GraphError> {
    // Management-address details only refresh the reporting device.
    let device = graph.device(None, Some(template.device()))?;
    refresh_cycle(graph, device, cycle_ms(template))
}
