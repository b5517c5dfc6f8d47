//! In-memory [`GraphStore`] used by the binary and the tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{GraphError, GraphStore, InterfaceKey, NodeId, Relation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Device,
    Interface,
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    deleted: bool,
    /// Owning device, interfaces only.
    owner: Option<NodeId>,
    /// Identity keys; these survive [`GraphStore::clear`].
    keys: BTreeMap<&'static str, String>,
    props: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: Vec<Node>,
    links: Vec<(NodeId, NodeId, Relation)>,
}

/// Thread-safe in-memory graph with the same matching rules the downstream
/// store applies: devices unique by chassis id or address (merged when both
/// keys turn out to name the same box), interfaces unique per device by any
/// of their identity keys.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    inner: Mutex<Inner>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, GraphError> {
        self.inner
            .lock()
            .map_err(|_| GraphError::Store("graph lock poisoned".into()))
    }

    pub fn device_by_address(&self, address: &str) -> Option<NodeId> {
        let inner = self.inner.lock().ok()?;
        inner.find_device("snmpAddress", address)
    }

    pub fn device_by_chassis(&self, chassis_id: &str) -> Option<NodeId> {
        let inner = self.inner.lock().ok()?;
        inner.find_device("chassisId", chassis_id)
    }

    pub fn device_count(&self) -> usize {
        self.inner.lock().map_or(0, |inner| {
            inner
                .nodes
                .iter()
                .filter(|n| n.kind == NodeKind::Device && !n.deleted)
                .count()
        })
    }

    pub fn interface_count(&self, device: NodeId) -> usize {
        self.inner.lock().map_or(0, |inner| {
            inner
                .nodes
                .iter()
                .filter(|n| !n.deleted && n.owner == Some(device))
                .count()
        })
    }

    pub fn linked(&self, a: NodeId, b: NodeId, relation: Relation) -> bool {
        self.inner
            .lock()
            .map_or(false, |inner| inner.has_link(a, b, relation))
    }

    pub fn link_count(&self) -> usize {
        self.inner.lock().map_or(0, |inner| inner.links.len())
    }
}

impl Inner {
    fn find_device(&self, key: &'static str, value: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| {
            n.kind == NodeKind::Device && !n.deleted && n.keys.get(key).map(String::as_str) == Some(value)
        }).map(|i| i as NodeId)
    }

    fn create(&mut self, kind: NodeKind, owner: Option<NodeId>) -> NodeId {
        self.nodes.push(Node {
            kind,
            deleted: false,
            owner,
            keys: BTreeMap::new(),
            props: BTreeMap::new(),
        });
        (self.nodes.len() - 1) as NodeId
    }

    fn has_link(&self, a: NodeId, b: NodeId, relation: Relation) -> bool {
        self.links.iter().any(|&(x, y, r)| {
            r == relation
                && ((x == a && y == b)
                    || (relation == Relation::Cable && x == b && y == a))
        })
    }

    /// Fold node `from` into `into`: missing properties and keys carry
    /// over, links re-point, `from` is tombstoned.
    fn fold_node(&mut self, into: NodeId, from: NodeId) {
        let (keys, props) = {
            let node = &self.nodes[from as usize];
            (node.keys.clone(), node.props.clone())
        };
        for (key, value) in keys {
            self.nodes[into as usize].keys.entry(key).or_insert(value);
        }
        for (prop, value) in props {
            self.nodes[into as usize].props.entry(prop).or_insert(value);
        }
        let mut repointed = Vec::new();
        self.links.retain(|&(a, b, r)| {
            if a == from || b == from {
                let a = if a == from { into } else { a };
                let b = if b == from { into } else { b };
                repointed.push((a, b, r));
                false
            } else {
                true
            }
        });
        for (a, b, r) in repointed {
            if a != b && !self.has_link(a, b, r) {
                self.links.push((a, b, r));
            }
        }
        self.nodes[from as usize].deleted = true;
    }

    /// Merge device `from` into `into`. Interfaces of `from` re-home to
    /// `into`; one sharing an identity key value with an existing interface
    /// folds into it, since both described the same port.
    fn merge_devices(&mut self, into: NodeId, from: NodeId) {
        let moved: Vec<NodeId> = self
            .interfaces_of(from)
            .map(|(id, _)| id)
            .collect();
        for iface in moved {
            let twin = self.interfaces_of(into).find_map(|(id, node)| {
                let keys = &self.nodes[iface as usize].keys;
                node.keys
                    .iter()
                    .any(|(k, v)| keys.get(k) == Some(v))
                    .then_some(id)
            });
            match twin {
                Some(twin) => self.fold_node(twin, iface),
                None => self.nodes[iface as usize].owner = Some(into),
            }
        }
        self.fold_node(into, from);
    }

    fn interfaces_of(&self, device: NodeId) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| !n.deleted && n.owner == Some(device))
            .map(|(i, n)| (i as NodeId, n))
    }

    fn find_interface(
        &self,
        device: NodeId,
        key: &'static str,
        value: &str,
    ) -> Option<NodeId> {
        self.interfaces_of(device)
            .find(|(_, n)| n.keys.get(key).map(String::as_str) == Some(value))
            .map(|(id, _)| id)
    }

    fn get_or_create_interface(
        &mut self,
        device: NodeId,
        by: &'static str,
        value: &str,
        key: &InterfaceKey,
    ) -> NodeId {
        let id = match self.find_interface(device, by, value) {
            Some(id) => id,
            None => {
                let id = self.create(NodeKind::Interface, Some(device));
                self.nodes[id as usize].keys.insert(by, value.to_string());
                id
            }
        };
        let keys = &mut self.nodes[id as usize].keys;
        for (name, provided) in [
            ("index", &key.index),
            ("alias", &key.alias),
            ("nameX", &key.name),
            ("portnumber", &key.port_number),
        ] {
            if let Some(provided) = provided {
                keys.entry(name).or_insert_with(|| provided.clone());
            }
        }
        id
    }
}

impl GraphStore for MemoryGraph {
    fn device(
        &self,
        chassis_id: Option<&str>,
        address: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let mut inner = self.lock()?;
        let by_chassis = chassis_id.and_then(|c| inner.find_device("chassisId", c));
        let by_address = address.and_then(|a| inner.find_device("snmpAddress", a));

        let id = match (by_chassis, by_address) {
            (Some(a), Some(b)) if a != b => {
                inner.merge_devices(a, b);
                a
            }
            (Some(id), _) | (None, Some(id)) => id,
            (None, None) => {
                if chassis_id.is_none() && address.is_none() {
                    return Err(GraphError::Store("device identity missing".into()));
                }
                inner.create(NodeKind::Device, None)
            }
        };
        let keys = &mut inner.nodes[id as usize].keys;
        if let Some(chassis_id) = chassis_id {
            keys.entry("chassisId").or_insert_with(|| chassis_id.to_string());
        }
        if let Some(address) = address {
            keys.entry("snmpAddress").or_insert_with(|| address.to_string());
        }
        Ok(id)
    }

    fn interface(&self, device: NodeId, key: &InterfaceKey) -> Result<NodeId, GraphError> {
        let mut inner = self.lock()?;
        let hit = |inner: &Inner, field: &'static str, value: &Option<String>| {
            value
                .as_ref()
                .and_then(|v| inner.find_interface(device, field, v))
                .is_some()
        };
        let hits = [
            hit(&inner, "index", &key.index),
            hit(&inner, "alias", &key.alias),
            hit(&inner, "nameX", &key.name),
            hit(&inner, "portnumber", &key.port_number),
        ];
        let any_hit = hits.iter().any(|h| *h);

        // First provided key with an existing match wins; with no match at
        // all, the first provided key creates.
        let fields = [
            ("index", &key.index, hits[0]),
            ("alias", &key.alias, hits[1]),
            ("nameX", &key.name, hits[2]),
            ("portnumber", &key.port_number, hits[3]),
        ];
        for (field, value, hit) in fields {
            if let Some(value) = value {
                if hit || !any_hit {
                    return Ok(inner.get_or_create_interface(device, field, value, key));
                }
            }
        }
        Err(GraphError::Store("interface identity missing".into()))
    }

    fn update(
        &self,
        node: NodeId,
        property: &str,
        value: serde_json::Value,
    ) -> Result<(), GraphError> {
        let mut inner = self.lock()?;
        inner.nodes[node as usize]
            .props
            .insert(property.to_string(), value);
        Ok(())
    }

    fn property(
        &self,
        node: NodeId,
        property: &str,
    ) -> Result<Option<serde_json::Value>, GraphError> {
        let inner = self.lock()?;
        Ok(inner.nodes[node as usize].props.get(property).cloned())
    }

    fn clear(&self, node: NodeId) -> Result<(), GraphError> {
        let mut inner = self.lock()?;
        inner.nodes[node as usize].props.clear();
        Ok(())
    }

    fn link(&self, a: NodeId, b: NodeId, relation: Relation) -> Result<(), GraphError> {
        let mut inner = self.lock()?;
        if !inner.has_link(a, b, relation) {
            inner.links.push((a, b, relation));
        }
        Ok(())
    }
}
