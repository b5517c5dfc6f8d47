//! End-to-end collection cycle over the shipped demo fixtures: two
//! simulated devices that see each other over LLDP.

use std::sync::Arc;

use chrono::Utc;

use topograph::analyze::{GraphStore, InterfaceKey, MemoryGraph, Relation};
use topograph::config::AppConfig;
use topograph::plugin::PluginStore;
use topograph::poller::Poller;
use topograph::protocol::sim::FleetTransport;
use topograph::registry::FileRegistry;

fn demo_poller() -> (Poller, Arc<MemoryGraph>) {
    let config = AppConfig::load("configs/config.yaml").expect("demo config loads");
    let registry = FileRegistry::load(&config.registry.dir).expect("registry loads");
    let plugins =
        PluginStore::load(&config.plugins.dir, &config.plugins.default).expect("plugins load");
    let fleet_path = config.fleet.clone().expect("fleet fixture configured");
    let transport = FleetTransport::load(fleet_path).expect("fleet loads");

    let graph = Arc::new(MemoryGraph::new());
    let poller = Poller::new(
        config,
        plugins,
        Arc::new(registry),
        Arc::new(transport),
        graph.clone(),
    );
    (poller, graph)
}

async fn run_one_cycle(poller: &Poller) {
    for handle in poller.spawn_cycle(Utc::now()) {
        handle.await.expect("probe task completes");
    }
}

#[tokio::test]
async fn test_full_cycle_builds_topology() {
    let (poller, graph) = demo_poller();
    run_one_cycle(&poller).await;

    // Capability selection: the switch matched the vendor document, the
    // router fell back to the default.
    let switch = poller.capability("192.0.2.1").await.expect("switch probed");
    assert_eq!(switch.document.name, "cisco");
    assert_eq!(switch.reported_id.as_deref(), Some("1.3.6.1.4.1.9.1.716"));
    let router = poller.capability("192.0.2.2").await.expect("router probed");
    assert_eq!(router.document.name, "default");

    // Both boxes landed, keyed by chassis id and address alike.
    assert_eq!(graph.device_count(), 2);
    let edge = graph.device_by_address("192.0.2.1").expect("switch node");
    assert_eq!(graph.device_by_chassis("00:11:22:33:44:01"), Some(edge));
    let core = graph.device_by_address("192.0.2.2").expect("router node");
    assert_eq!(graph.device_by_chassis("00:11:22:33:44:02"), Some(core));

    // Vendor overrides apply on top of default rules.
    assert_eq!(
        graph.property(edge, "brand").unwrap(),
        Some(serde_json::json!("Cisco"))
    );
    assert_eq!(
        graph.property(edge, "model").unwrap(),
        Some(serde_json::json!("C2960 Software (C2960-LANBASEK9-M)"))
    );
    assert_eq!(
        graph.property(edge, "name").unwrap(),
        Some(serde_json::json!("edge-1"))
    );
    assert_eq!(
        graph.property(core, "name").unwrap(),
        Some(serde_json::json!("core-1"))
    );
    assert_eq!(
        graph.property(core, "numberOfIf").unwrap(),
        Some(serde_json::json!(1))
    );
    // The router has no vendor document, so brand stays unset.
    assert_eq!(graph.property(core, "brand").unwrap(), None);
}

#[tokio::test]
async fn test_full_cycle_resolves_interfaces() {
    let (poller, graph) = demo_poller();
    run_one_cycle(&poller).await;

    let edge = graph.device_by_address("192.0.2.1").expect("switch node");
    let gi1 = graph
        .interface(edge, &InterfaceKey {
            index: Some("1".into()),
            ..InterfaceKey::default()
        })
        .expect("Gi0/1 row");

    assert_eq!(
        graph.property(gi1, "name").unwrap(),
        Some(serde_json::json!("GigabitEthernet0/1"))
    );
    assert_eq!(
        graph.property(gi1, "nameX").unwrap(),
        Some(serde_json::json!("Gi0/1"))
    );
    // Enumerated syntaxes come back symbolic.
    assert_eq!(
        graph.property(gi1, "adminStatus").unwrap(),
        Some(serde_json::json!("up"))
    );
    assert_eq!(
        graph.property(gi1, "media").unwrap(),
        Some(serde_json::json!("physical"))
    );
    assert_eq!(
        graph.property(gi1, "mtu").unwrap(),
        Some(serde_json::json!(1500))
    );
    assert_eq!(
        graph.property(gi1, "lastChange").unwrap(),
        Some(serde_json::json!(2500))
    );

    // Port 2 is operationally down and carries no alias.
    let gi2 = graph
        .interface(edge, &InterfaceKey {
            index: Some("2".into()),
            ..InterfaceKey::default()
        })
        .expect("Gi0/2 row");
    assert_eq!(
        graph.property(gi2, "operStatus").unwrap(),
        Some(serde_json::json!("down"))
    );
    assert_eq!(graph.property(gi2, "alias").unwrap(), None);
}

#[tokio::test]
async fn test_full_cycle_cables_the_link() {
    let (poller, graph) = demo_poller();
    run_one_cycle(&poller).await;

    let edge = graph.device_by_address("192.0.2.1").expect("switch node");
    let core = graph.device_by_address("192.0.2.2").expect("router node");

    // LLDP local ports are keyed by the reported interface name.
    let edge_port = graph
        .interface(edge, &InterfaceKey {
            name: Some("Gi0/1".into()),
            ..InterfaceKey::default()
        })
        .expect("switch uplink port");
    let core_port = graph
        .interface(core, &InterfaceKey {
            name: Some("ge-0/0/0".into()),
            ..InterfaceKey::default()
        })
        .expect("router downlink port");

    assert!(graph.linked(edge, edge_port, Relation::Has));
    assert!(graph.linked(core, core_port, Relation::Has));
    assert!(graph.linked(edge_port, core_port, Relation::Cable));
    assert!(graph.linked(core_port, edge_port, Relation::Cable));

    assert_eq!(
        graph.property(core_port, "description").unwrap(),
        Some(serde_json::json!("to edge-1"))
    );
}

#[tokio::test]
async fn test_second_cycle_is_idempotent() {
    let (poller, graph) = demo_poller();
    run_one_cycle(&poller).await;
    let devices = graph.device_count();
    let links = graph.link_count();

    run_one_cycle(&poller).await;
    assert_eq!(graph.device_count(), devices);
    assert_eq!(graph.link_count(), links);
}
