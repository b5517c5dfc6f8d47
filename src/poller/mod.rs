//! Collection scheduler.
//!
//! Each cycle takes a fresh device list from the configuration and spawns
//! one capability probe per device. A successful capability probe selects
//! the device's plugin document and fans out the five dependent probes;
//! a failed one skips the device until the next cycle. The loop never waits
//! on the probes it launched: it sleeps out the remainder of the cycle time
//! as soon as the batch is issued, so a stalled device delays only its own
//! operation. Shutdown is observed between cycles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::analyze::{analyze, GraphStore};
use crate::config::AppConfig;
use crate::extract::ExtractionEngine;
use crate::plugin::{PluginDocument, PluginStore};
use crate::protocol::{CredentialSet, Transport, Walker};
use crate::registry::SymbolRegistry;
use crate::template::{Template, TemplateClass};

/// The probes fanned out after a successful capability probe.
const DEPENDENT_CLASSES: [TemplateClass; 5] = [
    TemplateClass::Device,
    TemplateClass::Interface,
    TemplateClass::LldpLocalPort,
    TemplateClass::LldpRemotePort,
    TemplateClass::LldpRemoteSystem,
];

/// What the last successful capability probe learned about a device.
#[derive(Debug)]
pub struct DeviceCapability {
    /// The reported object identifier, when the device produced one.
    pub reported_id: Option<String>,
    /// The plugin document selected for it.
    pub document: Arc<PluginDocument>,
}

struct PollerInner {
    config: AppConfig,
    plugins: PluginStore,
    registry: Arc<dyn SymbolRegistry>,
    transport: Arc<dyn Transport>,
    graph: Arc<dyn GraphStore>,
    capabilities: RwLock<HashMap<String, Arc<DeviceCapability>>>,
}

/// Drives collection cycles against the configured fleet.
pub struct Poller {
    inner: Arc<PollerInner>,
}

impl Poller {
    pub fn new(
        config: AppConfig,
        plugins: PluginStore,
        registry: Arc<dyn SymbolRegistry>,
        transport: Arc<dyn Transport>,
        graph: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                config,
                plugins,
                registry,
                transport,
                graph,
                capabilities: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The capability record of a device, from its last successful probe.
    pub async fn capability(&self, address: &str) -> Option<Arc<DeviceCapability>> {
        self.inner.capabilities.read().await.get(address).cloned()
    }

    /// Run cycles until a shutdown signal arrives. Each cycle is issued and
    /// left to run on its own; the loop never blocks on probe completion,
    /// and the signal is only observed between cycles.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            cycle_time = ?self.inner.config.cycle_time,
            devices = self.inner.config.device_addresses().len(),
            "poller started"
        );
        loop {
            let started = Instant::now();
            // Dropping the handles detaches the probe tasks.
            let devices = self.spawn_cycle(Utc::now()).len();

            let elapsed = started.elapsed();
            debug!(devices, elapsed_ms = elapsed.as_millis() as u64, "cycle issued");
            match self.inner.config.cycle_time.checked_sub(elapsed) {
                Some(remaining) => {
                    tokio::select! {
                        _ = tokio::time::sleep(remaining) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                None => {
                    warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        "cycle overran its cycle_time, starting next immediately"
                    );
                }
            }
            if *shutdown.borrow() {
                info!("poller shutting down");
                return;
            }
        }
    }

    /// Fan out one cycle: a capability probe per configured device address.
    /// Exposed so tests can await a single deterministic cycle.
    pub fn spawn_cycle(&self, cycle_ts: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        self.inner
            .config
            .device_addresses()
            .into_iter()
            .map(|address| {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    capability_probe(inner, address, cycle_ts).await;
                })
            })
            .collect()
    }
}

/// Probe one device's capability identifier, select its plugin document and
/// fan out the dependent probes.
async fn capability_probe(inner: Arc<PollerInner>, address: String, cycle_ts: DateTime<Utc>) {
    let credentials = inner.config.credentials_for(&address);
    if credentials.is_empty() {
        warn!(device = %address, "no credential sets configured, skipping");
        return;
    }

    // Start from the document selected last cycle so vendor-specific
    // capability rules apply; first contact uses the default.
    let document = match inner.capabilities.read().await.get(&address) {
        Some(capability) => Arc::clone(&capability.document),
        None => inner.plugins.default_document(),
    };

    let engine = ExtractionEngine::new(&inner.plugins, inner.registry.as_ref());
    let mut template = Template::new(TemplateClass::Capability, &address, cycle_ts);
    let request = engine.prepare(&mut template, &document);
    if request.is_empty() {
        warn!(device = %address, "capability probe has nothing to request");
        return;
    }

    let walker = Walker::new(inner.transport.as_ref(), inner.config.max_request_size);
    let rows = walker
        .run(&address, &credentials, request, template.class().operation())
        .await;
    let Some(row) = rows.first() else {
        debug!(device = %address, "capability probe got no response, skipping dependents");
        return;
    };

    let resolved = engine.resolve(&template, &document, row);
    let reported_id = resolved.value_text("objectId");
    let selected = inner.plugins.select(reported_id.as_deref());
    debug!(
        device = %address,
        reported_id = reported_id.as_deref().unwrap_or(""),
        document = %selected.name,
        "capability probe succeeded"
    );
    inner.capabilities.write().await.insert(
        address.clone(),
        Arc::new(DeviceCapability {
            reported_id,
            document: Arc::clone(&selected),
        }),
    );

    let handles: Vec<JoinHandle<()>> = DEPENDENT_CLASSES
        .into_iter()
        .map(|class| {
            let inner = Arc::clone(&inner);
            let address = address.clone();
            let credentials = credentials.clone();
            let document = Arc::clone(&selected);
            tokio::spawn(async move {
                entity_probe(inner, address, credentials, document, class, cycle_ts).await;
            })
        })
        .collect();
    for handle in handles {
        if let Err(err) = handle.await {
            warn!(device = %address, error = %err, "entity probe task failed");
        }
    }
}

/// Walk one entity class of one device and feed every resolved row to the
/// analyzer.
async fn entity_probe(
    inner: Arc<PollerInner>,
    address: String,
    credentials: Vec<CredentialSet>,
    document: Arc<PluginDocument>,
    class: TemplateClass,
    cycle_ts: DateTime<Utc>,
) {
    let engine = ExtractionEngine::new(&inner.plugins, inner.registry.as_ref());
    let mut template = Template::new(class, &address, cycle_ts);
    let request = engine.prepare(&mut template, &document);
    if request.is_empty() {
        debug!(device = %address, class = class.name(), "no rules to request");
        return;
    }

    let walker = Walker::new(inner.transport.as_ref(), inner.config.max_request_size);
    let rows = walker
        .run(&address, &credentials, request, class.operation())
        .await;
    debug!(device = %address, class = class.name(), rows = rows.len(), "probe finished");

    for row in &rows {
        let resolved = engine.resolve(&template, &document, row);
        if let Err(err) = analyze(&resolved, inner.graph.as_ref()) {
            warn!(device = %address, class = class.name(), error = %err, "analyze failed");
        }
    }
}
