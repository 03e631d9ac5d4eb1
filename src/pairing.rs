//! The pairing/claim pipeline (§4.2): turns a HAL-discovered device into a persisted,
//! configured, resource-populated one, or rejects it and schedules cleanup. A sequential,
//! fallible, short-circuiting async chain generalized from a discover-then-build-then-poll
//! shape into an eleven-step per-device pipeline.

use crate::cache::DiscoveredCache;
use crate::cluster::{ClusterRegistry, ConfigureContext};
use crate::commfail::CommFailWatchdog;
use crate::hal::{ChangeOrigin, Descriptors, DriverHooks, Hal, Store};
use crate::model::{
    ClusterRecord, ClusterRole, Device, DeviceId, DiscoveredDevice, Endpoint, Eui64, Metadata, PowerSource, Resource,
    ResourceMode,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Step 4's per-device summary, handed to whatever acceptance authority the embedding
/// gateway models above this crate. This crate's only modeled external collaborators
/// are the HAL, the descriptor repository, and the store (§1/§6) — there is no fourth
/// "device service" trait here, so construction of this record is this pipeline's
/// entire realization of step 4; the accept/reject decision itself is carried by the
/// `claim` hook in step 2 (see `DESIGN.md`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceFoundDetails {
    pub device_class: String,
    pub device_class_version: u32,
    pub device_id: DeviceId,
    pub manufacturer: String,
    pub model: String,
    pub hardware_version: String,
    pub firmware_version: String,
    pub endpoint_profiles: HashMap<u8, String>,
}

fn build_device_found_details(
    discovered: &DiscoveredDevice,
    descriptor: &crate::hal::DeviceDescriptor,
    eui: Eui64,
    hooks: &dyn DriverHooks,
) -> DeviceFoundDetails {
    let mut endpoint_profiles = HashMap::new();
    for endpoint in &discovered.endpoints {
        if let Some(tag) = hooks.map_device_id_to_profile(endpoint.app_device_id) {
            endpoint_profiles.insert(endpoint.endpoint_id, tag);
        }
    }
    DeviceFoundDetails {
        device_class: descriptor.device_class.clone(),
        device_class_version: descriptor.device_class_version,
        device_id: eui.to_device_id(),
        manufacturer: discovered.manufacturer.clone(),
        model: discovered.model.clone(),
        hardware_version: discovered.hardware_version.to_string(),
        firmware_version: format!("0x{:08x}", discovered.firmware_version),
        endpoint_profiles,
    }
}

fn common_initial_resource_values(device: &Device) -> HashMap<String, serde_json::Value> {
    let mut values = HashMap::new();
    values.insert("firmwareVersion".to_string(), serde_json::json!(device.firmware_version_string()));
    values.insert("nearEndRssi".to_string(), serde_json::Value::Null);
    values.insert("nearEndLqi".to_string(), serde_json::Value::Null);
    if device.power_source != PowerSource::Mains {
        values.insert("batteryLow".to_string(), serde_json::json!(false));
        values.insert("batteryBad".to_string(), serde_json::json!(false));
        values.insert("batteryMissing".to_string(), serde_json::json!(false));
    }
    if device.power_source != PowerSource::Battery {
        values.insert("mainsDisconnected".to_string(), serde_json::json!(false));
    }
    values
}

fn common_resources(device: &Device) -> Vec<Resource> {
    let device_id = device.id();
    let suffix_start = device_id.len().saturating_sub(4);
    let label = format!("{}{}", device.manufacturer, &device_id[suffix_start..]);
    vec![
        Resource::new("label", label, ResourceMode::readable_writable()),
        Resource::new("feRssi", serde_json::Value::Null, ResourceMode::READABLE),
        Resource::new("feLqi", serde_json::Value::Null, ResourceMode::READABLE),
        Resource::new("neRssi", serde_json::Value::Null, ResourceMode::READABLE),
        Resource::new("neLqi", serde_json::Value::Null, ResourceMode::READABLE),
        Resource::new("temperature", serde_json::Value::Null, ResourceMode::READABLE),
        Resource::new("highTemperature", serde_json::json!(false), ResourceMode::READABLE),
        Resource::new("batteryLow", serde_json::json!(false), ResourceMode::READABLE),
        Resource::new("batteryVoltage", serde_json::Value::Null, ResourceMode::READABLE),
        Resource::new("mainsDisconnected", serde_json::json!(false), ResourceMode::READABLE),
        Resource::new("batteryBad", serde_json::json!(false), ResourceMode::READABLE),
        Resource::new("batteryMissing", serde_json::json!(false), ResourceMode::READABLE),
        Resource::new("batteryHighTemperature", serde_json::json!(false), ResourceMode::READABLE),
        Resource::new("batteryPercentageRemaining", serde_json::Value::Null, ResourceMode::READABLE),
        Resource::new("lastUserInteractionDate", serde_json::Value::Null, ResourceMode::READABLE),
    ]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairingOutcome {
    Paired(DeviceId),
    Declined,
    Rejected,
}

pub struct PairingPipeline {
    hal: Arc<dyn Hal>,
    descriptors: Arc<dyn Descriptors>,
    store: Arc<dyn Store>,
    hooks: Arc<dyn DriverHooks>,
    cache: Arc<DiscoveredCache>,
    registry: Arc<ClusterRegistry>,
    commfail: Arc<CommFailWatchdog>,
    claimable_app_device_ids: HashSet<u16>,
    discovery_active: AtomicBool,
}

impl PairingPipeline {
    pub fn new(
        hal: Arc<dyn Hal>,
        descriptors: Arc<dyn Descriptors>,
        store: Arc<dyn Store>,
        hooks: Arc<dyn DriverHooks>,
        cache: Arc<DiscoveredCache>,
        registry: Arc<ClusterRegistry>,
        commfail: Arc<CommFailWatchdog>,
        claimable_app_device_ids: HashSet<u16>,
    ) -> Self {
        Self {
            hal,
            descriptors,
            store,
            hooks,
            cache,
            registry,
            commfail,
            claimable_app_device_ids,
            discovery_active: AtomicBool::new(false),
        }
    }

    pub fn set_discovery_active(&self, active: bool) {
        self.discovery_active.store(active, Ordering::SeqCst);
    }

    fn matches_configured_app_device_id(&self, discovered: &DiscoveredDevice) -> bool {
        discovered
            .first_endpoint()
            .map(|ep| self.claimable_app_device_ids.contains(&ep.app_device_id))
            .unwrap_or(false)
    }

    async fn reject_and_cleanup(&self, eui: Eui64, endpoint: u8, migrating: bool) {
        self.cache.remove(eui);
        if migrating {
            return;
        }
        let hal = Arc::clone(&self.hal);
        tokio::spawn(async move {
            if let Err(e) = hal.factory_reset(eui, endpoint).await {
                log::warn!("factory reset failed for {eui}: {e}");
            }
            if let Err(e) = hal.request_leave(eui, endpoint).await {
                log::warn!("request leave failed for {eui}: {e}");
            }
        });
    }

    /// Runs the full eleven-step sequence for one HAL-reported discovery. `migrating`
    /// marks a migration-context pairing, which bypasses the discovery-active gate and
    /// skips factory-reset-on-reject (step 1, step 5).
    pub async fn handle_discovered(&self, discovered: DiscoveredDevice, migrating: bool) -> PairingOutcome {
        if !self.discovery_active.load(Ordering::SeqCst) && !migrating {
            return PairingOutcome::Declined;
        }

        let claimed = self.hooks.claim(&discovered).await || self.matches_configured_app_device_id(&discovered);
        if !claimed {
            return PairingOutcome::Declined;
        }

        let Some(eui) = discovered.eui() else {
            return PairingOutcome::Declined;
        };
        let device_id = eui.to_device_id();
        let fallback_endpoint = discovered.first_endpoint().map(|e| e.endpoint_id).unwrap_or(1);

        self.cache.insert(discovered.clone());

        let descriptor = match self
            .descriptors
            .resolve(&discovered.manufacturer, &discovered.model, discovered.hardware_version, discovered.firmware_version)
            .await
        {
            Ok(d) => d,
            Err(e) => {
                log::warn!("descriptor resolution failed for {device_id}: {e}");
                self.reject_and_cleanup(eui, fallback_endpoint, migrating).await;
                return PairingOutcome::Rejected;
            }
        };

        let _details = build_device_found_details(&discovered, &descriptor, eui, &*self.hooks);

        let mut endpoints = Vec::new();
        for disc_endpoint in &discovered.endpoints {
            let mut endpoint = Endpoint::new(disc_endpoint.endpoint_id, disc_endpoint.endpoint_id.to_string(), disc_endpoint.app_device_id);
            for cluster in &disc_endpoint.server_clusters {
                let attribute_ids = match self
                    .hal
                    .enumerate_attributes(eui, disc_endpoint.endpoint_id, cluster.cluster_id)
                    .await
                {
                    Ok(ids) => ids,
                    Err(e) => {
                        log::warn!(
                            "attribute inventory discovery failed for {device_id} cluster {:#06x}: {e}",
                            cluster.cluster_id
                        );
                        self.reject_and_cleanup(eui, fallback_endpoint, migrating).await;
                        return PairingOutcome::Rejected;
                    }
                };
                let mut record = ClusterRecord::new(cluster.cluster_id, ClusterRole::Server);
                record.attribute_ids.extend(attribute_ids);
                endpoint.server_clusters.push(record);
            }
            for cluster in &disc_endpoint.client_clusters {
                endpoint.client_clusters.push(ClusterRecord::new(cluster.cluster_id, ClusterRole::Client));
            }
            endpoints.push(endpoint);
        }

        let mut device = Device {
            eui,
            manufacturer: discovered.manufacturer.clone(),
            model: discovered.model.clone(),
            hardware_version: discovered.hardware_version,
            firmware_version: discovered.firmware_version,
            power_source: discovered.power_source,
            comm_fail: false,
            endpoints,
            metadata: Metadata::default(),
        };
        device.metadata.insert(Metadata::DISCOVERED_DETAILS, discovered.to_json().to_string());
        device.metadata.insert(Metadata::DEVICE_CLASS, descriptor.device_class.clone());

        for cluster_id in self.registry.configuration_order() {
            if !self.hooks.pre_configure_cluster(&device_id, cluster_id).await {
                continue;
            }
            let Some(endpoint) = device.endpoints.iter().find(|e| e.advertises(cluster_id).is_some()) else {
                continue;
            };
            let Some(cluster) = self.registry.get(cluster_id) else {
                continue;
            };
            let ctx = ConfigureContext {
                eui,
                endpoint,
                descriptor: &descriptor,
                discovered: &discovered,
                hal: &*self.hal,
                store: &*self.store,
            };
            if let Err(e) = cluster.configure(&ctx).await {
                log::warn!("cluster {cluster_id:#06x} configuration failed for {device_id}: {e}");
                self.reject_and_cleanup(eui, fallback_endpoint, migrating).await;
                return PairingOutcome::Rejected;
            }
        }

        if let Err(e) = self.hooks.configure_device(&device_id).await {
            log::warn!("configureDevice hook failed for {device_id}: {e}");
            self.reject_and_cleanup(eui, fallback_endpoint, migrating).await;
            return PairingOutcome::Rejected;
        }

        if let Err(e) = self.store.put_device(device.clone()).await {
            log::warn!("failed to persist device record for {device_id}: {e}");
            self.reject_and_cleanup(eui, fallback_endpoint, migrating).await;
            return PairingOutcome::Rejected;
        }

        let mut initial_values = common_initial_resource_values(&device);
        for (key, value) in self.hooks.fetch_initial_resource_values(&device_id).await {
            initial_values.insert(key, value);
        }
        for (name, value) in initial_values {
            let resource = Resource::new(name, value, ResourceMode::READABLE);
            let _ = self.store.update_resource(&device_id, resource, ChangeOrigin::Configuration).await;
        }

        let mut resources: HashMap<String, Resource> =
            common_resources(&device).into_iter().map(|r| (r.name.clone(), r)).collect();
        for resource in self.hooks.register_resources(&device_id).await {
            resources.insert(resource.name.clone(), resource);
        }
        for resource in resources.into_values() {
            let _ = self.store.update_resource(&device_id, resource, ChangeOrigin::Configuration).await;
        }

        self.commfail.feed(eui);
        self.hooks.device_persisted(&device_id).await;

        PairingOutcome::Paired(device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{DeviceDescriptor, FirmwareMetadata};
    use crate::model::{DiscoveredCluster, DiscoveredEndpoint};
    use crate::testutil::{FakeDescriptors, FakeHal, FakeHooks, FakeStore};
    use crate::cluster::cluster_ids;

    fn discovered_cluster(cluster_id: u16) -> DiscoveredCluster {
        DiscoveredCluster {
            cluster_id,
            is_server: true,
            attribute_ids: vec![],
        }
    }

    fn sample_discovered() -> DiscoveredDevice {
        DiscoveredDevice {
            eui64: "000d6f0001234567".to_string(),
            manufacturer: "A".to_string(),
            model: "B".to_string(),
            hardware_version: 2,
            firmware_version: 0x00000010,
            power_source: PowerSource::Mains,
            endpoints: vec![DiscoveredEndpoint {
                endpoint_id: 1,
                app_device_id: 0x0402,
                server_clusters: vec![
                    discovered_cluster(cluster_ids::BASIC),
                    discovered_cluster(cluster_ids::POWER_CONFIGURATION),
                    discovered_cluster(cluster_ids::POLL_CONTROL),
                    discovered_cluster(cluster_ids::IAS_ZONE),
                ],
                client_clusters: vec![],
            }],
        }
    }

    fn descriptor_with_poll_intervals() -> DeviceDescriptor {
        let mut configuration_metadata = HashMap::new();
        configuration_metadata.insert("checkInInterval".to_string(), "4".to_string());
        configuration_metadata.insert("fastPollTimeout".to_string(), "2".to_string());
        configuration_metadata.insert("longPollInterval".to_string(), "20".to_string());
        configuration_metadata.insert("shortPollInterval".to_string(), "2".to_string());
        DeviceDescriptor {
            device_class: "sensor".to_string(),
            device_class_version: 1,
            latest_firmware: Some(FirmwareMetadata {
                version: 0x00000010,
                filenames: vec![],
                base_url: String::new(),
            }),
            configuration_metadata,
        }
    }

    #[tokio::test]
    async fn pair_and_persist_by_device_id_match() {
        let hal = Arc::new(FakeHal::default());
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let descriptors = Arc::new(FakeDescriptors::new(descriptor_with_poll_intervals()));
        let cache = Arc::new(DiscoveredCache::new());
        let registry = Arc::new(ClusterRegistry::with_common_clusters());
        let commfail = CommFailWatchdog::new(store.clone(), hooks.clone(), std::time::Duration::from_secs(3600));

        let mut claimable = HashSet::new();
        claimable.insert(0x0402u16);

        let pipeline = PairingPipeline::new(
            hal.clone(),
            descriptors,
            store.clone(),
            hooks.clone(),
            cache,
            registry,
            commfail,
            claimable,
        );
        pipeline.set_discovery_active(true);

        let outcome = pipeline.handle_discovered(sample_discovered(), false).await;
        let device_id = match outcome {
            PairingOutcome::Paired(id) => id,
            other => panic!("expected Paired, got {other:?}"),
        };
        assert_eq!(device_id, "000d6f0001234567");

        let persisted = store.get_device(&device_id).await.expect("device persisted");
        assert_eq!(persisted.endpoint(1).unwrap().metadata.get(Metadata::ZIGBEE_EPID), Some("1"));

        let firmware_version = store.get_resource(&device_id, "firmwareVersion").await.unwrap();
        assert_eq!(firmware_version.value, serde_json::json!("0x00000010"));

        let poll_control_writes = hal
            .written_attributes
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, cluster_id, ..)| *cluster_id == cluster_ids::POLL_CONTROL)
            .count();
        assert_eq!(poll_control_writes, 4);

        assert!(hooks.device_persisted_calls().contains(&device_id));
    }

    #[tokio::test]
    async fn discovery_inactive_declines_without_migration_context() {
        let hal = Arc::new(FakeHal::default());
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let descriptors = Arc::new(FakeDescriptors::new(descriptor_with_poll_intervals()));
        let cache = Arc::new(DiscoveredCache::new());
        let registry = Arc::new(ClusterRegistry::with_common_clusters());
        let commfail = CommFailWatchdog::new(store.clone(), hooks.clone(), std::time::Duration::from_secs(3600));

        let pipeline = PairingPipeline::new(hal, descriptors, store, hooks, cache, registry, commfail, HashSet::new());

        let outcome = pipeline.handle_discovered(sample_discovered(), false).await;
        assert_eq!(outcome, PairingOutcome::Declined);
    }

    #[tokio::test]
    async fn unclaimed_device_is_declined() {
        let hal = Arc::new(FakeHal::default());
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let descriptors = Arc::new(FakeDescriptors::new(descriptor_with_poll_intervals()));
        let cache = Arc::new(DiscoveredCache::new());
        let registry = Arc::new(ClusterRegistry::with_common_clusters());
        let commfail = CommFailWatchdog::new(store.clone(), hooks.clone(), std::time::Duration::from_secs(3600));

        let pipeline = PairingPipeline::new(hal, descriptors, store, hooks, cache, registry, commfail, HashSet::new());
        pipeline.set_discovery_active(true);

        let outcome = pipeline.handle_discovered(sample_discovered(), false).await;
        assert_eq!(outcome, PairingOutcome::Declined);
    }
}
