//! The poll-control / battery-saving coordinator (§4.4): on each sleepy-device
//! check-in, decides which clusters need a refresh based on resource staleness,
//! requests fast-poll only when something is actually stale, and releases the device
//! back to sleep as quickly as possible.

use crate::cluster::{cluster_ids, ClusterContext, ClusterRegistry};
use crate::hal::{ChangeOrigin, Hal, Store};
use crate::model::{Device, Resource, ResourceMode};
use std::sync::Arc;
use std::time::Duration;

/// Poll Control cluster command ids this coordinator sends (§4.4).
const CHECK_IN_RESPONSE: u8 = 0x00;
const FAST_POLL_STOP: u8 = 0x01;
/// Mfg-specific enhanced check-in response, sent instead of the vanilla
/// check-in-response when the inbound check-in carried a `BatterySavingData` payload.
const ENHANCED_CHECK_IN_RESPONSE: u8 = 0x02;

const DEFAULT_TEMP_REFRESH: Duration = Duration::from_secs(3000);
const DEFAULT_BATTERY_VOLTAGE_REFRESH: Duration = Duration::from_secs(86_400);
const DEFAULT_FE_RSSI_REFRESH: Duration = Duration::from_secs(1_500);
const DEFAULT_FE_LQI_REFRESH: Duration = Duration::from_secs(1_500);

async fn refresh_threshold(store: &dyn Store, device_id: &str, metadata_key: &str, default: Duration) -> Duration {
    store
        .get_metadata(device_id, metadata_key)
        .await
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// A resource with no recorded age has never been fetched and is therefore stale.
async fn is_stale(store: &dyn Store, device_id: &str, resource: &str, threshold: Duration) -> bool {
    match store.resource_age(device_id, resource).await {
        Some(age) => age >= threshold,
        None => true,
    }
}

pub struct PollControlCoordinator {
    hal: Arc<dyn Hal>,
    store: Arc<dyn Store>,
    registry: Arc<ClusterRegistry>,
}

impl PollControlCoordinator {
    pub fn new(hal: Arc<dyn Hal>, store: Arc<dyn Store>, registry: Arc<ClusterRegistry>) -> Self {
        Self { hal, store, registry }
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    /// Handles one check-in (§4.4). `payload` is the inbound check-in command's
    /// payload; a non-empty payload signals the mfg-specific enhanced check-in
    /// carrying `BatterySavingData`.
    pub async fn handle_checkin(&self, device: &Device, endpoint: u8, payload: &[u8]) {
        if !payload.is_empty() {
            self.handle_enhanced_checkin(device, endpoint, payload).await;
        } else {
            self.handle_vanilla_checkin(device, endpoint).await;
        }
    }

    async fn handle_enhanced_checkin(&self, device: &Device, endpoint: u8, payload: &[u8]) {
        let device_id = device.id();
        let resource = Resource::new(
            "batterySavingData",
            crate::event_tracker::encode_payload(payload),
            ResourceMode::READABLE,
        );
        let _ = self.store.update_resource(&device_id, resource, ChangeOrigin::Poll).await;
        let _ = self
            .hal
            .send_cluster_command(device.eui, endpoint, cluster_ids::POLL_CONTROL, None, ENHANCED_CHECK_IN_RESPONSE, &[])
            .await;
    }

    async fn handle_vanilla_checkin(&self, device: &Device, endpoint: u8) {
        let device_id = device.id();

        let temp_threshold = refresh_threshold(&*self.store, &device_id, "TempRefreshMinSecs", DEFAULT_TEMP_REFRESH).await;
        let voltage_threshold = refresh_threshold(
            &*self.store,
            &device_id,
            "BatteryVoltageRefreshMinSecs",
            DEFAULT_BATTERY_VOLTAGE_REFRESH,
        )
        .await;
        let rssi_threshold =
            refresh_threshold(&*self.store, &device_id, "FeRssiRefreshMinSecs", DEFAULT_FE_RSSI_REFRESH).await;
        let lqi_threshold = refresh_threshold(&*self.store, &device_id, "FeLqiRefreshMinSecs", DEFAULT_FE_LQI_REFRESH).await;

        let temp_stale = is_stale(&*self.store, &device_id, "temperature", temp_threshold).await;
        let voltage_stale = is_stale(&*self.store, &device_id, "batteryVoltage", voltage_threshold).await;
        let rssi_stale = is_stale(&*self.store, &device_id, "feRssi", rssi_threshold).await;
        let lqi_stale = is_stale(&*self.store, &device_id, "feLqi", lqi_threshold).await;

        let mut refresh_clusters = Vec::new();
        if rssi_stale || lqi_stale {
            refresh_clusters.push(cluster_ids::DIAGNOSTICS);
        }
        if voltage_stale {
            refresh_clusters.push(cluster_ids::POWER_CONFIGURATION);
        }
        if temp_stale {
            refresh_clusters.push(cluster_ids::TEMPERATURE_MEASUREMENT);
        }

        if refresh_clusters.is_empty() {
            let _ = self
                .hal
                .send_cluster_command(device.eui, endpoint, cluster_ids::POLL_CONTROL, None, CHECK_IN_RESPONSE, &[0u8])
                .await;
            return;
        }

        let _ = self
            .hal
            .send_cluster_command(device.eui, endpoint, cluster_ids::POLL_CONTROL, None, CHECK_IN_RESPONSE, &[1u8])
            .await;

        let ctx = ClusterContext {
            hal: &*self.hal,
            store: &*self.store,
        };
        for cluster_id in refresh_clusters {
            if let Some(cluster) = self.registry.get(cluster_id) {
                cluster.handle_poll_checkin(&ctx, device).await;
            }
        }

        let _ = self
            .hal
            .send_cluster_command(device.eui, endpoint, cluster_ids::POLL_CONTROL, None, FAST_POLL_STOP, &[])
            .await;
    }
}
