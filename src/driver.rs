//! The top-level driver runtime (§1): owns every subsystem and wires the dispatch path,
//! pairing pipeline, poll-control coordinator, firmware orchestrator, and event tracker
//! together behind one handle, owning an `Arc` of each subsystem and a handle to each
//! subsystem's background task, cancelled on shutdown.

use crate::cache::DiscoveredCache;
use crate::cluster::ClusterRegistry;
use crate::commfail::CommFailWatchdog;
use crate::config::DriverConfig;
use crate::dispatch;
use crate::event_tracker::EventTracker;
use crate::firmware::{FirmwareDownloader, FirmwareOrchestrator};
use crate::hal::{AttributeReport, ClusterCommand, Descriptors, DriverHooks, Hal, Store};
use crate::model::{DeviceId, DiscoveredDevice, Eui64, Metadata};
use crate::pairing::{PairingOutcome, PairingPipeline};
use crate::poll_control::PollControlCoordinator;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct Driver {
    hal: Arc<dyn Hal>,
    store: Arc<dyn Store>,
    hooks: Arc<dyn DriverHooks>,
    descriptors: Arc<dyn Descriptors>,
    tracker: Arc<EventTracker>,
    commfail: Arc<CommFailWatchdog>,
    poll_control: PollControlCoordinator,
    firmware: Arc<FirmwareOrchestrator>,
    pairing: PairingPipeline,
    config: DriverConfig,
    channel_scanner_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Driver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hal: Arc<dyn Hal>,
        descriptors: Arc<dyn Descriptors>,
        store: Arc<dyn Store>,
        hooks: Arc<dyn DriverHooks>,
        downloader: Arc<dyn FirmwareDownloader>,
        registry: Arc<ClusterRegistry>,
        config: DriverConfig,
        firmware_dir: PathBuf,
        claimable_app_device_ids: HashSet<u16>,
    ) -> Arc<Self> {
        let commfail = CommFailWatchdog::new(store.clone(), hooks.clone(), config.comm_fail_timeout);
        let cache = Arc::new(DiscoveredCache::new());
        let tracker = Arc::new(EventTracker::new());
        let poll_control = PollControlCoordinator::new(hal.clone(), store.clone(), registry.clone());
        let firmware = FirmwareOrchestrator::new(
            hal.clone(),
            store.clone(),
            hooks.clone(),
            downloader,
            config.clone(),
            firmware_dir,
        );
        let pairing = PairingPipeline::new(
            hal.clone(),
            descriptors.clone(),
            store.clone(),
            hooks.clone(),
            cache,
            registry,
            Arc::clone(&commfail),
            claimable_app_device_ids,
        );

        Arc::new(Self {
            hal,
            store,
            hooks,
            descriptors,
            tracker,
            commfail,
            poll_control,
            firmware,
            pairing,
            config,
            channel_scanner_handle: Mutex::new(None),
        })
    }

    /// Re-arms devices already in comm-fail, applies the configured collection gates to
    /// the event tracker, and starts the channel-energy scanner.
    pub async fn start(self: &Arc<Self>) {
        self.commfail.start().await;
        self.tracker.set_report_collection_enabled(self.config.report_collection_enabled);
        self.tracker.set_channel_energy_collection_enabled(self.config.channel_energy_collection_enabled);

        let handle = self.tracker.spawn_channel_scanner(
            Arc::clone(&self.hal),
            self.config.channel_scan_period,
            self.config.channel_scan_period,
            self.config.channel_scans_per_channel,
            self.config.channel_scan_duration,
            self.config.channel_scan_inter_channel_delay,
        );
        *self.channel_scanner_handle.lock().expect("driver lock") = Some(handle);

        self.hooks.subsystem_initialized("commFailWatchdog").await;
        self.hooks.subsystem_initialized("pollControlCoordinator").await;
        self.hooks.subsystem_initialized("firmwareOrchestrator").await;
        self.hooks.subsystem_initialized("eventTracker").await;
    }

    pub fn set_discovery_active(&self, active: bool) {
        self.pairing.set_discovery_active(active);
    }

    pub async fn pair(&self, discovered: DiscoveredDevice, migrating: bool) -> PairingOutcome {
        self.pairing.handle_discovered(discovered, migrating).await
    }

    /// Runs the dispatch path (§4.3) for one inbound attribute report, plus the
    /// comm-fail feed and event-tracker insertion that ride along with every frame.
    pub async fn on_attribute_report(&self, report: AttributeReport) {
        self.commfail.feed(report.envelope.eui);

        let is_sensor_class = self
            .store
            .get_device(&report.envelope.eui.to_device_id())
            .await
            .map(|d| d.metadata.get(Metadata::DEVICE_CLASS) == Some("sensor"))
            .unwrap_or(false);
        self.tracker.insert_attribute_report(
            report.envelope.eui,
            is_sensor_class,
            report.envelope.cluster_id,
            report.envelope.endpoint,
            &report.raw_value,
        );

        dispatch::dispatch_attribute_report(
            self.registry(),
            &*self.hal,
            &*self.store,
            &*self.hooks,
            &report,
        )
        .await;
    }

    /// Runs the dispatch path (§4.3) for one inbound cluster command, handing off to
    /// the poll-control coordinator when the frame is a Poll Control check-in (§4.4).
    pub async fn on_command(&self, command: ClusterCommand) {
        self.commfail.feed(command.envelope.eui);

        let outcome = dispatch::dispatch_command(
            self.registry(),
            &*self.hal,
            &*self.store,
            &*self.hooks,
            &self.tracker,
            &command,
        )
        .await;

        if outcome.is_poll_checkin {
            if let Some(device) = self.store.get_device(&command.envelope.eui.to_device_id()).await {
                self.poll_control.handle_checkin(&device, command.envelope.endpoint, &command.payload).await;
            }
        }
    }

    fn registry(&self) -> &ClusterRegistry {
        self.poll_control.registry()
    }

    /// Re-resolves a device's descriptor and applies it to the firmware orchestrator
    /// (§4.6 entry point). Typically invoked whenever the descriptor repository signals
    /// a new `latestFirmware` is available for a device's manufacturer/model/hardware.
    pub async fn refresh_firmware_descriptor(self: &Arc<Self>, device_id: &DeviceId) {
        let Some(device) = self.store.get_device(device_id).await else {
            return;
        };
        let descriptor = match self
            .descriptors
            .resolve(&device.manufacturer, &device.model, device.hardware_version, device.firmware_version)
            .await
        {
            Ok(d) => d,
            Err(e) => {
                log::warn!("descriptor resolution failed while refreshing firmware for {device_id}: {e}");
                return;
            }
        };
        self.firmware.apply_descriptor(&device, descriptor).await;
    }

    pub async fn on_firmware_version_notify(&self, device_id: &DeviceId, new_version: u32) {
        self.firmware.on_firmware_version_notify(device_id, new_version).await;
    }

    pub fn block_shutdown_for(&self, eui: Eui64) {
        self.firmware.block_shutdown_for(eui);
    }

    pub fn unblock_shutdown_for(&self, eui: Eui64) {
        self.firmware.unblock(eui);
    }

    /// Waits (up to `deadline`) for any shutdown-blocking firmware upgrades to finish,
    /// then cancels every background task owned by this driver (§4.5, §4.6 step 6).
    /// Returns whether the blocking set actually drained before the deadline.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        let quiesced = self.firmware.await_quiescent(deadline).await;
        self.firmware.cancel_all();
        self.commfail.cancel_all();
        if let Some(handle) = self.channel_scanner_handle.lock().expect("driver lock").take() {
            handle.abort();
        }
        quiesced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::cluster_ids;
    use crate::dispatch::POLL_CONTROL_CHECKIN_COMMAND;
    use crate::error::DriverResult;
    use crate::hal::{DeviceDescriptor, FirmwareMetadata, FrameEnvelope};
    use crate::model::{DiscoveredCluster, DiscoveredDevice, DiscoveredEndpoint, PowerSource};
    use crate::testutil::{FakeDescriptors, FakeHal, FakeHooks, FakeStore};
    use async_trait::async_trait;
    use std::path::Path;

    struct NoopDownloader;

    #[async_trait]
    impl FirmwareDownloader for NoopDownloader {
        async fn download(&self, _url: &str, _dest: &Path) -> DriverResult<()> {
            unreachable!("not exercised by these tests")
        }
    }

    fn discovered_cluster(cluster_id: u16) -> DiscoveredCluster {
        DiscoveredCluster { cluster_id, is_server: true, attribute_ids: vec![] }
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
                ],
                client_clusters: vec![],
            }],
        }
    }

    fn sample_descriptor() -> DeviceDescriptor {
        DeviceDescriptor {
            device_class: "widget".into(),
            device_class_version: 1,
            latest_firmware: Some(FirmwareMetadata {
                version: 0x00000010,
                filenames: vec![],
                base_url: String::new(),
            }),
            configuration_metadata: Default::default(),
        }
    }

    fn new_driver(
        hal: Arc<FakeHal>,
        store: Arc<FakeStore>,
        hooks: Arc<FakeHooks>,
        tempdir: &tempfile::TempDir,
    ) -> Arc<Driver> {
        let descriptors = Arc::new(FakeDescriptors::new(sample_descriptor()));
        let registry = Arc::new(ClusterRegistry::with_common_clusters());
        let mut claimable = HashSet::new();
        claimable.insert(0x0402u16);

        Driver::new(
            hal,
            descriptors,
            store,
            hooks,
            Arc::new(NoopDownloader),
            registry,
            DriverConfig::default(),
            tempdir.path().to_path_buf(),
            claimable,
        )
    }

    #[tokio::test]
    async fn pair_then_attribute_report_updates_near_end_resources() {
        let hal = Arc::new(FakeHal::default());
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let tempdir = tempfile::tempdir().expect("tempdir");
        let driver = new_driver(hal.clone(), store.clone(), hooks, &tempdir);

        driver.set_discovery_active(true);
        let outcome = driver.pair(sample_discovered(), false).await;
        let device_id = match outcome {
            PairingOutcome::Paired(id) => id,
            other => panic!("expected Paired, got {other:?}"),
        };

        let report = AttributeReport {
            envelope: FrameEnvelope {
                eui: Eui64(0x000D6F0001234567),
                endpoint: 1,
                cluster_id: cluster_ids::BASIC,
                mfg_id: None,
                rssi: -42,
                lqi: 180,
                sequence_number: 1,
            },
            attribute_id: 0x0004,
            raw_value: vec![],
        };
        driver.on_attribute_report(report).await;

        let rssi = store.get_resource(&device_id, "nearEndRssi").await.expect("nearEndRssi set");
        assert_eq!(rssi.value, serde_json::json!("-42"));
        let lqi = store.get_resource(&device_id, "nearEndLqi").await.expect("nearEndLqi set");
        assert_eq!(lqi.value, serde_json::json!("180"));
    }

    #[tokio::test]
    async fn pair_then_checkin_drives_poll_control_coordinator() {
        let hal = Arc::new(FakeHal::default());
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let tempdir = tempfile::tempdir().expect("tempdir");
        let driver = new_driver(hal.clone(), store.clone(), hooks, &tempdir);

        driver.set_discovery_active(true);
        let outcome = driver.pair(sample_discovered(), false).await;
        assert!(matches!(outcome, PairingOutcome::Paired(_)));
        hal.sent_commands.lock().expect("lock").clear();

        let command = ClusterCommand {
            envelope: FrameEnvelope {
                eui: Eui64(0x000D6F0001234567),
                endpoint: 1,
                cluster_id: cluster_ids::POLL_CONTROL,
                mfg_id: None,
                rssi: -40,
                lqi: 200,
                sequence_number: 2,
            },
            command_id: POLL_CONTROL_CHECKIN_COMMAND,
            payload: vec![],
        };
        driver.on_command(command).await;

        let sent = hal.sent_to(cluster_ids::POLL_CONTROL);
        assert_eq!(sent[0].command_id, 0x00);
    }

    #[tokio::test]
    async fn shutdown_with_nothing_blocking_is_immediately_quiescent() {
        let hal = Arc::new(FakeHal::default());
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let tempdir = tempfile::tempdir().expect("tempdir");
        let driver = new_driver(hal, store, hooks, &tempdir);

        let quiesced = driver.shutdown(Duration::from_secs(1)).await;
        assert!(quiesced);
    }
}
