//! The firmware upgrade orchestrator (§4.6, §10.5): compares installed versus latest
//! firmware per device, downloads image files (deduplicated across devices via the
//! in-flight-set + broadcast pattern grounded in
//! `other_examples/b9ac7a51_etiennetremel-otaflux__src-firmware_manager.rs.rs`),
//! schedules delayed initiation, retries on failure, and blocks process shutdown while
//! critical upgrades are in flight.

use crate::cluster::OtaUpgradeCluster;
use crate::config::DriverConfig;
use crate::error::{DriverError, DriverResult};
use crate::hal::{ChangeOrigin, DeviceDescriptor, DriverHooks, Hal, Store};
use crate::model::{Device, DeviceId, Eui64, Resource, ResourceMode};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

/// Fetches one firmware file from `url` into `dest`, atomically. Split out as a trait
/// (rather than calling `reqwest` directly from the orchestrator) the same way `Hal`/
/// `Store`/`Descriptors` are traits — so tests exercise the retry/dedup/scheduling
/// logic against a fake instead of real network I/O.
#[async_trait]
pub trait FirmwareDownloader: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> DriverResult<()>;
}

/// Default downloader: HTTP GET via `reqwest` into a `tempfile`-managed temporary file
/// in the same directory as `dest`, persisted (renamed) into place with `0777`
/// permissions on success; the temp file is guaranteed cleaned up on any failure
/// path since `tempfile::NamedTempFile` removes itself on drop (§5 resource policy).
pub struct ReqwestDownloader {
    client: reqwest::Client,
}

impl ReqwestDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestDownloader {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl FirmwareDownloader for ReqwestDownloader {
    async fn download(&self, url: &str, dest: &Path) -> DriverResult<()> {
        let response = tokio::time::timeout(Duration::from_secs(60), self.client.get(url).send())
            .await
            .map_err(|_| DriverError::Transport(format!("timeout downloading {url}")))??;
        let response = response.error_for_status()?;
        let bytes = response.bytes().await?;

        let dir = dest
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let dest_owned = dest.to_path_buf();

        tokio::task::spawn_blocking(move || -> DriverResult<()> {
            use std::io::Write;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tmp.as_file().set_permissions(std::fs::Permissions::from_mode(0o777))?;
            }
            tmp.persist(&dest_owned).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| DriverError::Contract(e.to_string()))??;

        Ok(())
    }
}

struct PendingJob {
    #[allow(dead_code)]
    endpoint: u8,
    handle: JoinHandle<()>,
}

pub struct FirmwareOrchestrator {
    hal: Arc<dyn Hal>,
    store: Arc<dyn Store>,
    hooks: Arc<dyn DriverHooks>,
    downloader: Arc<dyn FirmwareDownloader>,
    config: DriverConfig,
    firmware_dir: PathBuf,
    pending: Mutex<HashMap<DeviceId, PendingJob>>,
    downloads: Mutex<HashMap<String, broadcast::Sender<bool>>>,
    blocking: Mutex<HashSet<Eui64>>,
    blocking_notify: Notify,
}

impl FirmwareOrchestrator {
    pub fn new(
        hal: Arc<dyn Hal>,
        store: Arc<dyn Store>,
        hooks: Arc<dyn DriverHooks>,
        downloader: Arc<dyn FirmwareDownloader>,
        config: DriverConfig,
        firmware_dir: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            hal,
            store,
            hooks,
            downloader,
            config,
            firmware_dir,
            pending: Mutex::new(HashMap::new()),
            downloads: Mutex::new(HashMap::new()),
            blocking: Mutex::new(HashSet::new()),
            blocking_notify: Notify::new(),
        })
    }

    /// Compares `descriptor.latest_firmware` against the device's current firmware
    /// and, if an upgrade is needed, marks `firmwareUpdateStatus=pending` and schedules
    /// the delayed job (§4.6 steps 1-2; Testable Property 8).
    pub async fn apply_descriptor(self: &Arc<Self>, device: &Device, descriptor: DeviceDescriptor) {
        let device_id = device.id();
        let Some(latest) = descriptor.latest_firmware.clone() else {
            return;
        };

        if !self.hooks.firmware_upgrade_required(device.firmware_version, latest.version) {
            let _ = self
                .store
                .update_resource(
                    &device_id,
                    Resource::new("firmwareUpdateStatus", "upToDate", ResourceMode::READABLE),
                    ChangeOrigin::Configuration,
                )
                .await;
            return;
        }

        let _ = self
            .store
            .update_resource(
                &device_id,
                Resource::new("firmwareUpdateStatus", "pending", ResourceMode::READABLE),
                ChangeOrigin::Configuration,
            )
            .await;

        let endpoint = device.first_endpoint().map(|e| e.number).unwrap_or(1);
        let delay = self.config.effective_firmware_upgrade_delay();
        self.schedule_job(device.eui, device_id, endpoint, descriptor, delay);
    }

    fn schedule_job(
        self: &Arc<Self>,
        eui: Eui64,
        device_id: DeviceId,
        endpoint: u8,
        descriptor: DeviceDescriptor,
        delay: Duration,
    ) {
        let orchestrator = Arc::clone(self);
        let task_device_id = device_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            orchestrator.run_job(eui, task_device_id, endpoint, descriptor).await;
        });

        let mut pending = self.pending.lock().expect("pending lock");
        if let Some(old) = pending.insert(device_id, PendingJob { endpoint, handle }) {
            old.handle.abort();
        }
    }

    async fn run_job(self: Arc<Self>, eui: Eui64, device_id: DeviceId, endpoint: u8, descriptor: DeviceDescriptor) {
        let Some(latest) = descriptor.latest_firmware.clone() else {
            self.pending.lock().expect("pending lock").remove(&device_id);
            return;
        };

        let mut all_ok = true;
        for filename in &latest.filenames {
            let dest = self.firmware_dir.join(filename);
            if dest.exists() {
                continue;
            }
            let url = format!("{}/{}", latest.base_url.trim_end_matches('/'), filename);
            if !self.download_deduped(filename, &url, &dest).await {
                all_ok = false;
            }
        }

        if !all_ok {
            self.hooks.firmware_upgrade_failed(&device_id, "not all firmware files available").await;
            self.schedule_job(eui, device_id, endpoint, descriptor, self.config.firmware_upgrade_retry_delay);
            return;
        }

        match self.hooks.initiate_firmware_upgrade(&device_id).await {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                log::warn!("initiateFirmwareUpgrade failed for {device_id}: {e}");
                self.hooks.firmware_upgrade_failed(&device_id, &e.to_string()).await;
            }
            None => {
                if let Err(e) = OtaUpgradeCluster::image_notify(&*self.hal, eui, endpoint).await {
                    log::warn!("image-notify failed for {device_id}: {e}");
                }
            }
        }

        self.pending.lock().expect("pending lock").remove(&device_id);
    }

    /// Downloads `filename` from `url` into `dest`, sharing a single in-flight fetch
    /// across concurrent jobs that need the same file (§10.5).
    async fn download_deduped(&self, filename: &str, url: &str, dest: &Path) -> bool {
        let existing_or_new = {
            let mut downloads = self.downloads.lock().expect("downloads lock");
            match downloads.get(filename) {
                Some(tx) => Err(tx.subscribe()),
                None => {
                    let (tx, _rx) = broadcast::channel(1);
                    downloads.insert(filename.to_string(), tx.clone());
                    Ok(tx)
                }
            }
        };

        match existing_or_new {
            Err(mut rx) => rx.recv().await.unwrap_or(false),
            Ok(tx) => {
                let result = self.downloader.download(url, dest).await;
                let ok = result.is_ok();
                if let Err(e) = &result {
                    log::warn!("firmware download of {filename} failed: {e}");
                }
                self.downloads.lock().expect("downloads lock").remove(filename);
                let _ = tx.send(ok);
                ok
            }
        }
    }

    /// Called when the HAL reports a device rebooted on new firmware. Updates the
    /// `firmwareVersion` resource and, if the version string actually changed, marks
    /// `firmwareUpdateStatus=completed` (§4.6 step 5).
    pub async fn on_firmware_version_notify(&self, device_id: &DeviceId, new_version: u32) {
        let formatted = format!("0x{new_version:08x}");
        let previous = self.store.get_resource(device_id, "firmwareVersion").await;
        let changed = previous
            .as_ref()
            .map(|r| r.value != serde_json::json!(formatted))
            .unwrap_or(true);

        let _ = self
            .store
            .update_resource(device_id, Resource::new("firmwareVersion", formatted.clone(), ResourceMode::READABLE), ChangeOrigin::Hal)
            .await;

        if changed {
            let _ = self
                .store
                .update_resource(
                    device_id,
                    Resource::new("firmwareUpdateStatus", "completed", ResourceMode::READABLE),
                    ChangeOrigin::Hal,
                )
                .await;
            log::info!("firmware upgrade completed for {device_id}: now {formatted}");
        }
    }

    /// Records an upgrade as blocking process shutdown (§4.6 step 6).
    pub fn block_shutdown_for(&self, eui: Eui64) {
        self.blocking.lock().expect("blocking lock").insert(eui);
    }

    pub fn unblock(&self, eui: Eui64) {
        self.blocking.lock().expect("blocking lock").remove(&eui);
        self.blocking_notify.notify_waiters();
    }

    /// Waits until the blocking set is empty or `deadline` elapses, whichever first
    /// (the caller enforces the outer deadline per §4.6 step 6).
    pub async fn await_quiescent(&self, deadline: Duration) -> bool {
        let start = tokio::time::Instant::now();
        loop {
            if self.blocking.lock().expect("blocking lock").is_empty() {
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= deadline {
                return false;
            }
            let remaining = deadline - elapsed;
            tokio::select! {
                _ = self.blocking_notify.notified() => {}
                _ = tokio::time::sleep(remaining) => {
                    return self.blocking.lock().expect("blocking lock").is_empty();
                }
            }
        }
    }

    /// Cancels every pending job, used on driver shutdown.
    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock().expect("pending lock");
        for (_, job) in pending.drain() {
            job.handle.abort();
        }
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending lock").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::FirmwareMetadata;
    use crate::model::PowerSource;
    use crate::testutil::{FakeHal, FakeHooks, FakeStore};

    #[derive(Default)]
    struct FakeDownloader {
        attempts: Mutex<HashMap<String, u32>>,
        fail_first_n: u32,
    }

    #[async_trait]
    impl FirmwareDownloader for FakeDownloader {
        async fn download(&self, _url: &str, dest: &Path) -> DriverResult<()> {
            let mut attempts = self.attempts.lock().expect("lock");
            let key = dest.to_string_lossy().to_string();
            let count = attempts.entry(key).or_insert(0);
            *count += 1;
            if *count <= self.fail_first_n {
                return Err(DriverError::Transport("simulated download failure".into()));
            }
            if let Some(parent) = dest.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            std::fs::write(dest, b"firmware").map_err(DriverError::from)
        }
    }

    fn sample_device() -> Device {
        Device {
            eui: Eui64(0x000D6F0001234567),
            manufacturer: "A".into(),
            model: "B".into(),
            hardware_version: 2,
            firmware_version: 0x00000010,
            power_source: PowerSource::Mains,
            comm_fail: false,
            endpoints: vec![],
            metadata: Default::default(),
        }
    }

    fn descriptor(latest_version: u32) -> DeviceDescriptor {
        DeviceDescriptor {
            device_class: "widget".into(),
            device_class_version: 1,
            latest_firmware: Some(FirmwareMetadata {
                version: latest_version,
                filenames: vec!["widget.bin".into()],
                base_url: "https://firmware.example/widget".into(),
            }),
            configuration_metadata: Default::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn upgrade_needed_schedules_job_and_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hal = Arc::new(FakeHal::default());
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let downloader = Arc::new(FakeDownloader::default());
        let orchestrator = FirmwareOrchestrator::new(
            hal.clone(),
            store.clone(),
            hooks,
            downloader,
            DriverConfig::default(),
            dir.path().to_path_buf(),
        );

        let device = sample_device();
        orchestrator.apply_descriptor(&device, descriptor(0x00000020)).await;
        assert_eq!(orchestrator.pending_count(), 1);

        tokio::time::advance(Duration::from_secs(7201)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(orchestrator.pending_count(), 0);
        let sent = hal.sent_to(crate::cluster::cluster_ids::OTA_UPGRADE);
        assert_eq!(sent.len(), 1);
    }

    #[tokio::test]
    async fn upgrade_not_needed_marks_up_to_date_and_schedules_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hal = Arc::new(FakeHal::default());
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let downloader = Arc::new(FakeDownloader::default());
        let orchestrator = FirmwareOrchestrator::new(hal, store.clone(), hooks, downloader, DriverConfig::default(), dir.path().to_path_buf());

        let mut device = sample_device();
        device.firmware_version = 0x00000020;
        orchestrator.apply_descriptor(&device, descriptor(0x00000020)).await;

        assert_eq!(orchestrator.pending_count(), 0);
        let status = store.get_resource(&device.id(), "firmwareUpdateStatus").await.unwrap();
        assert_eq!(status.value, serde_json::json!("upToDate"));
    }

    #[tokio::test(start_paused = true)]
    async fn download_failure_reschedules_after_retry_delay() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hal = Arc::new(FakeHal::default());
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let downloader = Arc::new(FakeDownloader { fail_first_n: 1, ..Default::default() });
        let orchestrator = FirmwareOrchestrator::new(
            hal.clone(),
            store,
            hooks.clone(),
            downloader,
            DriverConfig::default(),
            dir.path().to_path_buf(),
        );

        let device = sample_device();
        orchestrator.apply_descriptor(&device, descriptor(0x00000020)).await;

        tokio::time::advance(Duration::from_secs(7201)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(orchestrator.pending_count(), 1);
        assert!(!hooks.firmware_upgrade_failed_calls().is_empty());

        tokio::time::advance(Duration::from_secs(3601)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(orchestrator.pending_count(), 0);
        let sent = hal.sent_to(crate::cluster::cluster_ids::OTA_UPGRADE);
        assert_eq!(sent.len(), 1);
    }

    #[tokio::test]
    async fn firmware_version_notify_marks_completed_on_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hal = Arc::new(FakeHal::default());
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let downloader = Arc::new(FakeDownloader::default());
        let orchestrator = FirmwareOrchestrator::new(hal, store.clone(), hooks, downloader, DriverConfig::default(), dir.path().to_path_buf());

        let device_id = sample_device().id();
        store
            .update_resource(&device_id, Resource::new("firmwareVersion", "0x00000010", ResourceMode::READABLE), ChangeOrigin::Hal)
            .await
            .unwrap();

        orchestrator.on_firmware_version_notify(&device_id, 0x00000020).await;

        let status = store.get_resource(&device_id, "firmwareUpdateStatus").await.unwrap();
        assert_eq!(status.value, serde_json::json!("completed"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_blocks_until_unblocked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hal = Arc::new(FakeHal::default());
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let downloader = Arc::new(FakeDownloader::default());
        let orchestrator = FirmwareOrchestrator::new(hal, store, hooks, downloader, DriverConfig::default(), dir.path().to_path_buf());

        let eui = Eui64(1);
        orchestrator.block_shutdown_for(eui);

        let waiter_orchestrator = Arc::clone(&orchestrator);
        let waiter = tokio::spawn(async move { waiter_orchestrator.await_quiescent(Duration::from_secs(10)).await });

        tokio::time::advance(Duration::from_millis(100)).await;
        orchestrator.unblock(eui);

        let became_quiescent = waiter.await.expect("join");
        assert!(became_quiescent);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_times_out_if_never_unblocked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let hal = Arc::new(FakeHal::default());
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let downloader = Arc::new(FakeDownloader::default());
        let orchestrator = FirmwareOrchestrator::new(hal, store, hooks, downloader, DriverConfig::default(), dir.path().to_path_buf());

        orchestrator.block_shutdown_for(Eui64(2));
        let became_quiescent = orchestrator.await_quiescent(Duration::from_secs(5)).await;
        assert!(!became_quiescent);
    }
}
