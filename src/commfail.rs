//! The comm-fail watchdog (§4.5): a per-device timer reset on every received frame.
//! Expiry marks the device's `commFailure` resource `"true"` and invokes
//! `communicationFailed`; the next received frame clears it back to `"false"` and
//! invokes `communicationRestored`. Uses a spawn-and-abort-handle pattern generalized
//! from one shared heartbeat task to one timer per device, keyed in a map guarded by a
//! mutex (§5).

use crate::hal::{ChangeOrigin, DriverHooks, Store};
use crate::model::{DeviceId, Eui64, Resource, ResourceMode};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const COMM_FAILURE_RESOURCE: &str = "commFailure";

pub struct CommFailWatchdog {
    store: Arc<dyn Store>,
    hooks: Arc<dyn DriverHooks>,
    timeout: Duration,
    timers: Mutex<HashMap<Eui64, JoinHandle<()>>>,
    failed: Mutex<HashSet<Eui64>>,
}

impl CommFailWatchdog {
    pub fn new(store: Arc<dyn Store>, hooks: Arc<dyn DriverHooks>, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            store,
            hooks,
            timeout,
            timers: Mutex::new(HashMap::new()),
            failed: Mutex::new(HashSet::new()),
        })
    }

    /// Whether the watchdog is disabled for this runtime (§4.5: "a duration of 0
    /// disables the watchdog").
    pub fn is_disabled(&self) -> bool {
        self.timeout.is_zero()
    }

    /// Re-arms devices already marked `commFailure` at process startup, in the fail
    /// state (§4.5 last sentence).
    pub async fn start(self: &Arc<Self>) {
        if self.is_disabled() {
            return;
        }
        for eui in self.store.devices_in_comm_fail().await {
            self.failed.lock().expect("commfail lock").insert(eui);
            self.arm_timer(eui);
        }
    }

    /// Resets the per-device timer on any received frame (§4.5). If the device was
    /// previously in comm-fail, clears the resource and invokes
    /// `communicationRestored`.
    pub fn feed(self: &Arc<Self>, eui: Eui64) {
        if self.is_disabled() {
            return;
        }

        let was_failed = {
            let mut failed = self.failed.lock().expect("commfail lock");
            failed.remove(&eui)
        };

        if was_failed {
            let watchdog = Arc::clone(self);
            tokio::spawn(async move {
                watchdog.set_comm_failure(eui, false).await;
                watchdog.hooks.communication_restored(&eui.to_device_id()).await;
            });
        }

        self.arm_timer(eui);
    }

    fn arm_timer(self: &Arc<Self>, eui: Eui64) {
        let mut timers = self.timers.lock().expect("commfail lock");
        if let Some(old) = timers.remove(&eui) {
            old.abort();
        }
        let watchdog = Arc::clone(self);
        let timeout = self.timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            watchdog.failed.lock().expect("commfail lock").insert(eui);
            watchdog.set_comm_failure(eui, true).await;
            watchdog.hooks.communication_failed(&eui.to_device_id()).await;
        });
        timers.insert(eui, handle);
    }

    async fn set_comm_failure(&self, eui: Eui64, value: bool) {
        let device_id: DeviceId = eui.to_device_id();
        let resource = Resource::new(COMM_FAILURE_RESOURCE, value.to_string(), ResourceMode::READABLE);
        let _ = self
            .store
            .update_resource(&device_id, resource, ChangeOrigin::Hal)
            .await;
    }

    /// Cancels every per-device timer, used on driver shutdown.
    pub fn cancel_all(&self) {
        let mut timers = self.timers.lock().expect("commfail lock");
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub fn is_failed(&self, eui: Eui64) -> bool {
        self.failed.lock().expect("commfail lock").contains(&eui)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeHooks, FakeStore};

    #[tokio::test(start_paused = true)]
    async fn silence_past_timeout_sets_comm_failure_true() {
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let watchdog = CommFailWatchdog::new(store.clone(), hooks.clone(), Duration::from_secs(10));
        let eui = Eui64(42);

        watchdog.feed(eui);
        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        let device_id = eui.to_device_id();
        let value = store.get_resource(&device_id, "commFailure").await.unwrap();
        assert_eq!(value.value, serde_json::json!("true"));
        assert!(hooks.communication_failed_calls().contains(&device_id));
    }

    #[tokio::test(start_paused = true)]
    async fn subsequent_frame_clears_comm_failure() {
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let watchdog = CommFailWatchdog::new(store.clone(), hooks.clone(), Duration::from_secs(10));
        let eui = Eui64(7);

        watchdog.feed(eui);
        tokio::time::advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert!(watchdog.is_failed(eui));

        watchdog.feed(eui);
        tokio::task::yield_now().await;

        let device_id = eui.to_device_id();
        let value = store.get_resource(&device_id, "commFailure").await.unwrap();
        assert_eq!(value.value, serde_json::json!("false"));
        assert!(hooks.communication_restored_calls().contains(&device_id));
        assert!(!watchdog.is_failed(eui));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_disables_watchdog() {
        let store = Arc::new(FakeStore::default());
        let hooks = Arc::new(FakeHooks::default());
        let watchdog = CommFailWatchdog::new(store.clone(), hooks, Duration::ZERO);
        let eui = Eui64(1);

        watchdog.feed(eui);
        tokio::time::advance(Duration::from_secs(3600)).await;
        tokio::task::yield_now().await;

        let device_id = eui.to_device_id();
        assert!(store.get_resource(&device_id, "commFailure").await.is_none());
    }
}
