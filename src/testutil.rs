//! Fakes for the three consumed traits (`Hal`, `Descriptors`, `Store`) plus
//! `DriverHooks`, shared by every subsystem's tests (§10.4) rather than each module
//! redefining its own. Test-only; never compiled into a release build.

#![cfg(test)]

use crate::error::{DriverError, DriverResult};
use crate::hal::{
    AttributeReport, ChangeOrigin, ChannelEnergySample, ClusterCommand, Descriptors,
    DeviceDescriptor, DriverHooks, Hal,
};
use crate::model::{Device, DeviceId, Eui64, Resource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct SentCommand {
    pub eui: Eui64,
    pub endpoint: u8,
    pub cluster_id: u16,
    pub mfg_id: Option<u16>,
    pub command_id: u8,
    pub payload: Vec<u8>,
}

#[derive(Default)]
pub struct FakeHal {
    pub sent_commands: Mutex<Vec<SentCommand>>,
    pub written_attributes: Mutex<Vec<(Eui64, u8, u16, u16, i64)>>,
    pub bound: Mutex<Vec<(Eui64, u8, u16)>>,
    pub read_values: Mutex<HashMap<(u64, u8, u16, u16), i64>>,
    pub energy_samples: Mutex<HashMap<u8, ChannelEnergySample>>,
    pub enumerate_responses: Mutex<HashMap<(u64, u8, u16), Vec<u16>>>,
    pub fail_writes: Mutex<bool>,
}

impl FakeHal {
    pub fn sent_to(&self, cluster_id: u16) -> Vec<SentCommand> {
        self.sent_commands
            .lock()
            .expect("lock")
            .iter()
            .filter(|c| c.cluster_id == cluster_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Hal for FakeHal {
    async fn send_cluster_command(
        &self,
        eui: Eui64,
        endpoint: u8,
        cluster_id: u16,
        mfg_id: Option<u16>,
        command_id: u8,
        payload: &[u8],
    ) -> DriverResult<()> {
        self.sent_commands.lock().expect("lock").push(SentCommand {
            eui,
            endpoint,
            cluster_id,
            mfg_id,
            command_id,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn read_attribute(&self, eui: Eui64, endpoint: u8, cluster_id: u16, attribute_id: u16) -> DriverResult<i64> {
        Ok(self
            .read_values
            .lock()
            .expect("lock")
            .get(&(eui.0, endpoint, cluster_id, attribute_id))
            .copied()
            .unwrap_or(0))
    }

    async fn write_attribute(
        &self,
        eui: Eui64,
        endpoint: u8,
        cluster_id: u16,
        attribute_id: u16,
        value: i64,
    ) -> DriverResult<()> {
        if *self.fail_writes.lock().expect("lock") {
            return Err(DriverError::Transport("fake write failure".into()));
        }
        self.written_attributes
            .lock()
            .expect("lock")
            .push((eui, endpoint, cluster_id, attribute_id, value));
        Ok(())
    }

    async fn configure_reporting(
        &self,
        _eui: Eui64,
        _endpoint: u8,
        _cluster_id: u16,
        _attribute_id: u16,
        _min_interval: u16,
        _max_interval: u16,
        _reportable_change: i64,
    ) -> DriverResult<()> {
        Ok(())
    }

    async fn bind(&self, eui: Eui64, endpoint: u8, cluster_id: u16) -> DriverResult<()> {
        self.bound.lock().expect("lock").push((eui, endpoint, cluster_id));
        Ok(())
    }

    async fn request_leave(&self, _eui: Eui64, _endpoint: u8) -> DriverResult<()> {
        Ok(())
    }

    async fn factory_reset(&self, _eui: Eui64, _endpoint: u8) -> DriverResult<()> {
        Ok(())
    }

    async fn energy_scan(&self, channel: u8, _scans: u32, _scan_duration: Duration) -> DriverResult<ChannelEnergySample> {
        Ok(self
            .energy_samples
            .lock()
            .expect("lock")
            .get(&channel)
            .copied()
            .unwrap_or(ChannelEnergySample {
                channel,
                min_rssi: -60,
                max_rssi: -40,
                mean_rssi: -50,
            }))
    }

    async fn enumerate_attributes(&self, eui: Eui64, endpoint: u8, cluster_id: u16) -> DriverResult<Vec<u16>> {
        Ok(self
            .enumerate_responses
            .lock()
            .expect("lock")
            .get(&(eui.0, endpoint, cluster_id))
            .cloned()
            .unwrap_or_default())
    }
}

pub struct FakeDescriptors {
    pub descriptor: DeviceDescriptor,
}

impl FakeDescriptors {
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self { descriptor }
    }
}

#[async_trait]
impl Descriptors for FakeDescriptors {
    async fn resolve(&self, _manufacturer: &str, _model: &str, _hardware_version: u32, _firmware_version: u32) -> DriverResult<DeviceDescriptor> {
        Ok(self.descriptor.clone())
    }
}

#[derive(Default)]
pub struct FakeStore {
    devices: Mutex<HashMap<DeviceId, Device>>,
    resources: Mutex<HashMap<(DeviceId, String), Resource>>,
    resource_age_overrides: Mutex<HashMap<(DeviceId, String), Duration>>,
    metadata: Mutex<HashMap<(DeviceId, String), String>>,
    comm_fail_at_startup: Mutex<Vec<Eui64>>,
}

impl FakeStore {
    pub fn set_resource_age(&self, device_id: &str, name: &str, age: Duration) {
        self.resource_age_overrides
            .lock()
            .expect("lock")
            .insert((device_id.to_string(), name.to_string()), age);
    }

    pub fn seed_comm_fail(&self, eui: Eui64) {
        self.comm_fail_at_startup.lock().expect("lock").push(eui);
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn get_device(&self, id: &DeviceId) -> Option<Device> {
        self.devices.lock().expect("lock").get(id).cloned()
    }

    async fn put_device(&self, device: Device) -> DriverResult<()> {
        self.devices.lock().expect("lock").insert(device.id(), device);
        Ok(())
    }

    async fn remove_device(&self, id: &DeviceId) -> DriverResult<()> {
        self.devices.lock().expect("lock").remove(id);
        Ok(())
    }

    async fn list_devices(&self) -> Vec<Device> {
        self.devices.lock().expect("lock").values().cloned().collect()
    }

    async fn get_resource(&self, device_id: &DeviceId, name: &str) -> Option<Resource> {
        self.resources
            .lock()
            .expect("lock")
            .get(&(device_id.clone(), name.to_string()))
            .cloned()
    }

    async fn update_resource(&self, device_id: &DeviceId, resource: Resource, _origin: ChangeOrigin) -> DriverResult<()> {
        self.resources
            .lock()
            .expect("lock")
            .insert((device_id.clone(), resource.name.clone()), resource);
        Ok(())
    }

    async fn resource_age(&self, device_id: &DeviceId, name: &str) -> Option<Duration> {
        let key = (device_id.clone(), name.to_string());
        if let Some(age) = self.resource_age_overrides.lock().expect("lock").get(&key) {
            return Some(*age);
        }
        self.resources
            .lock()
            .expect("lock")
            .get(&key)
            .map(|r| Duration::from_secs(r.age_secs()))
    }

    async fn get_metadata(&self, device_id: &DeviceId, key: &str) -> Option<String> {
        self.metadata
            .lock()
            .expect("lock")
            .get(&(device_id.clone(), key.to_string()))
            .cloned()
    }

    async fn set_metadata(&self, device_id: &DeviceId, key: &str, value: &str) -> DriverResult<()> {
        self.metadata
            .lock()
            .expect("lock")
            .insert((device_id.clone(), key.to_string()), value.to_string());
        Ok(())
    }

    async fn devices_in_comm_fail(&self) -> Vec<Eui64> {
        self.comm_fail_at_startup.lock().expect("lock").clone()
    }
}

#[derive(Default)]
pub struct FakeHooks {
    pub claim_result: Mutex<bool>,
    calls: Mutex<FakeHooksCalls>,
    pub firmware_predicate_override: Mutex<Option<bool>>,
    pub initiate_upgrade_override: Mutex<Option<bool>>,
}

#[derive(Default)]
struct FakeHooksCalls {
    communication_failed: Vec<DeviceId>,
    communication_restored: Vec<DeviceId>,
    device_persisted: Vec<DeviceId>,
    firmware_upgrade_failed: Vec<DeviceId>,
    attribute_reports: Vec<AttributeReport>,
    commands: Vec<ClusterCommand>,
}

impl FakeHooks {
    pub fn communication_failed_calls(&self) -> Vec<DeviceId> {
        self.calls.lock().expect("lock").communication_failed.clone()
    }

    pub fn communication_restored_calls(&self) -> Vec<DeviceId> {
        self.calls.lock().expect("lock").communication_restored.clone()
    }

    pub fn device_persisted_calls(&self) -> Vec<DeviceId> {
        self.calls.lock().expect("lock").device_persisted.clone()
    }

    pub fn firmware_upgrade_failed_calls(&self) -> Vec<DeviceId> {
        self.calls.lock().expect("lock").firmware_upgrade_failed.clone()
    }

    pub fn attribute_report_calls(&self) -> Vec<AttributeReport> {
        self.calls.lock().expect("lock").attribute_reports.clone()
    }

    pub fn command_calls(&self) -> Vec<ClusterCommand> {
        self.calls.lock().expect("lock").commands.clone()
    }
}

#[async_trait]
impl DriverHooks for FakeHooks {
    async fn claim(&self, _discovered: &crate::model::DiscoveredDevice) -> bool {
        *self.claim_result.lock().expect("lock")
    }

    async fn device_persisted(&self, device_id: &DeviceId) {
        self.calls.lock().expect("lock").device_persisted.push(device_id.clone());
    }

    async fn communication_failed(&self, device_id: &DeviceId) {
        self.calls.lock().expect("lock").communication_failed.push(device_id.clone());
    }

    async fn communication_restored(&self, device_id: &DeviceId) {
        self.calls.lock().expect("lock").communication_restored.push(device_id.clone());
    }

    async fn handle_attribute_report(&self, report: &AttributeReport) {
        self.calls.lock().expect("lock").attribute_reports.push(report.clone());
    }

    async fn handle_command(&self, command: &ClusterCommand) {
        self.calls.lock().expect("lock").commands.push(command.clone());
    }

    async fn firmware_upgrade_failed(&self, device_id: &DeviceId, _reason: &str) {
        self.calls.lock().expect("lock").firmware_upgrade_failed.push(device_id.clone());
    }

    fn firmware_upgrade_required(&self, current: u32, latest: u32) -> bool {
        if let Some(v) = *self.firmware_predicate_override.lock().expect("lock") {
            return v;
        }
        latest > current
    }

    async fn initiate_firmware_upgrade(&self, _device_id: &DeviceId) -> Option<DriverResult<()>> {
        self.initiate_upgrade_override.lock().expect("lock").map(|ok| {
            if ok {
                Ok(())
            } else {
                Err(DriverError::Transport("fake upgrade initiation failure".into()))
            }
        })
    }
}
