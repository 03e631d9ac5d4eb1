//! The three external interfaces the driver runtime consumes (§1, §6), plus the
//! per-driver hook trait it exposes upward. None of these are implemented here — the
//! byte-level radio stack, descriptor repository, and persistence store live outside
//! this crate; this module only describes the shape the runtime expects them to have.

use crate::model::{DeviceId, Eui64};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Metadata about an inbound frame common to both attribute reports and cluster
/// commands: which device/endpoint/cluster it came from, and the radio-level signal
/// quality at the time it was received.
#[derive(Clone, Debug)]
pub struct FrameEnvelope {
    pub eui: Eui64,
    pub endpoint: u8,
    pub cluster_id: u16,
    pub mfg_id: Option<u16>,
    /// Near-end RSSI as reported by the HAL for this frame.
    pub rssi: i8,
    /// Near-end LQI as reported by the HAL for this frame.
    pub lqi: u8,
    pub sequence_number: u8,
}

#[derive(Clone, Debug)]
pub struct AttributeReport {
    pub envelope: FrameEnvelope,
    pub attribute_id: u16,
    pub raw_value: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct ClusterCommand {
    pub envelope: FrameEnvelope,
    pub command_id: u8,
    pub payload: Vec<u8>,
}

/// Result of one HAL energy scan on a single 802.15.4 channel.
#[derive(Clone, Copy, Debug)]
pub struct ChannelEnergySample {
    pub channel: u8,
    pub min_rssi: i8,
    pub max_rssi: i8,
    pub mean_rssi: i8,
}

/// The byte-level Zigbee HAL (consumed, lower interface, §6). Sending/receiving ZCL
/// frames, binding, and attribute-reporting configuration all live below this trait;
/// the driver runtime only ever calls it.
#[async_trait]
pub trait Hal: Send + Sync {
    async fn send_cluster_command(
        &self,
        eui: Eui64,
        endpoint: u8,
        cluster_id: u16,
        mfg_id: Option<u16>,
        command_id: u8,
        payload: &[u8],
    ) -> Result<(), crate::error::DriverError>;

    async fn read_attribute(
        &self,
        eui: Eui64,
        endpoint: u8,
        cluster_id: u16,
        attribute_id: u16,
    ) -> Result<i64, crate::error::DriverError>;

    async fn write_attribute(
        &self,
        eui: Eui64,
        endpoint: u8,
        cluster_id: u16,
        attribute_id: u16,
        value: i64,
    ) -> Result<(), crate::error::DriverError>;

    async fn configure_reporting(
        &self,
        eui: Eui64,
        endpoint: u8,
        cluster_id: u16,
        attribute_id: u16,
        min_interval: u16,
        max_interval: u16,
        reportable_change: i64,
    ) -> Result<(), crate::error::DriverError>;

    async fn bind(&self, eui: Eui64, endpoint: u8, cluster_id: u16) -> Result<(), crate::error::DriverError>;

    async fn request_leave(&self, eui: Eui64, endpoint: u8) -> Result<(), crate::error::DriverError>;

    async fn factory_reset(&self, eui: Eui64, endpoint: u8) -> Result<(), crate::error::DriverError>;

    async fn energy_scan(
        &self,
        channel: u8,
        scans: u32,
        scan_duration: Duration,
    ) -> Result<ChannelEnergySample, crate::error::DriverError>;

    /// Discover the set of attribute ids actually implemented for a cluster on a
    /// device/endpoint, used during pairing step 6.
    async fn enumerate_attributes(
        &self,
        eui: Eui64,
        endpoint: u8,
        cluster_id: u16,
    ) -> Result<Vec<u16>, crate::error::DriverError>;
}

/// Latest-firmware metadata and per-device configuration overrides for one
/// manufacturer/model/hardware/firmware tuple.
#[derive(Clone, Debug)]
pub struct FirmwareMetadata {
    pub version: u32,
    pub filenames: Vec<String>,
    pub base_url: String,
}

#[derive(Clone, Debug, Default)]
pub struct DeviceDescriptor {
    pub device_class: String,
    pub device_class_version: u32,
    pub latest_firmware: Option<FirmwareMetadata>,
    pub configuration_metadata: HashMap<String, String>,
}

/// The device-descriptor repository (consumed, §1/§6).
#[async_trait]
pub trait Descriptors: Send + Sync {
    async fn resolve(
        &self,
        manufacturer: &str,
        model: &str,
        hardware_version: u32,
        firmware_version: u32,
    ) -> Result<DeviceDescriptor, crate::error::DriverError>;
}

/// Where a resource update originated, passed through to [`Store::update_resource`] so
/// the store can distinguish (e.g.) a HAL-driven update from a user-initiated write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeOrigin {
    Hal,
    Poll,
    Configuration,
    UpperDriver,
    Unspecified,
}

/// The persistence store for devices, endpoints, resources, and metadata (consumed,
/// §1/§6). The store exclusively owns persisted records (§3 Ownership); the driver
/// runtime only ever reads and writes through this interface.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_device(&self, id: &DeviceId) -> Option<crate::model::Device>;
    async fn put_device(&self, device: crate::model::Device) -> Result<(), crate::error::DriverError>;
    async fn remove_device(&self, id: &DeviceId) -> Result<(), crate::error::DriverError>;
    async fn list_devices(&self) -> Vec<crate::model::Device>;

    async fn get_resource(&self, device_id: &DeviceId, name: &str) -> Option<crate::model::Resource>;
    async fn update_resource(
        &self,
        device_id: &DeviceId,
        resource: crate::model::Resource,
        origin: ChangeOrigin,
    ) -> Result<(), crate::error::DriverError>;
    /// Age of a resource's last write, used by the poll-control staleness checks (§4.4).
    async fn resource_age(&self, device_id: &DeviceId, name: &str) -> Option<Duration>;

    async fn get_metadata(&self, device_id: &DeviceId, key: &str) -> Option<String>;
    async fn set_metadata(
        &self,
        device_id: &DeviceId,
        key: &str,
        value: &str,
    ) -> Result<(), crate::error::DriverError>;

    /// EUI64s of devices whose `commFailure` resource is currently `true`, consulted at
    /// runtime construction so the watchdog can re-arm them in the fail state (§4.5).
    async fn devices_in_comm_fail(&self) -> Vec<Eui64>;
}

/// Per-driver hooks the upper (device-type-specific) driver may override. Every method
/// carries a default accept/no-op implementation, so a concrete driver only overrides
/// what it actually customizes (§6 "Per-driver interface").
#[async_trait]
pub trait DriverHooks: Send + Sync {
    /// Offered first chance to claim a discovered device. Default declines, falling
    /// back to device-id matching (§4.2 step 2).
    async fn claim(&self, _discovered: &crate::model::DiscoveredDevice) -> bool {
        false
    }

    async fn configure_device(&self, _device_id: &DeviceId) -> Result<(), crate::error::DriverError> {
        Ok(())
    }

    async fn fetch_initial_resource_values(
        &self,
        _device_id: &DeviceId,
    ) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }

    async fn register_resources(&self, _device_id: &DeviceId) -> Vec<crate::model::Resource> {
        Vec::new()
    }

    async fn device_persisted(&self, _device_id: &DeviceId) {}

    /// Unconditional forward of every inbound attribute report, after cluster dispatch
    /// (§4.3 step 3). Default no-op.
    async fn handle_attribute_report(&self, _report: &AttributeReport) {}

    /// Unconditional forward of every inbound cluster command, after cluster dispatch
    /// (§4.3 step 3). Default no-op.
    async fn handle_command(&self, _command: &ClusterCommand) {}

    async fn device_rejoined(&self, _device_id: &DeviceId, _secure: bool) {}

    async fn device_left(&self, _device_id: &DeviceId) {}

    /// Invoked when the comm-fail watchdog expires for a device (§4.5). Default no-op.
    async fn communication_failed(&self, _device_id: &DeviceId) {}

    /// Invoked when a frame is received from a device previously in comm-fail (§4.5).
    async fn communication_restored(&self, _device_id: &DeviceId) {}

    /// Veto a cluster's configuration during pairing (§4.1). Default allows every
    /// cluster to configure.
    async fn pre_configure_cluster(&self, _device_id: &DeviceId, _cluster_id: u16) -> bool {
        true
    }

    async fn pre_device_removed(&self, _device_id: &DeviceId) {}
    async fn post_device_removed(&self, _device_id: &DeviceId) {}

    async fn system_power_event(&self, _mains_present: bool) {}

    async fn handle_property_changed(&self, _key: &str, _value: &str) {}

    async fn fetch_runtime_stats(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Predicate deciding whether `latest` should replace `current`. Default is the
    /// lexicographic compare named in §4.6 as the fallback when no driver predicate is
    /// supplied.
    fn firmware_upgrade_required(&self, current: u32, latest: u32) -> bool {
        latest > current
    }

    /// If `Some`, invoked instead of sending an OTA image-notify once the firmware
    /// download completes (§4.6 step 4). Default `None` — use the image-notify path.
    async fn initiate_firmware_upgrade(&self, _device_id: &DeviceId) -> Option<Result<(), crate::error::DriverError>> {
        None
    }

    async fn firmware_upgrade_failed(&self, _device_id: &DeviceId, _reason: &str) {}

    /// Maps an endpoint's application device id to a driver-specific profile tag for
    /// `DeviceFoundDetails` (§4.2 step 4).
    fn map_device_id_to_profile(&self, _app_device_id: u16) -> Option<String> {
        None
    }

    async fn device_needs_reconfiguring(&self, _device_id: &DeviceId) -> bool {
        false
    }

    async fn subsystem_initialized(&self, _name: &str) {}
}
