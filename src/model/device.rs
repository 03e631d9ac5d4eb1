use super::{Eui64, Metadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a device is powered; governs whether it sleeps between check-ins.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSource {
    Mains,
    Battery,
    BatteryBacked,
}

/// Whether a cluster record sits on the server or client side of an endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterRole {
    Server,
    Client,
}

/// A single cluster as advertised by an endpoint: id, role, and the attribute ids
/// discovered (or declared) on it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub cluster_id: u16,
    pub role: ClusterRole,
    pub attribute_ids: BTreeSet<u16>,
}

impl ClusterRecord {
    pub fn new(cluster_id: u16, role: ClusterRole) -> Self {
        Self {
            cluster_id,
            role,
            attribute_ids: BTreeSet::new(),
        }
    }
}

/// A logical service address on a device (1..240), carrying its own stable textual id
/// assigned by the owning higher-level driver.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Endpoint {
    /// The 1-byte Zigbee endpoint number. Mirrored immutably into the `zigbee_epid`
    /// metadata key once persisted (see [`Metadata::ZIGBEE_EPID`]).
    pub number: u8,
    /// Stable textual id assigned by the owning driver, independent of `number`.
    pub id: String,
    /// Zigbee profile application device id.
    pub app_device_id: u16,
    pub server_clusters: Vec<ClusterRecord>,
    pub client_clusters: Vec<ClusterRecord>,
    pub metadata: Metadata,
}

impl Endpoint {
    pub fn new(number: u8, id: impl Into<String>, app_device_id: u16) -> Self {
        let mut metadata = Metadata::default();
        metadata.insert(Metadata::ZIGBEE_EPID, number.to_string());
        Self {
            number,
            id: id.into(),
            app_device_id,
            server_clusters: Vec::new(),
            client_clusters: Vec::new(),
            metadata,
        }
    }

    pub fn advertises(&self, cluster_id: u16) -> Option<ClusterRole> {
        if self.server_clusters.iter().any(|c| c.cluster_id == cluster_id) {
            Some(ClusterRole::Server)
        } else if self.client_clusters.iter().any(|c| c.cluster_id == cluster_id) {
            Some(ClusterRole::Client)
        } else {
            None
        }
    }
}

/// A paired Zigbee end device, owned by the [`crate::hal::Store`] and consumed by the
/// driver runtime through that interface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Device {
    pub eui: Eui64,
    pub manufacturer: String,
    pub model: String,
    pub hardware_version: u32,
    pub firmware_version: u32,
    pub power_source: PowerSource,
    pub comm_fail: bool,
    pub endpoints: Vec<Endpoint>,
    pub metadata: Metadata,
}

impl Device {
    pub fn id(&self) -> String {
        self.eui.to_device_id()
    }

    pub fn firmware_version_string(&self) -> String {
        format!("0x{:08x}", self.firmware_version)
    }

    pub fn endpoint(&self, number: u8) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.number == number)
    }

    pub fn endpoint_mut(&mut self, number: u8) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|e| e.number == number)
    }

    pub fn first_endpoint(&self) -> Option<&Endpoint> {
        self.endpoints.first()
    }
}
