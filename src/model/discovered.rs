use super::{Eui64, PowerSource};
use serde::{Deserialize, Serialize};

/// A single cluster entry as it appears in a discovered-device's endpoint inventory.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredCluster {
    #[serde(rename = "clusterId")]
    pub cluster_id: u16,
    #[serde(rename = "isServer")]
    pub is_server: bool,
    #[serde(rename = "attributeIds")]
    pub attribute_ids: Vec<u16>,
}

/// One endpoint in a discovered-device record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredEndpoint {
    #[serde(rename = "endpointId")]
    pub endpoint_id: u8,
    #[serde(rename = "appDeviceId")]
    pub app_device_id: u16,
    #[serde(rename = "serverClusters")]
    pub server_clusters: Vec<DiscoveredCluster>,
    #[serde(rename = "clientClusters")]
    pub client_clusters: Vec<DiscoveredCluster>,
}

/// The structural inventory of a device's endpoints, clusters, and attributes captured
/// at pairing. Persisted verbatim (as JSON) under the `discoveredDetails` metadata key
/// on the device (§6); round-tripping this type through that JSON encoding must be
/// lossless (Testable Property 10).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub eui64: String,
    pub manufacturer: String,
    pub model: String,
    #[serde(rename = "hardwareVersion")]
    pub hardware_version: u32,
    #[serde(rename = "firmwareVersion")]
    pub firmware_version: u32,
    #[serde(rename = "powerSource")]
    pub power_source: PowerSource,
    pub endpoints: Vec<DiscoveredEndpoint>,
}

impl DiscoveredDevice {
    pub fn eui(&self) -> Option<Eui64> {
        u64::from_str_radix(self.eui64.trim_start_matches("0x"), 16).ok().map(Eui64)
    }

    pub fn first_endpoint(&self) -> Option<&DiscoveredEndpoint> {
        self.endpoints.first()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}
