use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Mode bits a [`Resource`] can carry. Stored as a plain bitmask, mirroring the source
/// design rather than a richer enum set, since resources commonly combine several of
/// these at once (e.g. readable + emits-events).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResourceMode {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub dynamic: bool,
    pub emits_events: bool,
    pub lazy_save: bool,
}

impl ResourceMode {
    pub const READABLE: Self = Self {
        readable: true,
        writable: false,
        executable: false,
        dynamic: false,
        emits_events: false,
        lazy_save: false,
    };

    pub fn readable_writable() -> Self {
        Self {
            readable: true,
            writable: true,
            ..Default::default()
        }
    }
}

/// A typed value attached to a device or endpoint. Values are stored as JSON so a single
/// `Resource` type can represent the numeric, boolean, and string-formatted resources
/// named throughout §4 (e.g. `nearEndRssi` as a formatted decimal string, `batteryLow` as
/// a bool).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub value: serde_json::Value,
    pub mode: ResourceMode,
    /// Unix epoch seconds of the last write; drives the poll-control staleness checks.
    pub last_changed: u64,
}

impl Resource {
    pub fn new(name: impl Into<String>, value: impl Into<serde_json::Value>, mode: ResourceMode) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            mode,
            last_changed: now_epoch_secs(),
        }
    }

    pub fn set(&mut self, value: impl Into<serde_json::Value>) {
        self.value = value.into();
        self.last_changed = now_epoch_secs();
    }

    pub fn age_secs(&self) -> u64 {
        now_epoch_secs().saturating_sub(self.last_changed)
    }
}

pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Opaque string key/value metadata attached to a device or endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Metadata(HashMap<String, String>);

impl Metadata {
    /// Reserved key: decimal ASCII of the owning endpoint's Zigbee endpoint number.
    /// Immutable after the endpoint is created.
    pub const ZIGBEE_EPID: &'static str = "zigbee_epid";
    /// Reserved key: JSON-serialized [`crate::model::DiscoveredDevice`] record.
    pub const DISCOVERED_DETAILS: &'static str = "discoveredDetails";
    /// Reserved key: the resolved device descriptor's `deviceClass`, used by the event
    /// tracker's sensor-class exclusion (§4.7).
    pub const DEVICE_CLASS: &'static str = "deviceClass";

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}
