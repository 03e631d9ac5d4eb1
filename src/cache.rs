//! The discovered-device cache (§2, §3): a per-EUI64 record of the structural
//! inventory gathered during pairing. Owned exclusively by the cache itself; rebuilt
//! from persisted `discoveredDetails` metadata on demand, never from the store's
//! device/endpoint records directly.

use crate::model::{DiscoveredDevice, Eui64};
use std::collections::HashMap;
use std::sync::Mutex;

/// Guarded by a single per-runtime mutex (§5 shared-state table).
#[derive(Default)]
pub struct DiscoveredCache {
    inner: Mutex<HashMap<Eui64, DiscoveredDevice>>,
}

impl DiscoveredCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones the record into the cache, replacing any prior entry for the same EUI
    /// (§4.2 step 3).
    pub fn insert(&self, device: DiscoveredDevice) {
        let eui = match device.eui() {
            Some(eui) => eui,
            None => return,
        };
        self.inner.lock().expect("cache lock").insert(eui, device);
    }

    /// Returns `None` on a miss, the idiomatic Rust realization of "returns null on
    /// empty" (§9b).
    pub fn get(&self, eui: Eui64) -> Option<DiscoveredDevice> {
        self.inner.lock().expect("cache lock").get(&eui).cloned()
    }

    pub fn remove(&self, eui: Eui64) -> Option<DiscoveredDevice> {
        self.inner.lock().expect("cache lock").remove(&eui)
    }

    /// Rebuilds a single entry from persisted metadata, used when the cache has no
    /// in-memory entry for a device the store already knows about.
    pub fn rebuild_from_metadata(&self, raw_json: &str) -> Result<(), serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw_json)?;
        let device = DiscoveredDevice::from_json(&value)?;
        self.insert(device);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
