//! The data model the driver runtime persists and hands to callers: devices, endpoints,
//! cluster records, resources, and metadata.

mod device;
mod discovered;
mod resource;

pub use device::*;
pub use discovered::*;
pub use resource::*;

/// Textual device id: the lowercase hex encoding of the device's EUI64, e.g.
/// `"000d6f0001234567"`. Bijective with [`Eui64`].
pub type DeviceId = String;

/// A 64-bit Zigbee device identifier.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Eui64(pub u64);

impl Eui64 {
    pub fn to_device_id(self) -> DeviceId {
        format!("{:016x}", self.0)
    }

    pub fn from_device_id(id: &str) -> Option<Self> {
        u64::from_str_radix(id, 16).ok().map(Eui64)
    }
}

impl std::fmt::Display for Eui64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}
