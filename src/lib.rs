//! A Zigbee device-management driver runtime for a smart-home gateway.
//!
//! This crate owns the portion of a Zigbee gateway that sits above the radio stack and
//! below a device-type-specific driver: pairing a freshly discovered device, configuring
//! the handful of cluster contracts every device is expected to support, coordinating
//! poll-control/battery-saving behavior for sleepy end devices, watching for
//! communication failure, orchestrating firmware upgrades, and recording the bounded
//! per-device event history a gateway's diagnostics surface reads from.
//!
//! It does not implement the radio stack, the device-descriptor repository, or the
//! persistence layer — those are consumed through the [`hal::Hal`], [`hal::Descriptors`],
//! and [`hal::Store`] traits respectively, which the embedding gateway supplies. A
//! device-type-specific driver built on top of this crate customizes behavior by
//! implementing (a subset of) [`hal::DriverHooks`].
//!
//! # Basic usage
//!
//! ```no_run
//! use std::collections::HashSet;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use zigbee_driver_core::cluster::ClusterRegistry;
//! use zigbee_driver_core::config::DriverConfig;
//! use zigbee_driver_core::driver::Driver;
//! use zigbee_driver_core::firmware::ReqwestDownloader;
//!
//! # async fn build(
//! #     hal: Arc<dyn zigbee_driver_core::hal::Hal>,
//! #     descriptors: Arc<dyn zigbee_driver_core::hal::Descriptors>,
//! #     store: Arc<dyn zigbee_driver_core::hal::Store>,
//! #     hooks: Arc<dyn zigbee_driver_core::hal::DriverHooks>,
//! # ) {
//! let driver = Driver::new(
//!     hal,
//!     descriptors,
//!     store,
//!     hooks,
//!     Arc::new(ReqwestDownloader::default()),
//!     Arc::new(ClusterRegistry::with_common_clusters()),
//!     DriverConfig::default(),
//!     PathBuf::from("/var/cache/zigbee-firmware"),
//!     HashSet::new(),
//! );
//! driver.start().await;
//! # }
//! ```

pub mod cache;
pub mod cluster;
pub mod commfail;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod event_tracker;
pub mod firmware;
pub mod hal;
pub mod model;
pub mod pairing;
pub mod poll_control;
#[cfg(test)]
mod testutil;

pub mod prelude {
    pub use crate::config::DriverConfig;
    pub use crate::driver::Driver;
    pub use crate::error::{DriverError, DriverResult};
    pub use crate::hal::{Descriptors, DriverHooks, Hal, Store};
    pub use crate::model::{Device, DeviceId, Endpoint, Eui64, Resource};
}
