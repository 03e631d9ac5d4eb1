//! The cluster registry and configuraton engine (§4.1): a "capability set" of
//! polymorphic cluster objects, keyed by cluster id, each implementing whichever subset
//! of {configure, handleAttributeReport, handleCommand, handleAlarm, handleAlarmCleared,
//! handlePollCheckin, destroy} it needs. Expressed here as a trait with default no-op
//! methods rather than a sparse function-pointer table.

mod builtin;

pub use builtin::*;

use crate::error::DriverResult;
use crate::hal::{AttributeReport, ClusterCommand, DeviceDescriptor, Hal, Store};
use crate::model::{Device, DiscoveredDevice, Endpoint, Eui64};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Well-known cluster ids referenced by the built-in clusters (§4.1).
pub mod cluster_ids {
    pub const BASIC: u16 = 0x0000;
    pub const POWER_CONFIGURATION: u16 = 0x0001;
    pub const DEVICE_TEMPERATURE_CONFIGURATION: u16 = 0x0002;
    pub const ALARMS: u16 = 0x0009;
    pub const POLL_CONTROL: u16 = 0x0020;
    pub const TEMPERATURE_MEASUREMENT: u16 = 0x0402;
    pub const IAS_ZONE: u16 = 0x0500;
    pub const DIAGNOSTICS: u16 = 0x0B05;
    pub const OTA_UPGRADE: u16 = 0x0019;
    pub const REMOTE_CELL_MODEM: u16 = 0xFC01;
}

/// Tie-breaking priority among registered clusters during pairing configuration (§4.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClusterPriority {
    Highest,
    Default,
}

/// Everything a cluster's `configure` hook needs to write poll intervals, set up
/// attribute reporting, and consult descriptor/config overrides.
pub struct ConfigureContext<'a> {
    pub eui: Eui64,
    pub endpoint: &'a Endpoint,
    pub descriptor: &'a DeviceDescriptor,
    pub discovered: &'a DiscoveredDevice,
    pub hal: &'a dyn Hal,
    pub store: &'a dyn Store,
}

/// Everything the non-configure hooks need: access to the HAL (to answer back, e.g.
/// sending a check-in response) and the store (to update resources like
/// `lastMessageRSSI`).
pub struct ClusterContext<'a> {
    pub hal: &'a dyn Hal,
    pub store: &'a dyn Store,
}

/// A polymorphic cluster handler. Cluster ids fixed at construction via
/// [`Cluster::cluster_id`]; every other hook is optional and no-ops by default.
#[async_trait]
pub trait Cluster: Send + Sync {
    fn cluster_id(&self) -> u16;

    fn priority(&self) -> ClusterPriority {
        ClusterPriority::Default
    }

    async fn configure(&self, _ctx: &ConfigureContext<'_>) -> DriverResult<()> {
        Ok(())
    }

    async fn handle_attribute_report(&self, _ctx: &ClusterContext<'_>, _report: &AttributeReport) {}

    async fn handle_command(&self, _ctx: &ClusterContext<'_>, _command: &ClusterCommand) {}

    async fn handle_alarm(&self, _ctx: &ClusterContext<'_>, _device: &Device, _endpoint: u8, _alarm_code: u8) {}

    async fn handle_alarm_cleared(
        &self,
        _ctx: &ClusterContext<'_>,
        _device: &Device,
        _endpoint: u8,
        _alarm_code: u8,
    ) {
    }

    async fn handle_poll_checkin(&self, _ctx: &ClusterContext<'_>, _device: &Device) {}

    fn destroy(&self) {}
}

/// Holds every registered cluster handler, keyed by cluster id. Built once at startup
/// and read-only afterward (§5) — no lock required once construction is complete.
#[derive(Default)]
pub struct ClusterRegistry {
    clusters: HashMap<u16, Arc<dyn Cluster>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry with the six common clusters always registered (§4.1), plus
    /// whatever per-device-type clusters the caller supplies.
    pub fn with_common_clusters() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(PollControlCluster::new()));
        reg.register(Arc::new(AlarmsCluster::new()));
        reg.register(Arc::new(DiagnosticsCluster::new()));
        reg.register(Arc::new(TemperatureMeasurementCluster::new()));
        reg.register(Arc::new(PowerConfigurationCluster::new()));
        reg.register(Arc::new(OtaUpgradeCluster::new()));
        reg
    }

    pub fn register(&mut self, cluster: Arc<dyn Cluster>) {
        self.clusters.insert(cluster.cluster_id(), cluster);
    }

    pub fn get(&self, cluster_id: u16) -> Option<&Arc<dyn Cluster>> {
        self.clusters.get(&cluster_id)
    }

    /// Cluster ids in configuration order: highest priority first, then default,
    /// ties broken by cluster id for a stable, deterministic, test-reproducible order.
    pub fn configuration_order(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.clusters.keys().copied().collect();
        ids.sort_by_key(|id| {
            let cluster = &self.clusters[id];
            let rank = match cluster.priority() {
                ClusterPriority::Highest => 0,
                ClusterPriority::Default => 1,
            };
            (rank, *id)
        });
        ids
    }
}
