use std::time::Duration;

/// Source of named configuration properties, e.g. a gateway-wide property service.
/// Kept deliberately tiny (string in, string out) since the property-service glue
/// itself is out of scope (§1); callers typically implement this over whatever config
/// store the embedding gateway already has.
pub trait PropertySource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Typed realization of the configuration-properties table in §6, with defaults
/// matching that table exactly.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    pub firmware_upgrade_delay: Duration,
    pub firmware_upgrade_retry_delay: Duration,
    pub firmware_upgrade_no_delay: bool,
    pub report_collection_enabled: bool,
    pub channel_energy_collection_enabled: bool,
    pub channel_scan_period: Duration,
    pub channel_scans_per_channel: u32,
    pub channel_scan_duration: Duration,
    pub channel_scan_inter_channel_delay: Duration,
    pub comm_fail_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            firmware_upgrade_delay: Duration::from_secs(7200),
            firmware_upgrade_retry_delay: Duration::from_secs(3600),
            firmware_upgrade_no_delay: false,
            report_collection_enabled: false,
            channel_energy_collection_enabled: false,
            channel_scan_period: Duration::from_secs(60 * 60),
            channel_scans_per_channel: 10,
            channel_scan_duration: Duration::from_millis(100),
            channel_scan_inter_channel_delay: Duration::from_millis(1000),
            comm_fail_timeout: Duration::from_secs(3600),
        }
    }
}

impl DriverConfig {
    /// The initial firmware-upgrade scheduling delay, honoring the
    /// `zigbee.fw.upgrade.no.delay` bypass (§6).
    pub fn effective_firmware_upgrade_delay(&self) -> Duration {
        if self.firmware_upgrade_no_delay {
            Duration::from_secs(1)
        } else {
            self.firmware_upgrade_delay
        }
    }

    pub fn from_properties(src: &dyn PropertySource) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = src.get("firmware.upgrade.delaySecs").and_then(|s| s.parse().ok()) {
            cfg.firmware_upgrade_delay = Duration::from_secs(v);
        }
        if let Some(v) = src
            .get("firmware.upgrade.retryDelaySecs")
            .and_then(|s| s.parse().ok())
        {
            cfg.firmware_upgrade_retry_delay = Duration::from_secs(v);
        }
        if let Some(v) = src
            .get("zigbee.fw.upgrade.no.delay")
            .and_then(|s| s.parse().ok())
        {
            cfg.firmware_upgrade_no_delay = v;
        }
        if let Some(v) = src
            .get("cpe.zigbee.reportDeviceInfo.enabled")
            .and_then(|s| s.parse().ok())
        {
            cfg.report_collection_enabled = v;
        }
        if let Some(v) = src
            .get("cpe.diagnostics.zigBeeData.enabled")
            .and_then(|s| s.parse().ok())
        {
            cfg.channel_energy_collection_enabled = v;
        }
        if let Some(v) = src
            .get("cpe.diagnostics.zigBeeData.collection.delay.min")
            .and_then(|s| s.parse().ok())
        {
            cfg.channel_scan_period = Duration::from_secs(v * 60);
        }
        if let Some(v) = src
            .get("cpe.diagnostics.zigBeeData.per.channel.number.of.scans")
            .and_then(|s| s.parse().ok())
        {
            cfg.channel_scans_per_channel = v;
        }
        if let Some(v) = src
            .get("cpe.diagnostics.zigBeeData.channel.scan.duration.ms")
            .and_then(|s| s.parse().ok())
        {
            cfg.channel_scan_duration = Duration::from_millis(v);
        }
        if let Some(v) = src
            .get("cpe.diagnostics.zigBeeData.channel.scan.delay.ms")
            .and_then(|s| s.parse().ok())
        {
            cfg.channel_scan_inter_channel_delay = Duration::from_millis(v);
        }
        cfg
    }
}
