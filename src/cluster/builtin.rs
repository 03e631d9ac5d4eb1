use super::{cluster_ids, ClusterContext, ClusterPriority, ConfigureContext};
use crate::error::{DriverError, DriverResult};
use crate::hal::{AttributeReport, ClusterCommand};
use crate::model::{Device, ResourceMode};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI8, AtomicU8, Ordering};

fn parse_metadata_u32(ctx: &ConfigureContext<'_>, key: &str) -> Option<u32> {
    ctx.descriptor
        .configuration_metadata
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
}

fn metadata_flag(ctx: &ConfigureContext<'_>, key: &str) -> bool {
    ctx.descriptor.configuration_metadata.get(key).map(|v| v == "true").unwrap_or(false)
}

/// Poll Control (0x0020). Writes the four poll-related intervals during configure and,
/// on inbound check-in, hands off to the poll-control coordinator — the hand-off itself
/// is performed by [`crate::dispatch`], which special-cases this cluster id, since the
/// coordinator needs access to the whole runtime (cache, event tracker) that a single
/// cluster object does not own.
pub struct PollControlCluster;

impl PollControlCluster {
    pub fn new() -> Self {
        Self
    }

    fn validate(name: &str, value: u32, min: u32, max: u32) -> DriverResult<u32> {
        if value < min || value > max {
            log::warn!("poll control: {name}={value} out of range [{min}, {max}]");
            return Err(DriverError::Validation(format!("{name} out of range")));
        }
        Ok(value)
    }
}

impl Default for PollControlCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl super::Cluster for PollControlCluster {
    fn cluster_id(&self) -> u16 {
        cluster_ids::POLL_CONTROL
    }

    fn priority(&self) -> ClusterPriority {
        ClusterPriority::Highest
    }

    async fn configure(&self, ctx: &ConfigureContext<'_>) -> DriverResult<()> {
        let check_in = parse_metadata_u32(ctx, "checkInInterval");
        let fast_poll = parse_metadata_u32(ctx, "fastPollTimeout");
        let long_poll = parse_metadata_u32(ctx, "longPollInterval");
        let short_poll = parse_metadata_u32(ctx, "shortPollInterval");

        if check_in.is_none() && fast_poll.is_none() && long_poll.is_none() && short_poll.is_none() {
            return Ok(());
        }

        ctx.hal.bind(ctx.eui, ctx.endpoint.number, self.cluster_id()).await?;

        if let Some(v) = check_in {
            let v = Self::validate("checkInInterval", v, 0, 0x006E0000)?;
            ctx.hal
                .write_attribute(ctx.eui, ctx.endpoint.number, self.cluster_id(), 0x0000, v as i64)
                .await?;
        }
        if let Some(v) = fast_poll {
            let v = Self::validate("fastPollTimeout", v, 1, 0xFFFF)?;
            ctx.hal
                .write_attribute(ctx.eui, ctx.endpoint.number, self.cluster_id(), 0x0003, v as i64)
                .await?;
        }
        if let Some(v) = long_poll {
            let v = Self::validate("longPollInterval", v, 4, 0x006E0000)?;
            ctx.hal
                .write_attribute(ctx.eui, ctx.endpoint.number, self.cluster_id(), 0x0001, v as i64)
                .await?;
        }
        if let Some(v) = short_poll {
            let v = Self::validate("shortPollInterval", v, 1, 0xFFFF)?;
            ctx.hal
                .write_attribute(ctx.eui, ctx.endpoint.number, self.cluster_id(), 0x0002, v as i64)
                .await?;
        }
        Ok(())
    }
}

/// Power Configuration (0x0001). Battery alarm/voltage/percentage/recharge-cycle
/// reporting, plus alarm-code → callback mapping.
pub struct PowerConfigurationCluster;

impl PowerConfigurationCluster {
    pub fn new() -> Self {
        Self
    }

    /// Maps a Power Configuration alarm code to the callback it should trigger (§4.1).
    pub fn alarm_callback(code: u8) -> Option<&'static str> {
        match code {
            0x00 => Some("mainsAlarmLow"),
            0x10 => Some("batteryAlarmLow"),
            0x3B => Some("batteryMissing"),
            0x3C => Some("batteryBad"),
            0x3F => Some("batteryHighTemperature"),
            _ => None,
        }
    }
}

impl Default for PowerConfigurationCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl super::Cluster for PowerConfigurationCluster {
    fn cluster_id(&self) -> u16 {
        cluster_ids::POWER_CONFIGURATION
    }

    async fn configure(&self, ctx: &ConfigureContext<'_>) -> DriverResult<()> {
        let voltage_max = parse_metadata_u32(ctx, "batteryVoltageReportMaxSecs").unwrap_or(0xFFFE);
        let mut configured_any = false;

        // battery alarm state: min 1s, max 0xFFFE, reportable 1
        if metadata_flag(ctx, "batteryAlarmStateReportingEnabled") {
            ctx.hal
                .configure_reporting(ctx.eui, ctx.endpoint.number, self.cluster_id(), 0x003E, 1, 0xFFFE, 1)
                .await?;
            configured_any = true;
        }

        // battery voltage: min 1s, configurable max, reportable 1
        if metadata_flag(ctx, "batteryVoltageReportingEnabled") {
            ctx.hal
                .configure_reporting(
                    ctx.eui,
                    ctx.endpoint.number,
                    self.cluster_id(),
                    0x0020,
                    1,
                    voltage_max as u16,
                    1,
                )
                .await?;
            configured_any = true;
        }

        // battery percentage remaining: min 1s, max 60*27, reportable 1
        if metadata_flag(ctx, "batteryPercentageReportingEnabled") {
            ctx.hal
                .configure_reporting(ctx.eui, ctx.endpoint.number, self.cluster_id(), 0x0021, 1, 60 * 27, 1)
                .await?;
            configured_any = true;
        }

        // battery recharge cycles (mfg-specific): min 1s, max 0xFFFE, reportable 1
        if metadata_flag(ctx, "batteryRechargeCyclesReportingEnabled") {
            ctx.hal
                .configure_reporting(ctx.eui, ctx.endpoint.number, self.cluster_id(), 0x0031, 1, 0xFFFE, 1)
                .await?;
            configured_any = true;
        }

        if let Some(mask) = parse_metadata_u32(ctx, "batteryAlarmMask") {
            ctx.hal
                .write_attribute(ctx.eui, ctx.endpoint.number, self.cluster_id(), 0x0035, mask as i64)
                .await?;
        }
        if let Some(mask) = parse_metadata_u32(ctx, "mainsAlarmMask") {
            ctx.hal
                .write_attribute(ctx.eui, ctx.endpoint.number, self.cluster_id(), 0x0010, mask as i64)
                .await?;
        }

        if configured_any {
            ctx.hal.bind(ctx.eui, ctx.endpoint.number, self.cluster_id()).await?;
        }
        Ok(())
    }

    async fn handle_attribute_report(&self, ctx: &ClusterContext<'_>, report: &AttributeReport) {
        let device_id = report.envelope.eui.to_device_id();
        match report.attribute_id {
            0x0020 => {
                if let Some(v) = decode_i64(&report.raw_value) {
                    let res = crate::model::Resource::new(
                        "batteryVoltage",
                        (v as i64).to_string(),
                        ResourceMode::readable_writable(),
                    );
                    let _ = ctx.store.update_resource(&device_id, res, crate::hal::ChangeOrigin::Hal).await;
                }
            }
            0x0021 => {
                if let Some(v) = decode_i64(&report.raw_value) {
                    let res = crate::model::Resource::new(
                        "batteryPercentageRemaining",
                        (v as i64).to_string(),
                        ResourceMode::readable_writable(),
                    );
                    let _ = ctx.store.update_resource(&device_id, res, crate::hal::ChangeOrigin::Hal).await;
                }
            }
            _ => {}
        }
    }

    async fn handle_alarm(&self, ctx: &ClusterContext<'_>, device: &Device, _endpoint: u8, alarm_code: u8) {
        if let Some(cb) = Self::alarm_callback(alarm_code) {
            log::debug!("power configuration alarm {cb} on {}", device.id());
            let res = crate::model::Resource::new(cb, true, ResourceMode::readable_writable());
            let _ = ctx.store.update_resource(&device.id(), res, crate::hal::ChangeOrigin::Hal).await;
        }
    }

    async fn handle_alarm_cleared(&self, ctx: &ClusterContext<'_>, device: &Device, _endpoint: u8, alarm_code: u8) {
        if let Some(cb) = Self::alarm_callback(alarm_code) {
            let res = crate::model::Resource::new(cb, false, ResourceMode::readable_writable());
            let _ = ctx.store.update_resource(&device.id(), res, crate::hal::ChangeOrigin::Hal).await;
        }
    }

    async fn handle_poll_checkin(&self, ctx: &ClusterContext<'_>, device: &Device) {
        if let Ok(v) = ctx
            .hal
            .read_attribute(device.eui, device.first_endpoint().map(|e| e.number).unwrap_or(1), self.cluster_id(), 0x0020)
            .await
        {
            let res = crate::model::Resource::new("batteryVoltage", v.to_string(), ResourceMode::readable_writable());
            let _ = ctx.store.update_resource(&device.id(), res, crate::hal::ChangeOrigin::Poll).await;
        }
    }
}

fn decode_i64(raw: &[u8]) -> Option<i64> {
    if raw.is_empty() || raw.len() > 8 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf[..raw.len()].copy_from_slice(raw);
    Some(i64::from_le_bytes(buf))
}

/// Temperature Measurement (0x0402).
pub struct TemperatureMeasurementCluster {
    last_value: AtomicI8,
}

impl TemperatureMeasurementCluster {
    pub fn new() -> Self {
        Self {
            last_value: AtomicI8::new(0),
        }
    }
}

impl Default for TemperatureMeasurementCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl super::Cluster for TemperatureMeasurementCluster {
    fn cluster_id(&self) -> u16 {
        cluster_ids::TEMPERATURE_MEASUREMENT
    }

    async fn configure(&self, ctx: &ConfigureContext<'_>) -> DriverResult<()> {
        if !metadata_flag(ctx, "temperatureReportingEnabled") {
            return Ok(());
        }
        ctx.hal.bind(ctx.eui, ctx.endpoint.number, self.cluster_id()).await?;
        ctx.hal
            .configure_reporting(ctx.eui, ctx.endpoint.number, self.cluster_id(), 0x0000, 1, 60 * 27, 50)
            .await?;
        Ok(())
    }

    async fn handle_attribute_report(&self, ctx: &ClusterContext<'_>, report: &AttributeReport) {
        if report.attribute_id != 0x0000 {
            return;
        }
        if let Some(v) = decode_i64(&report.raw_value) {
            self.last_value.store(v as i8, Ordering::Relaxed);
            let device_id = report.envelope.eui.to_device_id();
            let res = crate::model::Resource::new("temperature", v.to_string(), ResourceMode::readable_writable());
            let _ = ctx.store.update_resource(&device_id, res, crate::hal::ChangeOrigin::Hal).await;
        }
    }
}

/// Diagnostics (0x0B05). Tracks `lastMessageRSSI`/`lastMessageLQI`, the far-end
/// counterparts to the near-end values the dispatch path maintains directly.
pub struct DiagnosticsCluster {
    last_rssi: AtomicI8,
    last_lqi: AtomicU8,
}

impl DiagnosticsCluster {
    pub fn new() -> Self {
        Self {
            last_rssi: AtomicI8::new(i8::MIN),
            last_lqi: AtomicU8::new(0),
        }
    }
}

impl Default for DiagnosticsCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl super::Cluster for DiagnosticsCluster {
    fn cluster_id(&self) -> u16 {
        cluster_ids::DIAGNOSTICS
    }

    async fn handle_attribute_report(&self, ctx: &ClusterContext<'_>, report: &AttributeReport) {
        const LAST_MESSAGE_RSSI: u16 = 0x011C;
        const LAST_MESSAGE_LQI: u16 = 0x011D;
        let device_id = report.envelope.eui.to_device_id();
        match report.attribute_id {
            LAST_MESSAGE_RSSI => {
                if let Some(v) = decode_i64(&report.raw_value) {
                    let changed = self.last_rssi.swap(v as i8, Ordering::Relaxed) != v as i8;
                    if changed {
                        let res = crate::model::Resource::new("feRssi", v.to_string(), ResourceMode::READABLE);
                        let _ = ctx.store.update_resource(&device_id, res, crate::hal::ChangeOrigin::Hal).await;
                    }
                }
            }
            LAST_MESSAGE_LQI => {
                if let Some(v) = decode_i64(&report.raw_value) {
                    let changed = self.last_lqi.swap(v as u8, Ordering::Relaxed) != v as u8;
                    if changed {
                        let res = crate::model::Resource::new("feLqi", v.to_string(), ResourceMode::READABLE);
                        let _ = ctx.store.update_resource(&device_id, res, crate::hal::ChangeOrigin::Hal).await;
                    }
                }
            }
            _ => {}
        }
    }
}

/// Alarms (0x0009). Decodes alarm table commands and dispatches to the owning
/// cluster's `handleAlarm`/`handleAlarmCleared` — the actual dispatch lives in
/// [`crate::dispatch`] since it needs access to the registry to find the target
/// cluster; this handler exists to occupy the cluster id and satisfy "always
/// registered" (§4.1).
pub struct AlarmsCluster;

impl AlarmsCluster {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AlarmsCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl super::Cluster for AlarmsCluster {
    fn cluster_id(&self) -> u16 {
        cluster_ids::ALARMS
    }
}

/// OTA Upgrade (0x0019). Exposes `imageNotify`; devices that ignore it are not an error.
pub struct OtaUpgradeCluster;

impl OtaUpgradeCluster {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OtaUpgradeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl OtaUpgradeCluster {
    pub async fn image_notify(hal: &dyn crate::hal::Hal, eui: crate::model::Eui64, endpoint: u8) -> DriverResult<()> {
        hal.send_cluster_command(eui, endpoint, cluster_ids::OTA_UPGRADE, None, 0x00, &[]).await
    }
}

#[async_trait]
impl super::Cluster for OtaUpgradeCluster {
    fn cluster_id(&self) -> u16 {
        cluster_ids::OTA_UPGRADE
    }
}

/// Remote Cell Modem (mfg-specific). Reports power-on state; exposes on/off/emergency
/// reset via mfg-specific command codes 0x00/0x01/0x02.
pub struct RemoteCellModemCluster {
    pub mfg_id: u16,
}

impl RemoteCellModemCluster {
    pub fn new(mfg_id: u16) -> Self {
        Self { mfg_id }
    }

    pub async fn turn_on(&self, hal: &dyn crate::hal::Hal, eui: crate::model::Eui64, endpoint: u8) -> DriverResult<()> {
        hal.send_cluster_command(eui, endpoint, self.cluster_id(), Some(self.mfg_id), 0x00, &[])
            .await
    }

    pub async fn turn_off(&self, hal: &dyn crate::hal::Hal, eui: crate::model::Eui64, endpoint: u8) -> DriverResult<()> {
        hal.send_cluster_command(eui, endpoint, self.cluster_id(), Some(self.mfg_id), 0x01, &[])
            .await
    }

    pub async fn emergency_reset(
        &self,
        hal: &dyn crate::hal::Hal,
        eui: crate::model::Eui64,
        endpoint: u8,
    ) -> DriverResult<()> {
        hal.send_cluster_command(eui, endpoint, self.cluster_id(), Some(self.mfg_id), 0x02, &[])
            .await
    }
}

#[async_trait]
impl super::Cluster for RemoteCellModemCluster {
    fn cluster_id(&self) -> u16 {
        cluster_ids::REMOTE_CELL_MODEM
    }

    async fn handle_attribute_report(&self, ctx: &ClusterContext<'_>, report: &AttributeReport) {
        if report.attribute_id == 0x0000 {
            if let Some(v) = decode_i64(&report.raw_value) {
                let device_id = report.envelope.eui.to_device_id();
                let res = crate::model::Resource::new("modemPowerOn", v != 0, ResourceMode::readable_writable());
                let _ = ctx.store.update_resource(&device_id, res, crate::hal::ChangeOrigin::Hal).await;
            }
        }
    }
}
