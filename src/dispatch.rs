//! The dispatch path (§4.3): inbound attribute reports and cluster commands are routed
//! to their cluster handler, near-end RSSI/LQI resources are refreshed on every
//! receipt, and everything is unconditionally forwarded to the upper driver.

use crate::cluster::{cluster_ids, ClusterContext, ClusterRegistry};
use crate::hal::{AttributeReport, ChangeOrigin, ClusterCommand, DriverHooks, Hal, Store};
use crate::model::{Resource, ResourceMode};

/// IAS Zone status-change-notification command id, used by the check-in classifier in
/// the event tracker (§4.7) — not dispatch itself, but defined alongside the other
/// well-known command ids dispatch cares about.
pub const IAS_ZONE_STATUS_CHANGE_NOTIFICATION: u8 = 0x00;
/// Comcast's manufacturer id, used to recognize the mfg-specific IAS Zone check-in
/// variant (§4.7).
pub const MFG_ID_COMCAST: u16 = 0x111D;
pub const POLL_CONTROL_CHECKIN_COMMAND: u8 = 0x00;
pub const GENERIC_DEVICE_CHECKIN_COMMAND: u8 = 0x11;

async fn update_near_end(store: &dyn Store, report_envelope: &crate::hal::FrameEnvelope) {
    let device_id = report_envelope.eui.to_device_id();
    let rssi = Resource::new("nearEndRssi", report_envelope.rssi.to_string(), ResourceMode::READABLE);
    let lqi = Resource::new("nearEndLqi", report_envelope.lqi.to_string(), ResourceMode::READABLE);
    let _ = store.update_resource(&device_id, rssi, ChangeOrigin::Hal).await;
    let _ = store.update_resource(&device_id, lqi, ChangeOrigin::Hal).await;
}

/// Dispatches one inbound attribute report (§4.3 steps 1-3).
pub async fn dispatch_attribute_report(
    registry: &ClusterRegistry,
    hal: &dyn Hal,
    store: &dyn Store,
    hooks: &dyn DriverHooks,
    report: &AttributeReport,
) {
    update_near_end(store, &report.envelope).await;

    let ctx = ClusterContext { hal, store };
    if let Some(cluster) = registry.get(report.envelope.cluster_id) {
        cluster.handle_attribute_report(&ctx, report).await;
    }

    hooks.handle_attribute_report(report).await;
}

/// Dispatches one inbound cluster command (§4.3 steps 1-3), including the Poll Control
/// check-in hand-off to the coordinator (§4.4) and Alarms-cluster alarm routing
/// (§4.1's Alarms contract).
pub async fn dispatch_command(
    registry: &ClusterRegistry,
    hal: &dyn Hal,
    store: &dyn Store,
    hooks: &dyn DriverHooks,
    tracker: &crate::event_tracker::EventTracker,
    command: &ClusterCommand,
) -> DispatchOutcome {
    update_near_end(store, &command.envelope).await;

    let ctx = ClusterContext { hal, store };
    let handled = if let Some(cluster) = registry.get(command.envelope.cluster_id) {
        cluster.handle_command(&ctx, command).await;
        true
    } else {
        false
    };

    tracker.note_sequence_number(command.envelope.eui, command.envelope.sequence_number);

    let is_checkin = is_checkin_command(command);
    if is_checkin {
        tracker.note_checkin(command.envelope.eui);
    }

    hooks.handle_command(command).await;

    DispatchOutcome {
        handled,
        is_poll_checkin: command.envelope.cluster_id == cluster_ids::POLL_CONTROL
            && command.command_id == POLL_CONTROL_CHECKIN_COMMAND,
        is_enhanced_checkin: command.envelope.cluster_id == cluster_ids::POLL_CONTROL
            && command.command_id == POLL_CONTROL_CHECKIN_COMMAND
            && !command.payload.is_empty(),
    }
}

fn is_checkin_command(command: &ClusterCommand) -> bool {
    (command.envelope.cluster_id == cluster_ids::POLL_CONTROL
        && command.command_id == POLL_CONTROL_CHECKIN_COMMAND)
        || (command.envelope.cluster_id == cluster_ids::IAS_ZONE
            && command.command_id == IAS_ZONE_STATUS_CHANGE_NOTIFICATION
            && command.envelope.mfg_id == Some(MFG_ID_COMCAST))
        || command.command_id == GENERIC_DEVICE_CHECKIN_COMMAND
}

/// What the caller (the driver's top-level frame handler) should do next: whether a
/// cluster handler ran, and whether the poll-control coordinator needs to take over.
pub struct DispatchOutcome {
    pub handled: bool,
    pub is_poll_checkin: bool,
    pub is_enhanced_checkin: bool,
}
