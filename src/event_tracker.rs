//! The event tracker (§4.7): a bounded, concurrency-safe recorder of per-device
//! rejoin/check-in/attribute-report events and counters, plus the periodic per-channel
//! RF energy scanner. All state lives behind a single tracker mutex (§5).

use crate::hal::{ChannelEnergySample, Hal};
use crate::model::{now_epoch_secs, Eui64};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

const ATTRIBUTE_REPORT_CAPACITY: usize = 8;
const REJOIN_CAPACITY: usize = 5;
const CHECKIN_CAPACITY: usize = 5;

/// One recorded attribute report. `attribute_id` is populated from the source
/// endpoint, not the true ZCL attribute id — an observed quirk of the system this
/// tracker is modeled on (§9a); preserved deliberately rather than "fixed", since
/// downstream consumers may already depend on the observed behavior.
#[derive(Clone, Debug)]
pub struct AttributeReportEvent {
    pub timestamp: u64,
    pub cluster_id: u16,
    /// Populated from the source endpoint number (see the doc comment above).
    pub attribute_id: u16,
    /// Bracketed comma-separated decimal encoding of the raw payload, e.g. `[1,2,3]`.
    pub payload: String,
}

#[derive(Clone, Debug)]
pub struct RejoinEvent {
    pub timestamp: u64,
    pub secure: bool,
}

#[derive(Default)]
struct DeviceHolder {
    attribute_reports: VecDeque<AttributeReportEvent>,
    rejoins: VecDeque<RejoinEvent>,
    checkins: VecDeque<u64>,
    rejoins_total: u32,
    rejoins_secure: u32,
    rejoins_insecure: u32,
    aps_ack_failures: u32,
    duplicate_seq_num: u32,
    last_sequence_number: Option<u8>,
}

fn push_bounded<T>(deque: &mut VecDeque<T>, item: T, capacity: usize) {
    if deque.len() >= capacity {
        deque.pop_front();
    }
    deque.push_back(item);
}

pub fn encode_payload(raw: &[u8]) -> String {
    let parts: Vec<String> = raw.iter().map(|b| b.to_string()).collect();
    format!("[{}]", parts.join(","))
}

#[derive(Default)]
struct TrackerState {
    devices: HashMap<Eui64, DeviceHolder>,
    channels: BTreeMap<u8, ChannelEnergySample>,
}

/// Process-wide recorder. Two gate properties control whether report-events and
/// channel-energy scanning actually happen; both default off (§6 property table).
pub struct EventTracker {
    state: Mutex<TrackerState>,
    report_collection_enabled: AtomicBool,
    channel_energy_enabled: AtomicBool,
    cancel: Notify,
}

impl Default for EventTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl EventTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            report_collection_enabled: AtomicBool::new(false),
            channel_energy_enabled: AtomicBool::new(false),
            cancel: Notify::new(),
        }
    }

    pub fn set_report_collection_enabled(&self, enabled: bool) {
        self.report_collection_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn report_collection_enabled(&self) -> bool {
        self.report_collection_enabled.load(Ordering::Relaxed)
    }

    pub fn set_channel_energy_collection_enabled(&self, enabled: bool) {
        self.channel_energy_enabled.store(enabled, Ordering::Relaxed);
        // A property change reschedules immediately and cancels any in-flight sleep
        // (§4.7 "channel energy scanner").
        self.cancel.notify_waiters();
    }

    pub fn channel_energy_collection_enabled(&self) -> bool {
        self.channel_energy_enabled.load(Ordering::Relaxed)
    }

    /// Records an inbound attribute report, unless `is_sensor_class` (§4.7's
    /// "ignores sensor-class devices"). No-ops entirely when report collection is
    /// disabled.
    pub fn insert_attribute_report(
        &self,
        eui: Eui64,
        is_sensor_class: bool,
        cluster_id: u16,
        source_endpoint: u8,
        raw_payload: &[u8],
    ) {
        if is_sensor_class || !self.report_collection_enabled() {
            return;
        }
        let event = AttributeReportEvent {
            timestamp: now_epoch_secs(),
            cluster_id,
            attribute_id: source_endpoint as u16,
            payload: encode_payload(raw_payload),
        };
        let mut state = self.state.lock().expect("tracker lock");
        let holder = state.devices.entry(eui).or_default();
        push_bounded(&mut holder.attribute_reports, event, ATTRIBUTE_REPORT_CAPACITY);
    }

    pub fn note_rejoin(&self, eui: Eui64, secure: bool) {
        let mut state = self.state.lock().expect("tracker lock");
        let holder = state.devices.entry(eui).or_default();
        holder.rejoins_total += 1;
        if secure {
            holder.rejoins_secure += 1;
        } else {
            holder.rejoins_insecure += 1;
        }
        push_bounded(
            &mut holder.rejoins,
            RejoinEvent {
                timestamp: now_epoch_secs(),
                secure,
            },
            REJOIN_CAPACITY,
        );
    }

    pub fn note_checkin(&self, eui: Eui64) {
        let mut state = self.state.lock().expect("tracker lock");
        let holder = state.devices.entry(eui).or_default();
        push_bounded(&mut holder.checkins, now_epoch_secs(), CHECKIN_CAPACITY);
    }

    pub fn note_aps_ack_failure(&self, eui: Eui64) {
        let mut state = self.state.lock().expect("tracker lock");
        state.devices.entry(eui).or_default().aps_ack_failures += 1;
    }

    /// Duplicate sequence-number detection (§4.7): increments the counter when the
    /// incoming sequence number repeats the last-observed one, otherwise overwrites it.
    pub fn note_sequence_number(&self, eui: Eui64, seq: u8) {
        let mut state = self.state.lock().expect("tracker lock");
        let holder = state.devices.entry(eui).or_default();
        if holder.last_sequence_number == Some(seq) {
            holder.duplicate_seq_num += 1;
        } else {
            holder.last_sequence_number = Some(seq);
        }
    }

    pub fn duplicate_seq_num_count(&self, eui: Eui64) -> u32 {
        self.state
            .lock()
            .expect("tracker lock")
            .devices
            .get(&eui)
            .map(|h| h.duplicate_seq_num)
            .unwrap_or(0)
    }

    /// Deep clone (§4.7 "collection functions return deep clones").
    pub fn collect_attribute_reports(&self, eui: Eui64) -> Vec<AttributeReportEvent> {
        self.state
            .lock()
            .expect("tracker lock")
            .devices
            .get(&eui)
            .map(|h| h.attribute_reports.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn collect_rejoins(&self, eui: Eui64) -> Vec<RejoinEvent> {
        self.state
            .lock()
            .expect("tracker lock")
            .devices
            .get(&eui)
            .map(|h| h.rejoins.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn collect_checkins(&self, eui: Eui64) -> Vec<u64> {
        self.state
            .lock()
            .expect("tracker lock")
            .devices
            .get(&eui)
            .map(|h| h.checkins.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn aps_ack_failures(&self, eui: Eui64) -> u32 {
        self.state
            .lock()
            .expect("tracker lock")
            .devices
            .get(&eui)
            .map(|h| h.aps_ack_failures)
            .unwrap_or(0)
    }

    pub fn collect_channel_energy(&self) -> Vec<ChannelEnergySample> {
        self.state.lock().expect("tracker lock").channels.values().copied().collect()
    }

    fn record_channel_sample(&self, sample: ChannelEnergySample) {
        self.state.lock().expect("tracker lock").channels.insert(sample.channel, sample);
    }

    /// Sleeps for `dur`, but wakes immediately if cancelled (property change or
    /// shutdown) — the cooperative-sleep pattern preserved from §9's design notes.
    async fn cancellable_sleep(&self, dur: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(dur) => true,
            _ = self.cancel.notified() => false,
        }
    }

    /// Spawns the channel-energy scanner task (§4.7). Runs for the lifetime of the
    /// returned handle; callers should store it and `.abort()` on shutdown.
    pub fn spawn_channel_scanner(
        self: &Arc<Self>,
        hal: Arc<dyn Hal>,
        initial_delay: Duration,
        period: Duration,
        scans_per_channel: u32,
        scan_duration: Duration,
        inter_channel_delay: Duration,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            if !tracker.cancellable_sleep(initial_delay).await {
                // cancelled before the first run ever fires; fall through to the loop,
                // which re-checks the enabled flag each iteration.
            }
            loop {
                if tracker.channel_energy_collection_enabled() {
                    tracker.run_one_scan_pass(&*hal, scans_per_channel, scan_duration, inter_channel_delay).await;
                }
                if !tracker.cancellable_sleep(period).await {
                    continue;
                }
            }
        })
    }

    async fn run_one_scan_pass(
        &self,
        hal: &dyn Hal,
        scans_per_channel: u32,
        scan_duration: Duration,
        inter_channel_delay: Duration,
    ) {
        for channel in 11..=25u8 {
            if !self.channel_energy_collection_enabled() {
                break;
            }
            match hal.energy_scan(channel, scans_per_channel, scan_duration).await {
                Ok(sample) => self.record_channel_sample(sample),
                Err(e) => log::warn!("energy scan on channel {channel} failed: {e}"),
            }
            if !self.cancellable_sleep(inter_channel_delay).await {
                break;
            }
        }
    }
}
