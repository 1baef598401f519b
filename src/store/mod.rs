//! # Device State Store
//!
//! Owns one [`DeviceState`] per configured robot. The map itself is built
//! once at startup and never changes shape; each record sits behind its own
//! mutex so a packet for R2 never waits on a snapshot of R1, and a snapshot
//! always sees a record either before or after a whole packet was applied.
//!
//! Writers: the link task (`apply`, `attribute`, `sweep_liveness`), the
//! simulator (`apply`) and the command path (`log_command`). Readers: the
//! snapshot API.

pub mod device;
pub mod liveness;
pub mod ring;

pub use device::{DeviceSnapshot, DeviceState, HistoryEntry, MessageEntry};
pub use liveness::LivenessMonitor;
pub use ring::Ring;

use crate::device::{DeviceId, DeviceSet};
use crate::error::{TwinError, TwinResult};
use crate::protocol::TelemetryRecord;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Marker prepended to audit entries for commands we sent.
pub const COMMAND_MARKER: &str = "[CMD]";

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub history_capacity: usize,
    pub message_capacity: usize,
    /// Messages included in a snapshot (most recent).
    pub snapshot_messages: usize,
    pub liveness_timeout: Duration,
    /// Receives free text that names no known robot.
    pub default_device: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            history_capacity: device::DEFAULT_HISTORY_CAPACITY,
            message_capacity: device::DEFAULT_MESSAGE_CAPACITY,
            snapshot_messages: 10,
            liveness_timeout: liveness::DEFAULT_LIVENESS_TIMEOUT,
            default_device: "R2".to_string(),
        }
    }
}

pub struct DeviceStore {
    devices: DeviceSet,
    records: HashMap<DeviceId, Mutex<DeviceState>>,
    default_device: Option<DeviceId>,
    liveness: LivenessMonitor,
    snapshot_messages: usize,
}

// State is plain data; a panic mid-update cannot leave it unusable.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DeviceStore {
    pub fn new(devices: DeviceSet, settings: StoreSettings) -> Self {
        let records = devices
            .iter()
            .map(|id| {
                let state = DeviceState::new(settings.history_capacity, settings.message_capacity);
                (id.clone(), Mutex::new(state))
            })
            .collect();
        let default_device = match devices.get(&settings.default_device) {
            Some(id) => Some(id.clone()),
            None => {
                let fallback = devices.iter().next().cloned();
                warn!(
                    "Default device '{}' is not configured; unattributed text goes to {:?}",
                    settings.default_device, fallback
                );
                fallback
            }
        };
        Self {
            devices,
            records,
            default_device,
            liveness: LivenessMonitor::new(settings.liveness_timeout),
            snapshot_messages: settings.snapshot_messages,
        }
    }

    pub fn devices(&self) -> &DeviceSet {
        &self.devices
    }

    pub fn default_device(&self) -> Option<&DeviceId> {
        self.default_device.as_ref()
    }

    fn record(&self, id: &str) -> TwinResult<MutexGuard<'_, DeviceState>> {
        self.records
            .get(id)
            .map(lock)
            .ok_or_else(|| TwinError::UnknownDevice(id.to_string()))
    }

    pub fn apply(&self, record: &TelemetryRecord) -> TwinResult<()> {
        self.apply_at(record, Utc::now())
    }

    pub fn apply_at(&self, record: &TelemetryRecord, now: DateTime<Utc>) -> TwinResult<()> {
        let mut state = self.record(record.device.as_str())?;
        if !state.connected {
            info!("{} connected", record.device);
        }
        state.apply(record, now);
        Ok(())
    }

    /// File a free-text line under the robot it names, or the default robot.
    pub fn attribute(&self, line: &str) -> Option<DeviceId> {
        self.attribute_at(line, Utc::now())
    }

    pub fn attribute_at(&self, line: &str, now: DateTime<Utc>) -> Option<DeviceId> {
        let target = self
            .devices
            .prefix_of(line)
            .or(self.default_device.as_ref())?
            .clone();
        if let Ok(mut state) = self.record(target.as_str()) {
            state.push_message(line, now);
        }
        Some(target)
    }

    /// Audit a command before it goes out on the wire.
    pub fn log_command(&self, id: &str, command: &str) -> TwinResult<()> {
        let mut state = self.record(id)?;
        state.push_message(format!("{} {}", COMMAND_MARKER, command), Utc::now());
        Ok(())
    }

    /// Mark robots silent past the liveness window as disconnected.
    /// Returns the robots that changed.
    pub fn sweep_liveness(&self, now: DateTime<Utc>) -> Vec<DeviceId> {
        let mut dropped = Vec::new();
        for id in self.devices.iter() {
            let Some(slot) = self.records.get(id) else {
                continue;
            };
            let mut state = lock(slot);
            if state.connected && self.liveness.is_stale(state.last_seen, now) {
                state.connected = false;
                info!(
                    "{} disconnected (no telemetry for {}s)",
                    id,
                    self.liveness.timeout().as_secs()
                );
                dropped.push(id.clone());
            }
        }
        if !dropped.is_empty() {
            debug!("Liveness sweep dropped {:?}", dropped);
        }
        dropped
    }

    pub fn snapshot(&self, id: &str) -> TwinResult<DeviceSnapshot> {
        let key = self
            .devices
            .get(id)
            .ok_or_else(|| TwinError::UnknownDevice(id.to_string()))?;
        Ok(self.record(id)?.snapshot(key, self.snapshot_messages))
    }

    /// Snapshots of every robot in configured order.
    pub fn snapshot_all(&self) -> Vec<DeviceSnapshot> {
        self.devices
            .iter()
            .filter_map(|id| self.snapshot(id.as_str()).ok())
            .collect()
    }

    pub fn history(&self, id: &str) -> TwinResult<Vec<HistoryEntry>> {
        Ok(self.record(id)?.history.to_vec())
    }

    /// Full copy of one record, buffers included.
    pub fn state(&self, id: &str) -> TwinResult<DeviceState> {
        Ok(self.record(id)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{parse_telemetry, Flags};
    use chrono::Duration as Delta;

    const REFERENCE: &str = "R2|45s|FOLLOW|CENTER|SPD:200|L:1234,R:1230|D:25cm|CPgde";

    fn store() -> DeviceStore {
        DeviceStore::new(DeviceSet::new(["R1", "R2", "R3"]), StoreSettings::default())
    }

    fn packet(store: &DeviceStore, line: &str) -> TelemetryRecord {
        parse_telemetry(line, store.devices()).expect("valid packet")
    }

    #[test]
    fn apply_marks_connected_and_seen() {
        let store = store();
        let before = Utc::now();
        store.apply(&packet(&store, REFERENCE)).unwrap();
        let r2 = store.state("R2").unwrap();
        assert!(r2.connected);
        assert!(r2.last_seen.unwrap() >= before);
        assert_eq!(r2.state, "FOLLOW");
        assert_eq!(r2.distance, 25);
        assert_eq!(r2.history.len(), 1);
        assert!(!store.state("R1").unwrap().connected);
    }

    #[test]
    fn reapplying_same_packet_only_adds_history() {
        let store = store();
        let rec = packet(&store, REFERENCE);
        let t0 = Utc::now();
        store.apply_at(&rec, t0).unwrap();
        let first = store.state("R2").unwrap();
        store.apply_at(&rec, t0 + Delta::seconds(1)).unwrap();
        let mut second = store.state("R2").unwrap();
        assert_eq!(second.history.len(), first.history.len() + 1);
        assert_eq!(second.last_seen, Some(t0 + Delta::seconds(1)));
        second.last_seen = first.last_seen;
        second.history = first.history.clone();
        assert_eq!(second, first);
    }

    #[test]
    fn short_flags_field_preserves_flags() {
        let store = store();
        store.apply(&packet(&store, REFERENCE)).unwrap();
        store
            .apply(&packet(&store, "R2|46s|FOLLOW|CENTER|SPD:190|L:1240,R:1236|D:--|CP"))
            .unwrap();
        let r2 = store.state("R2").unwrap();
        assert_eq!(r2.speed, 190);
        assert_eq!(
            r2.flags,
            Flags {
                calibrated: true,
                cone_picked: true,
                ..Flags::default()
            }
        );
    }

    #[test]
    fn history_is_bounded() {
        let store = store();
        let rec = packet(&store, REFERENCE);
        let t0 = Utc::now();
        for i in 0..101 {
            store.apply_at(&rec, t0 + Delta::seconds(i)).unwrap();
        }
        let history = store.history("R2").unwrap();
        assert_eq!(history.len(), 100);
        let oldest = (t0 + Delta::seconds(1)).timestamp_millis() as f64 / 1000.0;
        let newest = (t0 + Delta::seconds(100)).timestamp_millis() as f64 / 1000.0;
        assert_eq!(history.first().unwrap().timestamp, oldest);
        assert_eq!(history.last().unwrap().timestamp, newest);
    }

    #[test]
    fn free_text_attribution() {
        let store = store();
        assert_eq!(store.attribute("R3 dropped cone").map(|d| d.to_string()), Some("R3".into()));
        assert_eq!(store.attribute("boot complete").map(|d| d.to_string()), Some("R2".into()));
        assert_eq!(store.state("R3").unwrap().messages.newest().unwrap().text, "R3 dropped cone");
        assert_eq!(store.state("R2").unwrap().messages.newest().unwrap().text, "boot complete");
    }

    #[test]
    fn messages_are_bounded_and_snapshots_truncated() {
        let store = store();
        for i in 0..25 {
            store.attribute(&format!("R1 msg {i}"));
        }
        assert_eq!(store.state("R1").unwrap().messages.len(), 20);
        let snap = store.snapshot("R1").unwrap();
        assert_eq!(snap.messages.len(), 10);
        assert_eq!(snap.messages.last().unwrap().text, "R1 msg 24");
        assert_eq!(snap.messages.first().unwrap().text, "R1 msg 15");
    }

    #[test]
    fn command_audit_entry() {
        let store = store();
        store.log_command("R1", "START").unwrap();
        assert_eq!(store.state("R1").unwrap().messages.newest().unwrap().text, "[CMD] START");
        assert!(matches!(store.log_command("R7", "START"), Err(TwinError::UnknownDevice(_))));
    }

    #[test]
    fn liveness_sweep() {
        let store = store();
        let rec = packet(&store, REFERENCE);
        let t0 = Utc::now();
        store.apply_at(&rec, t0).unwrap();

        assert!(store.sweep_liveness(t0 + Delta::milliseconds(9_900)).is_empty());
        assert!(store.state("R2").unwrap().connected);

        let dropped = store.sweep_liveness(t0 + Delta::seconds(11));
        assert_eq!(dropped.len(), 1);
        assert!(!store.state("R2").unwrap().connected);
        // never-seen robots stay as they were
        assert!(store.state("R1").unwrap().last_seen.is_none());

        // only a packet reconnects
        assert!(store.sweep_liveness(t0 + Delta::seconds(12)).is_empty());
        store.apply_at(&rec, t0 + Delta::seconds(12)).unwrap();
        assert!(store.state("R2").unwrap().connected);
    }

    #[test]
    fn unknown_device_at_boundary() {
        let store = store();
        assert!(matches!(store.snapshot("R9"), Err(TwinError::UnknownDevice(_))));
        assert!(matches!(store.history("R9"), Err(TwinError::UnknownDevice(_))));
        assert_eq!(store.snapshot_all().len(), 3);
    }

    #[test]
    fn unconfigured_default_falls_back_to_first() {
        let settings = StoreSettings {
            default_device: "R9".into(),
            ..StoreSettings::default()
        };
        let store = DeviceStore::new(DeviceSet::new(["R1", "R2"]), settings);
        assert_eq!(store.default_device().map(DeviceId::as_str), Some("R1"));
    }
}
