use super::transport::TransportSlot;
use crate::device::DeviceId;
use crate::error::{TwinError, TwinResult};
use crate::logutil::escape_log;
use crate::metrics;
use crate::store::DeviceStore;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

/// Default pause between the per-robot writes of a broadcast. The bridge
/// forwards over a slow radio and drops input when its buffer overruns.
pub const DEFAULT_BROADCAST_GAP: Duration = Duration::from_millis(100);

/// Outbound command path. Cheap to clone; every clone writes through the
/// same transport slot as the reader.
#[derive(Clone)]
pub struct CommandChannel {
    /// `None` on the line-follower console, which only sends raw text.
    store: Option<Arc<DeviceStore>>,
    slot: TransportSlot,
    broadcast_gap: Duration,
}

/// Reject blank or multi-line text. Accepted text goes out unchanged.
fn validate(text: &str) -> TwinResult<&str> {
    if text.trim().is_empty() {
        return Err(TwinError::InvalidCommand("empty command".into()));
    }
    if text.contains(['\n', '\r']) {
        return Err(TwinError::InvalidCommand(
            "command must be a single line".into(),
        ));
    }
    Ok(text)
}

impl CommandChannel {
    pub fn new(store: Arc<DeviceStore>, slot: TransportSlot) -> Self {
        Self {
            store: Some(store),
            slot,
            broadcast_gap: DEFAULT_BROADCAST_GAP,
        }
    }

    /// Channel without addressed robots; only [`send_raw`](Self::send_raw)
    /// is useful on it.
    pub fn raw(slot: TransportSlot) -> Self {
        Self {
            store: None,
            slot,
            broadcast_gap: DEFAULT_BROADCAST_GAP,
        }
    }

    pub fn is_open(&self) -> bool {
        self.slot.is_open()
    }

    pub fn with_broadcast_gap(mut self, gap: Duration) -> Self {
        self.broadcast_gap = gap;
        self
    }

    fn resolve(&self, device: &str) -> TwinResult<(&DeviceStore, DeviceId)> {
        let device = device.trim();
        let store = self
            .store
            .as_deref()
            .ok_or_else(|| TwinError::UnknownDevice(device.to_string()))?;
        let id = store
            .devices()
            .get(device)
            .cloned()
            .ok_or_else(|| TwinError::UnknownDevice(device.to_string()))?;
        Ok((store, id))
    }

    /// Send `<ID>:<text>\n` to one robot.
    ///
    /// The audit entry is written under the slot lock once the transport is
    /// known to be open, so a closed link never leaves an entry and a command
    /// that fails mid-write still shows up in the robot's messages.
    pub fn send(&self, device: &str, text: &str) -> TwinResult<()> {
        let (store, id) = self.resolve(device)?;
        let text = validate(text)?;
        let line = format!("{}:{}\n", id, text);
        self.slot
            .write_after(line.as_bytes(), || store.log_command(id.as_str(), text))?;
        metrics::inc_commands_sent();
        info!("Sent command to {}: {}", id, escape_log(text));
        Ok(())
    }

    /// Send the same command to every robot in configured order, pausing
    /// between writes. Stops at the first failure.
    pub async fn broadcast(&self, text: &str) -> TwinResult<()> {
        let ids: Vec<DeviceId> = match &self.store {
            Some(store) => store.devices().iter().cloned().collect(),
            None => Vec::new(),
        };
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.broadcast_gap).await;
            }
            self.send(id.as_str(), text)?;
        }
        Ok(())
    }

    /// Write bare text with no addressing or terminator. Used by the
    /// line-follower console, which reads single-character commands.
    pub fn send_raw(&self, text: &str) -> TwinResult<()> {
        if text.is_empty() {
            return Err(TwinError::InvalidCommand("empty command".into()));
        }
        self.slot.write(text.as_bytes())?;
        metrics::inc_commands_sent();
        debug!("Sent raw: {}", escape_log(text));
        Ok(())
    }

    pub fn start(&self, device: &str) -> TwinResult<()> {
        self.send(device, "START")
    }

    pub fn stop(&self, device: &str) -> TwinResult<()> {
        self.send(device, "STOP")
    }

    pub async fn start_all(&self) -> TwinResult<()> {
        self.broadcast("START").await
    }

    pub async fn stop_all(&self) -> TwinResult<()> {
        self.broadcast("STOP").await
    }
}
