use super::ring::Ring;
use crate::device::DeviceId;
use crate::protocol::{Flags, TelemetryRecord, NO_DISTANCE};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_MESSAGE_CAPACITY: usize = 20;

/// One point of the speed / odometry / distance graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// Seconds since the Unix epoch, fractional.
    pub timestamp: f64,
    pub speed: i64,
    pub left_ticks: i64,
    pub right_ticks: i64,
    pub distance: i64,
}

/// Free text from a robot, or an audit entry for a command we sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageEntry {
    /// Local wall clock, `HH:MM:SS`.
    pub time: String,
    pub text: String,
}

impl MessageEntry {
    pub fn new(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            time: at.with_timezone(&Local).format("%H:%M:%S").to_string(),
            text: text.into(),
        }
    }
}

/// Latest known state of one robot plus its rolling buffers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub connected: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub uptime: String,
    pub state: String,
    pub line_position: String,
    pub speed: i64,
    pub left_ticks: i64,
    pub right_ticks: i64,
    pub distance: i64,
    pub flags: Flags,
    pub history: Ring<HistoryEntry>,
    pub messages: Ring<MessageEntry>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_MESSAGE_CAPACITY)
    }
}

impl DeviceState {
    pub fn new(history_capacity: usize, message_capacity: usize) -> Self {
        Self {
            connected: false,
            last_seen: None,
            uptime: "0s".to_string(),
            state: "UNKNOWN".to_string(),
            line_position: "UNKNOWN".to_string(),
            speed: 0,
            left_ticks: 0,
            right_ticks: 0,
            distance: NO_DISTANCE,
            flags: Flags::default(),
            history: Ring::new(history_capacity),
            messages: Ring::new(message_capacity),
        }
    }

    /// Overwrite the reported fields from a packet and record a history point.
    ///
    /// Flags are only replaced when the packet carried a decodable flags
    /// field; a truncated field keeps the previous flags.
    pub fn apply(&mut self, record: &TelemetryRecord, now: DateTime<Utc>) {
        self.connected = true;
        self.last_seen = Some(now);
        self.uptime.clone_from(&record.uptime);
        self.state.clone_from(&record.state);
        self.line_position.clone_from(&record.line_position);
        self.speed = record.speed;
        self.left_ticks = record.left_ticks;
        self.right_ticks = record.right_ticks;
        self.distance = record.distance;
        if let Some(flags) = record.flags {
            self.flags = flags;
        }
        self.history.push(HistoryEntry {
            timestamp: now.timestamp_millis() as f64 / 1000.0,
            speed: record.speed,
            left_ticks: record.left_ticks,
            right_ticks: record.right_ticks,
            distance: record.distance,
        });
    }

    pub fn push_message(&mut self, text: impl Into<String>, now: DateTime<Utc>) {
        self.messages.push(MessageEntry::new(text, now));
    }

    pub fn snapshot(&self, id: &DeviceId, max_messages: usize) -> DeviceSnapshot {
        DeviceSnapshot {
            id: id.clone(),
            connected: self.connected,
            last_seen: self.last_seen,
            uptime: self.uptime.clone(),
            state: self.state.clone(),
            line_position: self.line_position.clone(),
            speed: self.speed,
            left_ticks: self.left_ticks,
            right_ticks: self.right_ticks,
            distance: self.distance,
            flags: self.flags,
            messages: self.messages.tail(max_messages),
        }
    }
}

/// Point-in-time copy served to dashboard clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub connected: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub uptime: String,
    pub state: String,
    pub line_position: String,
    pub speed: i64,
    pub left_ticks: i64,
    pub right_ticks: i64,
    pub distance: i64,
    pub flags: Flags,
    pub messages: Vec<MessageEntry>,
}
