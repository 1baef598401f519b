//! # Snapshot and Command Boundary
//!
//! The surface a web layer (or the operator console) talks to. Everything
//! here returns plain serde types; errors carry an HTTP-equivalent status so
//! a route handler can forward them unchanged.
//!
//! | operation              | success                 | errors        |
//! |------------------------|-------------------------|---------------|
//! | `status`               | [`StatusSnapshot`]      | -             |
//! | `history(id)`          | [`HistoryResponse`]     | 404           |
//! | `command(req)`         | [`CommandResponse`]     | 400, 404, 503 |
//! | `calibration(signal)`  | [`CalibrationResponse`] | -             |
//! | `calibration_code`     | [`CalibrationCode`]     | -             |

use crate::calibration::{CalibrationCode, CalibrationSession, DebugSnapshot, DebugState};
use crate::device::DeviceId;
use crate::error::TwinError;
use crate::link::{CommandChannel, LinkStatus, TransportSlot};
use crate::metrics;
use crate::store::{DeviceSnapshot, DeviceStore, HistoryEntry};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Error body handed to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl From<TwinError> for ApiError {
    fn from(e: TwinError) -> Self {
        Self {
            status: e.http_status(),
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub link: LinkStatus,
    pub devices: Vec<DeviceSnapshot>,
    pub metrics: metrics::Snapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub device: DeviceId,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    pub device: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResponse {
    pub status: &'static str,
    pub sent: String,
}

impl CommandResponse {
    fn ok(sent: String) -> Self {
        Self { status: "ok", sent }
    }
}

/// Telemetry dashboard facade.
#[derive(Clone)]
pub struct TelemetryApi {
    store: Arc<DeviceStore>,
    commands: CommandChannel,
    slot: TransportSlot,
}

impl TelemetryApi {
    pub fn new(store: Arc<DeviceStore>, commands: CommandChannel, slot: TransportSlot) -> Self {
        Self {
            store,
            commands,
            slot,
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            generated_at: Utc::now(),
            link: self.slot.status(),
            devices: self.store.snapshot_all(),
            metrics: metrics::snapshot(),
        }
    }

    pub fn device(&self, id: &str) -> ApiResult<DeviceSnapshot> {
        Ok(self.store.snapshot(id)?)
    }

    pub fn history(&self, id: &str) -> ApiResult<HistoryResponse> {
        let history = self.store.history(id)?;
        let device = self
            .store
            .devices()
            .get(id)
            .cloned()
            .ok_or_else(|| TwinError::UnknownDevice(id.to_string()))?;
        Ok(HistoryResponse { device, history })
    }

    pub fn command(&self, req: &CommandRequest) -> ApiResult<CommandResponse> {
        self.commands.send(&req.device, &req.command)?;
        Ok(CommandResponse::ok(format!(
            "{}:{}",
            req.device.trim(),
            req.command
        )))
    }

    pub fn start(&self, id: &str) -> ApiResult<CommandResponse> {
        self.commands.start(id)?;
        Ok(CommandResponse::ok(format!("{}:START", id.trim())))
    }

    pub fn stop(&self, id: &str) -> ApiResult<CommandResponse> {
        self.commands.stop(id)?;
        Ok(CommandResponse::ok(format!("{}:STOP", id.trim())))
    }

    pub async fn broadcast(&self, text: &str) -> ApiResult<CommandResponse> {
        self.commands.broadcast(text).await?;
        Ok(CommandResponse::ok(format!("ALL:{}", text)))
    }

    pub async fn start_all(&self) -> ApiResult<CommandResponse> {
        self.commands.start_all().await?;
        Ok(CommandResponse::ok("ALL:START".to_string()))
    }

    pub async fn stop_all(&self) -> ApiResult<CommandResponse> {
        self.commands.stop_all().await?;
        Ok(CommandResponse::ok("ALL:STOP".to_string()))
    }
}

/// Operator control of the calibration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationSignal {
    Start,
    Stop,
    Reset,
}

impl FromStr for CalibrationSignal {
    type Err = TwinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "reset" => Ok(Self::Reset),
            other => Err(TwinError::InvalidCommand(format!(
                "unknown calibration signal '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationResponse {
    pub status: &'static str,
    pub message: String,
    /// Frozen bounds, present after `stop`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CalibrationSession>,
}

/// Line-follower debug dashboard facade.
#[derive(Clone)]
pub struct DebugApi {
    state: Arc<DebugState>,
    commands: CommandChannel,
}

impl DebugApi {
    pub fn new(state: Arc<DebugState>, commands: CommandChannel) -> Self {
        Self { state, commands }
    }

    pub fn snapshot(&self) -> DebugSnapshot {
        self.state.snapshot()
    }

    /// Send bare text to the follower.
    pub fn send(&self, text: &str) -> ApiResult<CommandResponse> {
        self.commands.send_raw(text)?;
        Ok(CommandResponse::ok(text.to_string()))
    }

    /// Apply a calibration signal. `start` also pokes the follower with the
    /// diagnostics command so sensor lines begin streaming right away; a
    /// closed link does not stop the session from starting.
    pub fn calibration(&self, signal: CalibrationSignal, poke: &str) -> CalibrationResponse {
        match signal {
            CalibrationSignal::Start => {
                if let Err(e) = self.commands.send_raw(poke) {
                    debug!("Calibration start without diagnostics poke: {}", e);
                }
                self.state.start_calibration();
                CalibrationResponse {
                    status: "ok",
                    message: "Calibration started".into(),
                    calibration: None,
                }
            }
            CalibrationSignal::Stop => CalibrationResponse {
                status: "ok",
                message: "Calibration stopped".into(),
                calibration: Some(self.state.stop_calibration()),
            },
            CalibrationSignal::Reset => {
                self.state.reset_calibration();
                CalibrationResponse {
                    status: "ok",
                    message: "Calibration reset".into(),
                    calibration: None,
                }
            }
        }
    }

    pub fn calibration_code(&self) -> CalibrationCode {
        self.state.calibration_code()
    }

    /// Resend `command` every `period` while a calibration is running, so
    /// the follower keeps printing sensor diagnostics.
    pub async fn keepalive(self, command: String, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if !self.state.is_calibrating() || !self.commands.is_open() {
                continue;
            }
            if let Err(e) = self.commands.send_raw(&command) {
                debug!("Keep-alive send failed: {}", e);
            }
        }
    }
}

/// Periodic JSON dump of a snapshot for an external web server to serve.
pub struct StatusFile {
    path: PathBuf,
    interval: Duration,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write via a sibling temp file and rename, so readers never see a
    /// half-written document.
    pub async fn write<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    pub async fn run<T, F>(self, mut snapshot: F)
    where
        T: Serialize,
        F: FnMut() -> T,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match self.write(&snapshot()).await {
                Ok(()) => debug!("Wrote status to {}", self.path.display()),
                Err(e) => warn!("Failed to write status file {}: {}", self.path.display(), e),
            }
        }
    }
}
