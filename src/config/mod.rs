//! # Configuration
//!
//! TOML configuration for both dashboards. Every section has defaults, so a
//! file only needs the keys it changes; `relaytwin init` writes the full
//! default file as a starting point.
//!
//! ```toml
//! [serial]
//! port = "auto"          # or "/dev/ttyUSB0", "COM3"
//! baud_rate = 9600
//!
//! [devices]
//! ids = ["R1", "R2", "R3"]
//! default_device = "R2"
//!
//! [simulator]
//! enabled = true
//! devices = ["R1", "R3"]
//! ```
//!
//! Precedence: CLI args > config file > defaults.

use crate::device::DeviceSet;
use crate::link::LinkSettings;
use crate::store::StoreSettings;
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, or `"auto"` to pick the first USB/ACM adapter.
    pub port: String,
    pub baud_rate: u32,
    pub poll_interval_ms: u64,
    pub reconnect_backoff_ms: u64,
    /// Pause after open so boards that reset on DTR can boot.
    pub settle_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "auto".to_string(),
            baud_rate: 9600,
            poll_interval_ms: 10,
            reconnect_backoff_ms: 2000,
            settle_ms: 150,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub ids: Vec<String>,
    /// Receives free text that names no known robot.
    pub default_device: String,
    pub liveness_timeout_secs: u64,
    pub history_capacity: usize,
    pub message_capacity: usize,
    /// Most recent messages included in a snapshot.
    pub snapshot_messages: usize,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            ids: vec!["R1".into(), "R2".into(), "R3".into()],
            default_device: "R2".to_string(),
            liveness_timeout_secs: 10,
            history_capacity: 100,
            message_capacity: 20,
            snapshot_messages: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub broadcast_gap_ms: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            broadcast_gap_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub enabled: bool,
    pub devices: Vec<String>,
    pub interval_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            devices: vec!["R1".into(), "R3".into()],
            interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Sent to the follower to request sensor diagnostics.
    pub keepalive_command: String,
    pub keepalive_ms: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            keepalive_command: "l".to_string(),
            keepalive_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// JSON snapshot path; unset disables the writer.
    pub file: Option<String>,
    pub interval_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            file: None,
            interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.serial.port.trim().is_empty() {
            bail!("serial.port must not be empty (use \"auto\" to detect)");
        }
        if self.serial.baud_rate == 0 {
            bail!("serial.baud_rate must be positive");
        }
        if self.serial.poll_interval_ms == 0 {
            bail!("serial.poll_interval_ms must be positive");
        }
        let set = self.device_set();
        if set.is_empty() {
            bail!("devices.ids must name at least one device");
        }
        if set.len() != self.devices.ids.len() {
            bail!("devices.ids contains blank or duplicate entries");
        }
        for id in set.iter() {
            if id.as_str().contains(['|', ':']) || id.as_str().contains(char::is_whitespace) {
                bail!("device id '{}' may not contain '|', ':' or whitespace", id);
            }
        }
        if !set.contains(&self.devices.default_device) {
            bail!(
                "devices.default_device '{}' is not listed in devices.ids",
                self.devices.default_device
            );
        }
        if self.devices.history_capacity == 0 || self.devices.message_capacity == 0 {
            bail!("devices.history_capacity and devices.message_capacity must be positive");
        }
        for name in &self.simulator.devices {
            if !set.contains(name) {
                bail!("simulator device '{}' is not listed in devices.ids", name);
            }
        }
        if self.debug.keepalive_command.is_empty() {
            bail!("debug.keepalive_command must not be empty");
        }
        Ok(())
    }

    pub fn device_set(&self) -> DeviceSet {
        DeviceSet::new(&self.devices.ids)
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            history_capacity: self.devices.history_capacity,
            message_capacity: self.devices.message_capacity,
            snapshot_messages: self.devices.snapshot_messages,
            liveness_timeout: Duration::from_secs(self.devices.liveness_timeout_secs),
            default_device: self.devices.default_device.clone(),
        }
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            poll_interval: Duration::from_millis(self.serial.poll_interval_ms),
            reconnect_backoff: Duration::from_millis(self.serial.reconnect_backoff_ms),
            settle: Duration::from_millis(self.serial.settle_ms),
        }
    }

    pub fn broadcast_gap(&self) -> Duration {
        Duration::from_millis(self.commands.broadcast_gap_ms)
    }
}
