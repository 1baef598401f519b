//! # Relaytwin - Digital Twin Dashboards for Line-Following Robots
//!
//! Relaytwin reads line-delimited ASCII telemetry from a serial-connected
//! bridge microcontroller, keeps a short rolling history per robot, and
//! exposes that state as snapshots plus a command path back to the robots.
//! A second mode parses line-follower PID/sensor debug output and records
//! sensor calibration bounds.
//!
//! ## Features
//!
//! - **Tolerant line decoding**: arbitrary read chunking, stray `\r`, invalid UTF-8 and runaway lines never stop the read loop.
//! - **Robot packets**: `R2|45s|FOLLOW|CENTER|SPD:200|L:1234,R:1230|D:25cm|CPgde` parsed into typed records.
//! - **Bounded state**: per-robot history (100) and message (20) rings, liveness after 10 s of silence.
//! - **Commands**: `<ID>:<text>\n` with an audit entry in the robot's messages, broadcast with backpressure.
//! - **Calibration**: per-channel min/max recording and a firmware snippet generator.
//! - **Simulation**: synthetic robots for bench testing without radios.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relaytwin::config::Config;
//! use relaytwin::link::{CommandChannel, SerialConnector, SerialLink, TelemetryIngest, TransportSlot};
//! use relaytwin::store::DeviceStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let store = Arc::new(DeviceStore::new(config.device_set(), config.store_settings()));
//!     let slot = TransportSlot::new();
//!     let link = SerialLink::new(
//!         Box::new(SerialConnector::new(&config.serial.port, config.serial.baud_rate)),
//!         slot.clone(),
//!         Arc::new(TelemetryIngest::new(store.clone())),
//!         config.link_settings(),
//!     );
//!     tokio::spawn(link.run());
//!
//!     let commands = CommandChannel::new(store.clone(), slot);
//!     commands.start("R2")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`protocol`] - line decoder, robot packet and debug line grammars
//! - [`store`] - per-robot state, rings and liveness
//! - [`calibration`] - sensor calibration session and debug frame
//! - [`link`] - transports, read/reconnect task, command channel
//! - [`api`] - snapshot and command boundary for a web layer
//! - [`simulator`] - synthetic robots
//! - [`console`] - operator console on stdin
//! - [`config`] - TOML configuration
//!
//! ## Architecture
//!
//! ```text
//! serial bytes ─► LineDecoder ─► parser ─► DeviceStore / DebugState ─► api snapshots
//!                                                  ▲
//!      CommandChannel ◄──────── api / console ─────┘ ([CMD] audit)
//! ```

pub mod api;
pub mod calibration;
pub mod config;
pub mod console;
pub mod device;
pub mod error;
pub mod link;
pub mod logutil;
pub mod metrics;
pub mod protocol;
pub mod simulator;
pub mod store;

pub use error::{TwinError, TwinResult};
