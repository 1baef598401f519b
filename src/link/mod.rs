//! # Serial Link
//!
//! Owns the connection to the bridge microcontroller:
//!
//! - [`transport`] - the byte transport abstraction, serial implementation
//!   and the shared [`TransportSlot`]
//! - [`reader`] - the long-lived read/reconnect task feeding a [`LineSink`]
//! - [`command`] - outbound command lines, audit-logged into the store
//! - [`mock`] - in-memory transport for tests
//!
//! ```rust,no_run
//! use relaytwin::device::DeviceSet;
//! use relaytwin::link::{LinkSettings, SerialLink, TelemetryIngest, TransportSlot, MockConnector, MockTransport};
//! use relaytwin::store::{DeviceStore, StoreSettings};
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let store = Arc::new(DeviceStore::new(DeviceSet::new(["R1", "R2"]), StoreSettings::default()));
//! let slot = TransportSlot::new();
//! let connector = MockConnector::new(MockTransport::new("mock0"));
//! let link = SerialLink::new(
//!     Box::new(connector),
//!     slot.clone(),
//!     Arc::new(TelemetryIngest::new(store.clone())),
//!     LinkSettings::default(),
//! );
//! tokio::spawn(link.run());
//! # }
//! ```

pub mod command;
pub mod mock;
pub mod reader;
pub mod transport;

pub use command::CommandChannel;
pub use mock::{MockConnector, MockTransport};
pub use reader::{LinkSettings, SerialLink, TelemetryIngest};
#[cfg(feature = "serial")]
pub use transport::{list_ports, SerialConnector};
pub use transport::{pick_port, Connector, PortCandidate, Transport, TransportSlot};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Connection state exposed in snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub serial_connected: bool,
    /// Last open/read/write failure, cleared on a successful open.
    pub serial_error: Option<String>,
    pub port: Option<String>,
}

/// Consumer of decoded lines.
///
/// Called from the link task only; implementations lock their own state
/// briefly and must not block on I/O.
pub trait LineSink: Send + Sync {
    fn on_line(&self, line: &str);

    /// Once per poll tick, including while the link is down.
    fn on_tick(&self, _now: DateTime<Utc>) {}

    fn on_link_change(&self, _status: &LinkStatus) {}
}
