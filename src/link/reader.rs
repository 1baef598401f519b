//! Read loop: poll the transport, decode lines, hand them to a sink, and
//! reconnect forever when the port goes away.
use super::transport::{Connector, TransportSlot};
use super::{LineSink, LinkStatus};
use crate::error::TwinResult;
use crate::logutil::{escape_log, hex_preview};
use crate::metrics;
use crate::protocol::{is_telemetry_line, parse_telemetry, LineDecoder};
use crate::store::DeviceStore;
use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant, MissedTickBehavior};

/// Largest chunk pulled from the transport per tick.
const READ_CHUNK: usize = 1024;

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub poll_interval: Duration,
    pub reconnect_backoff: Duration,
    /// Wait after opening before reading; boot chatter received during it is
    /// discarded. Zero skips both.
    pub settle: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            reconnect_backoff: Duration::from_secs(2),
            settle: Duration::from_millis(150),
        }
    }
}

pub struct SerialLink {
    connector: Box<dyn Connector>,
    slot: TransportSlot,
    decoder: LineDecoder,
    sink: Arc<dyn LineSink>,
    settings: LinkSettings,
}

impl SerialLink {
    pub fn new(
        connector: Box<dyn Connector>,
        slot: TransportSlot,
        sink: Arc<dyn LineSink>,
        settings: LinkSettings,
    ) -> Self {
        Self {
            connector,
            slot,
            decoder: LineDecoder::new(),
            sink,
            settings,
        }
    }

    pub fn slot(&self) -> &TransportSlot {
        &self.slot
    }

    /// Open the transport and install it in the slot.
    pub async fn connect(&mut self) -> TwinResult<()> {
        let mut transport = self.connector.open()?;
        if !self.settings.settle.is_zero() {
            sleep(self.settings.settle).await;
            let mut purge = [0u8; 512];
            if transport.bytes_available()? > 0 {
                let n = transport.read(&mut purge)?;
                debug!("Discarded {} bytes of boot output", n);
            }
        }
        self.decoder.reset();
        let status = self.slot.install(transport);
        metrics::inc_connections_opened();
        info!(
            "Serial connected on {}",
            status.port.as_deref().unwrap_or("?")
        );
        self.sink.on_link_change(&status);
        Ok(())
    }

    /// One tick: drain available bytes into the sink, then let the sink run
    /// its periodic work. Returns the number of lines delivered.
    pub fn poll(&mut self) -> TwinResult<usize> {
        let mut buf = [0u8; READ_CHUNK];
        let n = self.slot.read_available(&mut buf)?;
        let mut delivered = 0;
        if n > 0 {
            trace!("RAW {} bytes: {}", n, hex_preview(&buf[..n], 64));
            for line in self.decoder.feed(&buf[..n]) {
                metrics::inc_lines_received();
                trace!("RX: {}", escape_log(&line));
                self.sink.on_line(&line);
                delivered += 1;
            }
        }
        self.sink.on_tick(Utc::now());
        Ok(delivered)
    }

    fn report_failure(&self, status: LinkStatus) {
        self.sink.on_link_change(&status);
    }

    /// Keep the sink ticking while waiting to retry.
    async fn backoff(&self) {
        let deadline = Instant::now() + self.settings.reconnect_backoff;
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                _ = ticker.tick() => self.sink.on_tick(Utc::now()),
            }
        }
    }

    /// Run until the process exits.
    pub async fn run(mut self) {
        info!("Starting serial link task for {}", self.connector.target());
        loop {
            if !self.slot.is_open() {
                if let Err(e) = self.connect().await {
                    warn!(
                        "Failed to open {}: {} - retrying in {}ms",
                        self.connector.target(),
                        e,
                        self.settings.reconnect_backoff.as_millis()
                    );
                    metrics::inc_transport_errors();
                    self.report_failure(self.slot.teardown(e.to_string()));
                    self.backoff().await;
                    continue;
                }
            }

            let mut interval = tokio::time::interval(self.settings.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Err(e) = self.poll() {
                    error!("Serial link lost: {}", e);
                    let status = if self.slot.is_open() {
                        self.slot.teardown(e.to_string())
                    } else {
                        self.slot.status()
                    };
                    self.report_failure(status);
                    break;
                }
            }
            self.backoff().await;
        }
    }
}

/// Routes lines from the robot bridge into the device store.
///
/// `<known id>|...` lines are packets; anything else is free text filed under
/// the robot it names.
pub struct TelemetryIngest {
    store: Arc<DeviceStore>,
}

impl TelemetryIngest {
    pub fn new(store: Arc<DeviceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.store
    }
}

impl LineSink for TelemetryIngest {
    fn on_line(&self, line: &str) {
        let devices = self.store.devices();
        if !is_telemetry_line(line, devices) {
            if let Some(id) = self.store.attribute(line) {
                metrics::inc_messages_attributed();
                debug!("{} says: {}", id, escape_log(line));
            }
            return;
        }
        let applied = parse_telemetry(line, devices)
            .map_err(|e| e.to_string())
            .and_then(|record| self.store.apply(&record).map_err(|e| e.to_string()));
        match applied {
            Ok(()) => metrics::inc_telemetry_applied(),
            Err(reason) => {
                metrics::inc_parse_failures();
                debug!("Discarding packet '{}': {}", escape_log(line), reason);
            }
        }
    }

    fn on_tick(&self, now: DateTime<Utc>) {
        self.store.sweep_liveness(now);
    }

    fn on_link_change(&self, status: &LinkStatus) {
        if let Some(err) = &status.serial_error {
            debug!("Link status: connected={} error={}", status.serial_connected, err);
        }
    }
}
