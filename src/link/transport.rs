//! Byte transports and the shared slot that holds the open one.
use super::LinkStatus;
use crate::error::{TwinError, TwinResult};
use log::{debug, warn};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A bidirectional byte link to the bridge microcontroller.
pub trait Transport: Send {
    /// Bytes that can be read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Write the whole buffer and flush.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
    /// Human-readable port name for status output.
    fn describe(&self) -> String;
}

/// Opens transports; called on startup and after every failure.
pub trait Connector: Send + Sync {
    fn open(&self) -> TwinResult<Box<dyn Transport>>;
    /// What this connector is trying to open, for logs.
    fn target(&self) -> String;
}

/// Lets a test keep a handle on the connector it gave the link.
impl<C: Connector + ?Sized> Connector for Arc<C> {
    fn open(&self) -> TwinResult<Box<dyn Transport>> {
        (**self).open()
    }

    fn target(&self) -> String {
        (**self).target()
    }
}

#[derive(Default)]
struct SlotInner {
    transport: Option<Box<dyn Transport>>,
    port: Option<String>,
    last_error: Option<String>,
}

impl SlotInner {
    fn status(&self) -> LinkStatus {
        LinkStatus {
            serial_connected: self.transport.is_some(),
            serial_error: self.last_error.clone(),
            port: self.port.clone(),
        }
    }

    fn fail(&mut self, error: String) -> LinkStatus {
        self.transport = None;
        self.last_error = Some(error);
        self.status()
    }
}

/// The currently open transport, if any.
///
/// Reader and command writers share one slot; every access (including the
/// open check) happens under the same lock as install and teardown.
#[derive(Clone, Default)]
pub struct TransportSlot {
    inner: Arc<Mutex<SlotInner>>,
}

impl TransportSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn install(&self, transport: Box<dyn Transport>) -> LinkStatus {
        let mut inner = self.lock();
        inner.port = Some(transport.describe());
        inner.transport = Some(transport);
        inner.last_error = None;
        inner.status()
    }

    /// Drop the transport (if any) and remember why.
    pub fn teardown(&self, error: impl Into<String>) -> LinkStatus {
        self.lock().fail(error.into())
    }

    pub fn is_open(&self) -> bool {
        self.lock().transport.is_some()
    }

    pub fn status(&self) -> LinkStatus {
        self.lock().status()
    }

    /// Write to the open transport. A failed write tears the link down so the
    /// reader reconnects.
    pub fn write(&self, data: &[u8]) -> TwinResult<()> {
        self.write_after(data, || Ok(()))
    }

    /// Like [`write`](Self::write), but runs `before` once the transport is
    /// known to be open and while the slot stays locked. A closed slot never
    /// runs it; an error from it aborts the write.
    pub fn write_after<F>(&self, data: &[u8], before: F) -> TwinResult<()>
    where
        F: FnOnce() -> TwinResult<()>,
    {
        let mut inner = self.lock();
        let transport = inner
            .transport
            .as_mut()
            .ok_or(TwinError::TransportUnavailable)?;
        before()?;
        if let Err(e) = transport.write_all(data) {
            warn!("Serial write failed: {}", e);
            crate::metrics::inc_transport_errors();
            inner.fail(e.to_string());
            return Err(e.into());
        }
        Ok(())
    }

    /// Read whatever is buffered, without blocking. `Ok(0)` means idle.
    pub fn read_available(&self, buf: &mut [u8]) -> TwinResult<usize> {
        let mut inner = self.lock();
        let transport = inner
            .transport
            .as_mut()
            .ok_or(TwinError::TransportUnavailable)?;
        let result = match transport.bytes_available() {
            Ok(0) => Ok(0),
            Ok(_) => transport.read(buf),
            Err(e) => Err(e),
        };
        match result {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                debug!("Serial read timed out; treating as idle");
                Ok(0)
            }
            Err(e) => {
                crate::metrics::inc_transport_errors();
                inner.fail(e.to_string());
                Err(e.into())
            }
        }
    }
}

#[cfg(feature = "serial")]
pub use self::serial::{list_ports, SerialConnector};

/// One enumerated port.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PortCandidate {
    pub name: String,
    pub description: String,
}

impl PortCandidate {
    /// Looks like an Arduino-class USB serial adapter.
    pub fn is_likely_device(&self) -> bool {
        let desc = self.description.to_ascii_uppercase();
        ["USB", "ARDUINO", "CH340"]
            .iter()
            .any(|needle| desc.contains(needle))
            || self.name.starts_with("/dev/ttyUSB")
            || self.name.starts_with("/dev/ttyACM")
    }
}

/// First likely device among enumerated ports.
pub fn pick_port(candidates: &[PortCandidate]) -> Option<&PortCandidate> {
    candidates.iter().find(|c| c.is_likely_device())
}

#[cfg(feature = "serial")]
mod serial {
    use super::{pick_port, Connector, PortCandidate, Transport};
    use crate::error::{TwinError, TwinResult};
    use log::{debug, info};
    use serialport::{SerialPort, SerialPortType};
    use std::io::{self, Read, Write};
    use std::time::Duration;

    /// Port name that asks for auto-detection.
    pub const AUTO: &str = "auto";

    struct SerialTransport {
        port: Box<dyn SerialPort>,
        name: String,
    }

    impl Transport for SerialTransport {
        fn bytes_available(&mut self) -> io::Result<usize> {
            Ok(self.port.bytes_to_read()? as usize)
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.port.read(buf)
        }

        fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            Write::write_all(&mut self.port, data)?;
            self.port.flush()
        }

        fn describe(&self) -> String {
            self.name.clone()
        }
    }

    pub fn list_ports() -> TwinResult<Vec<PortCandidate>> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|info| {
                let description = match info.port_type {
                    SerialPortType::UsbPort(usb) => {
                        let parts: Vec<String> =
                            [usb.manufacturer, usb.product].into_iter().flatten().collect();
                        if parts.is_empty() {
                            "USB".to_string()
                        } else {
                            parts.join(" ")
                        }
                    }
                    SerialPortType::PciPort => "PCI".to_string(),
                    SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                    SerialPortType::Unknown => String::new(),
                };
                PortCandidate {
                    name: info.port_name,
                    description,
                }
            })
            .collect())
    }

    pub struct SerialConnector {
        port: String,
        baud_rate: u32,
    }

    impl SerialConnector {
        pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
            Self {
                port: port.into(),
                baud_rate,
            }
        }

        fn resolve(&self) -> TwinResult<String> {
            if !self.port.eq_ignore_ascii_case(AUTO) {
                return Ok(self.port.clone());
            }
            let candidates = list_ports()?;
            let found = pick_port(&candidates).ok_or(TwinError::NoPortFound)?;
            info!("Auto-detected serial port {} ({})", found.name, found.description);
            Ok(found.name.clone())
        }
    }

    impl Connector for SerialConnector {
        fn open(&self) -> TwinResult<Box<dyn Transport>> {
            let name = self.resolve()?;
            debug!("Opening serial port {} at {} baud", name, self.baud_rate);
            let mut builder =
                serialport::new(&name, self.baud_rate).timeout(Duration::from_millis(50));
            #[cfg(unix)]
            {
                builder = builder
                    .data_bits(serialport::DataBits::Eight)
                    .stop_bits(serialport::StopBits::One)
                    .parity(serialport::Parity::None);
            }
            let mut port = builder.open()?;
            // Assert DTR/RTS so boards that reset on open come up.
            let _ = port.write_data_terminal_ready(true);
            let _ = port.write_request_to_send(true);
            Ok(Box::new(SerialTransport { port, name }))
        }

        fn target(&self) -> String {
            format!("{} @ {} baud", self.port, self.baud_rate)
        }
    }
}
