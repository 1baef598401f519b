//! In-memory transport for tests and dry runs.
use super::transport::{Connector, Transport};
use crate::error::{TwinError, TwinResult};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Wire {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    fail_reads: bool,
    fail_writes: bool,
}

/// Cloneable handle onto a fake serial line. Clones share the same buffers,
/// so a test keeps one clone while the link owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    name: String,
    wire: Arc<Mutex<Wire>>,
}

impl MockTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wire: Arc::default(),
        }
    }

    fn wire(&self) -> MutexGuard<'_, Wire> {
        self.wire.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue bytes as if the device sent them.
    pub fn push_inbound(&self, data: &[u8]) {
        self.wire().inbound.extend(data);
    }

    pub fn written(&self) -> Vec<u8> {
        self.wire().written.clone()
    }

    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.wire().written).into_owned()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.wire().fail_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.wire().fail_writes = fail;
    }
}

impl Transport for MockTransport {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let wire = self.wire();
        if wire.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        Ok(wire.inbound.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.wire();
        let n = buf.len().min(wire.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(wire.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut wire = self.wire();
        if wire.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        wire.written.extend_from_slice(data);
        Ok(())
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Hands out clones of one [`MockTransport`] while "plugged in".
pub struct MockConnector {
    transport: MockTransport,
    available: AtomicBool,
    opens: AtomicUsize,
}

impl MockConnector {
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport,
            available: AtomicBool::new(true),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Successful opens so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn open(&self) -> TwinResult<Box<dyn Transport>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(TwinError::NoPortFound);
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.transport.clone()))
    }

    fn target(&self) -> String {
        self.transport.name.clone()
    }
}
