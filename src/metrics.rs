//! Process-wide ingestion counters.
//!
//! Cheap relaxed atomics bumped from the link task and the command path; the
//! status snapshot reads them without taking any lock.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

static LINES_RECEIVED: AtomicU64 = AtomicU64::new(0);
static TELEMETRY_APPLIED: AtomicU64 = AtomicU64::new(0);
static PARSE_FAILURES: AtomicU64 = AtomicU64::new(0);
static MESSAGES_ATTRIBUTED: AtomicU64 = AtomicU64::new(0);
static OVERSIZE_DROPPED: AtomicU64 = AtomicU64::new(0);
static COMMANDS_SENT: AtomicU64 = AtomicU64::new(0);
static TRANSPORT_ERRORS: AtomicU64 = AtomicU64::new(0);
static CONNECTIONS_OPENED: AtomicU64 = AtomicU64::new(0);

pub fn inc_lines_received() {
    LINES_RECEIVED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_telemetry_applied() {
    TELEMETRY_APPLIED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_parse_failures() {
    PARSE_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_messages_attributed() {
    MESSAGES_ATTRIBUTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_oversize_dropped() {
    OVERSIZE_DROPPED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_commands_sent() {
    COMMANDS_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_transport_errors() {
    TRANSPORT_ERRORS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_connections_opened() {
    CONNECTIONS_OPENED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct Snapshot {
    pub lines_received: u64,
    pub telemetry_applied: u64,
    pub parse_failures: u64,
    pub messages_attributed: u64,
    pub oversize_dropped: u64,
    pub commands_sent: u64,
    pub transport_errors: u64,
    pub connections_opened: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        lines_received: LINES_RECEIVED.load(Ordering::Relaxed),
        telemetry_applied: TELEMETRY_APPLIED.load(Ordering::Relaxed),
        parse_failures: PARSE_FAILURES.load(Ordering::Relaxed),
        messages_attributed: MESSAGES_ATTRIBUTED.load(Ordering::Relaxed),
        oversize_dropped: OVERSIZE_DROPPED.load(Ordering::Relaxed),
        commands_sent: COMMANDS_SENT.load(Ordering::Relaxed),
        transport_errors: TRANSPORT_ERRORS.load(Ordering::Relaxed),
        connections_opened: CONNECTIONS_OPENED.load(Ordering::Relaxed),
    }
}
