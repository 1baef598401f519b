//! # Serial Line Protocols
//!
//! Everything between raw serial bytes and typed records:
//!
//! - [`line`] - newline framing with encoding tolerance
//! - [`telemetry`] - pipe-delimited robot packets (`R2|45s|FOLLOW|...`)
//! - [`debug`] - line-follower PID / sensor diagnostics
//!
//! Parsers are pure functions over a single trimmed line; they never touch
//! shared state and never fail the read loop.

pub mod debug;
pub mod line;
mod scan;
pub mod telemetry;

pub use debug::{parse_debug_line, DebugLine, DebugParseError, Direction, Mode, SENSOR_COUNT};
pub use line::LineDecoder;
pub use telemetry::{
    is_telemetry_line, parse_telemetry, Flags, TelemetryParseError, TelemetryRecord, NO_DISTANCE,
};
