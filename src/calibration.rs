//! # Calibration Engine
//!
//! Line-follower debug variant. A [`CalibrationSession`] accumulates per-channel
//! extrema of the reflectance sensors while the operator sweeps the robot
//! across the line; [`DebugState`] wraps the latest [`SensorFrame`], the
//! session and the link status behind one mutex so a sensor update and its
//! calibration fold are observed together.

use crate::link::{LinkStatus, LineSink};
use crate::logutil::escape_log;
use crate::protocol::{parse_debug_line, DebugLine, Mode, SENSOR_COUNT};
use log::{debug, info};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Ceiling of the 10-bit ADC; every channel minimum starts here.
pub const ADC_MAX: i32 = 1023;
/// Centre of the 0..7000 weighted line position.
pub const CENTER_POSITION: i64 = 3500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalibrationSession {
    pub active: bool,
    pub min: [i32; SENSOR_COUNT],
    pub max: [i32; SENSOR_COUNT],
}

impl Default for CalibrationSession {
    fn default() -> Self {
        Self {
            active: false,
            min: [ADC_MAX; SENSOR_COUNT],
            max: [0; SENSOR_COUNT],
        }
    }
}

impl CalibrationSession {
    /// Begin a fresh recording window. Bounds always reset, even when a
    /// session is already running.
    pub fn start(&mut self) {
        self.min = [ADC_MAX; SENSOR_COUNT];
        self.max = [0; SENSOR_COUNT];
        self.active = true;
    }

    /// Freeze the bounds.
    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fold one reading into the bounds. Ignored while inactive or for a
    /// channel outside the bar.
    pub fn observe(&mut self, channel: usize, value: i32) {
        if !self.active || channel >= SENSOR_COUNT {
            return;
        }
        self.min[channel] = self.min[channel].min(value);
        self.max[channel] = self.max[channel].max(value);
    }

    /// C snippet to paste into the follower firmware.
    pub fn render_code(&self) -> String {
        let mut code = String::from("// Copy this to line_follower.cpp\n");
        let _ = writeln!(
            code,
            "static int sensorMin[LINE_SENSOR_COUNT] = {{{}}};",
            join(&self.min)
        );
        let _ = writeln!(
            code,
            "static int sensorMax[LINE_SENSOR_COUNT] = {{{}}};",
            join(&self.max)
        );
        code.push_str("static bool calibrated = true;");
        code
    }

    pub fn code(&self) -> CalibrationCode {
        CalibrationCode {
            code: self.render_code(),
            min: self.min,
            max: self.max,
        }
    }
}

fn join(values: &[i32]) -> String {
    values
        .iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalibrationCode {
    pub code: String,
    pub min: [i32; SENSOR_COUNT],
    pub max: [i32; SENSOR_COUNT],
}

/// Most recent decoded view of the follower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorFrame {
    pub sensors: [i32; SENSOR_COUNT],
    pub position: i64,
    pub error: i64,
    pub left_speed: i64,
    pub right_speed: i64,
    pub mode: Mode,
    pub raw_line: String,
}

impl Default for SensorFrame {
    fn default() -> Self {
        Self {
            sensors: [0; SENSOR_COUNT],
            position: CENTER_POSITION,
            error: 0,
            left_speed: 0,
            right_speed: 0,
            mode: Mode::Normal,
            raw_line: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugSnapshot {
    pub frame: SensorFrame,
    pub calibration: CalibrationSession,
    pub link: LinkStatus,
}

#[derive(Debug, Default)]
struct Inner {
    frame: SensorFrame,
    calibration: CalibrationSession,
    link: LinkStatus,
}

impl Inner {
    fn sensor(&mut self, channel: usize, value: i32) {
        self.frame.sensors[channel] = value;
        self.calibration.observe(channel, value);
    }
}

/// Shared state of the debug dashboard.
#[derive(Debug, Default)]
pub struct DebugState {
    inner: Mutex<Inner>,
}

impl DebugState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one trimmed debug line. Every line lands in `raw_line`; a
    /// malformed `RAW:` line changes nothing else.
    pub fn ingest(&self, line: &str) -> DebugLine {
        let parsed = match parse_debug_line(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Dropping debug line '{}': {}", escape_log(line), e);
                crate::metrics::inc_parse_failures();
                DebugLine::Unrecognized
            }
        };

        let mut inner = self.lock();
        inner.frame.raw_line = line.to_string();
        match &parsed {
            DebugLine::Normal {
                position,
                error,
                left,
                right,
            } => {
                let frame = &mut inner.frame;
                frame.position = *position;
                frame.error = *error;
                frame.left_speed = *left;
                frame.right_speed = *right;
                frame.mode = Mode::Normal;
            }
            DebugLine::Sharp {
                position,
                direction,
                left,
                right,
            } => {
                let frame = &mut inner.frame;
                frame.position = *position;
                frame.left_speed = *left;
                frame.right_speed = *right;
                frame.mode = Mode::Sharp(*direction);
            }
            DebugLine::Lost(direction) => inner.frame.mode = Mode::Lost(*direction),
            DebugLine::Raw(values) => {
                for (channel, value) in values.iter().enumerate() {
                    inner.sensor(channel, *value);
                }
            }
            DebugLine::Sensor { channel, value } => inner.sensor(*channel, *value),
            DebugLine::Unrecognized => {}
        }
        parsed
    }

    pub fn start_calibration(&self) {
        self.lock().calibration.start();
        info!("Calibration started");
    }

    pub fn stop_calibration(&self) -> CalibrationSession {
        let mut inner = self.lock();
        inner.calibration.stop();
        info!(
            "Calibration stopped: min={:?} max={:?}",
            inner.calibration.min, inner.calibration.max
        );
        inner.calibration.clone()
    }

    pub fn reset_calibration(&self) {
        self.lock().calibration.reset();
        info!("Calibration reset");
    }

    pub fn is_calibrating(&self) -> bool {
        self.lock().calibration.active
    }

    pub fn calibration_code(&self) -> CalibrationCode {
        self.lock().calibration.code()
    }

    pub fn set_link(&self, status: LinkStatus) {
        self.lock().link = status;
    }

    pub fn snapshot(&self) -> DebugSnapshot {
        let inner = self.lock();
        DebugSnapshot {
            frame: inner.frame.clone(),
            calibration: inner.calibration.clone(),
            link: inner.link.clone(),
        }
    }
}

impl LineSink for DebugState {
    fn on_line(&self, line: &str) {
        self.ingest(line);
    }

    fn on_link_change(&self, status: &LinkStatus) {
        self.set_link(status.clone());
    }
}
