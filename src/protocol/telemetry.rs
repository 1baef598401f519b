//! Robot telemetry packets.
//!
//! Each robot reports over the radio bridge as one pipe-delimited line:
//!
//! ```text
//! ID|TIME|STATE|LINE|SPD:<int>|L:<int>,R:<int>|D:<int>cm|FLAGS
//! R2|45s|FOLLOW|CENTER|SPD:200|L:1234,R:1230|D:25cm|CPgde
//! ```
//!
//! Structural problems (too few fields, unknown robot) reject the line.
//! Problems inside a single numeric field only fall back to that field's
//! default, so one garbled byte does not cost a whole packet.
use super::scan::search;
use crate::device::{DeviceId, DeviceSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FIELD_SEPARATOR: char = '|';
pub const MIN_FIELDS: usize = 8;
/// Distance value meaning "no obstacle in range / not measured".
pub const NO_DISTANCE: i64 = -1;

/// Game progress flags, encoded on the wire as five case-coded letters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    pub calibrated: bool,
    pub cone_picked: bool,
    pub game_started: bool,
    pub cone_dropped: bool,
    pub game_ended: bool,
}

const FLAG_LETTERS: [char; 5] = ['C', 'P', 'G', 'D', 'E'];

impl Flags {
    /// Decode a flags field such as `CPgde`; `None` when shorter than 5 chars.
    pub fn parse(field: &str) -> Option<Flags> {
        let chars: Vec<char> = field.trim().chars().take(FLAG_LETTERS.len()).collect();
        if chars.len() < FLAG_LETTERS.len() {
            return None;
        }
        let set = |i: usize| chars[i] == FLAG_LETTERS[i];
        Some(Flags {
            calibrated: set(0),
            cone_picked: set(1),
            game_started: set(2),
            cone_dropped: set(3),
            game_ended: set(4),
        })
    }

    pub fn encode(&self) -> String {
        [
            self.calibrated,
            self.cone_picked,
            self.game_started,
            self.cone_dropped,
            self.game_ended,
        ]
        .iter()
        .zip(FLAG_LETTERS)
        .map(|(&on, letter)| if on { letter } else { letter.to_ascii_lowercase() })
        .collect()
    }
}

/// One decoded telemetry packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub device: DeviceId,
    pub uptime: String,
    pub state: String,
    pub line_position: String,
    pub speed: i64,
    pub left_ticks: i64,
    pub right_ticks: i64,
    pub distance: i64,
    /// `None` when the flags field was too short to decode.
    pub flags: Option<Flags>,
}

impl TelemetryRecord {
    /// Render back to wire format. A missing flags field renders as `-----`.
    pub fn to_line(&self) -> String {
        let distance = if self.distance < 0 {
            "D:--".to_string()
        } else {
            format!("D:{}cm", self.distance)
        };
        let flags = self
            .flags
            .map(|f| f.encode())
            .unwrap_or_else(|| "-----".to_string());
        format!(
            "{}|{}|{}|{}|SPD:{}|L:{},R:{}|{}|{}",
            self.device,
            self.uptime,
            self.state,
            self.line_position,
            self.speed,
            self.left_ticks,
            self.right_ticks,
            distance,
            flags
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryParseError {
    #[error("expected at least 8 fields, got {0}")]
    TooFewFields(usize),
    #[error("unknown device '{0}'")]
    UnknownDevice(String),
}

/// True when the line is addressed like a packet (`<known id>|...`).
///
/// Lines failing this check are free text; lines passing it are parsed and
/// dropped on error rather than shown as messages.
pub fn is_telemetry_line(line: &str, devices: &DeviceSet) -> bool {
    line.split_once(FIELD_SEPARATOR)
        .map(|(id, _)| devices.contains(id))
        .unwrap_or(false)
}

pub fn parse_telemetry(
    line: &str,
    devices: &DeviceSet,
) -> Result<TelemetryRecord, TelemetryParseError> {
    let line = line.trim();
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
    if fields.len() < MIN_FIELDS {
        return Err(TelemetryParseError::TooFewFields(fields.len()));
    }
    // the id must match exactly; only the payload fields are padded
    let raw_id = line.split(FIELD_SEPARATOR).next().unwrap_or_default();
    let device = devices
        .get(raw_id)
        .cloned()
        .ok_or_else(|| TelemetryParseError::UnknownDevice(raw_id.to_string()))?;

    let (left_ticks, right_ticks) = parse_ticks(fields[5]).unwrap_or((0, 0));

    Ok(TelemetryRecord {
        device,
        uptime: fields[1].to_string(),
        state: fields[2].to_string(),
        line_position: fields[3].to_string(),
        speed: parse_speed(fields[4]).unwrap_or(0),
        left_ticks,
        right_ticks,
        distance: parse_distance(fields[6]),
        flags: Flags::parse(fields[7]),
    })
}

fn parse_speed(field: &str) -> Option<i64> {
    search(field, "SPD:", |c| {
        c.literal("SPD:")?;
        c.unsigned()
    })
}

fn parse_ticks(field: &str) -> Option<(i64, i64)> {
    search(field, "L:", |c| {
        c.literal("L:")?;
        let left = c.signed()?;
        c.literal(",R:")?;
        let right = c.signed()?;
        Some((left, right))
    })
}

/// `D:<n>cm` gives `n`; `D:--` and anything else give [`NO_DISTANCE`].
fn parse_distance(field: &str) -> i64 {
    search(field, "D:", |c| {
        c.literal("D:")?;
        let cm = c.unsigned()?;
        c.literal("cm")?;
        Some(cm)
    })
    .unwrap_or(NO_DISTANCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn robots() -> DeviceSet {
        DeviceSet::new(["R1", "R2", "R3"])
    }

    #[test]
    fn parses_reference_packet() {
        let rec = parse_telemetry(
            "R2|45s|FOLLOW|CENTER|SPD:200|L:1234,R:1230|D:25cm|CPgde",
            &robots(),
        )
        .expect("valid packet");
        assert_eq!(rec.device.as_str(), "R2");
        assert_eq!(rec.uptime, "45s");
        assert_eq!(rec.state, "FOLLOW");
        assert_eq!(rec.line_position, "CENTER");
        assert_eq!(rec.speed, 200);
        assert_eq!((rec.left_ticks, rec.right_ticks), (1234, 1230));
        assert_eq!(rec.distance, 25);
        assert_eq!(
            rec.flags,
            Some(Flags {
                calibrated: true,
                cone_picked: true,
                game_started: false,
                cone_dropped: false,
                game_ended: false,
            })
        );
    }

    #[test]
    fn distance_forms() {
        assert_eq!(parse_distance("D:25cm"), 25);
        assert_eq!(parse_distance("D:--"), NO_DISTANCE);
        assert_eq!(parse_distance("D:abc"), NO_DISTANCE);
        assert_eq!(parse_distance("D:25"), NO_DISTANCE);
        assert_eq!(parse_distance(""), NO_DISTANCE);
    }

    #[test]
    fn numeric_fields_fall_back_to_defaults() {
        let rec = parse_telemetry("R1|1s|IDLE|NONE|SPD:fast|L:x,R:2|D:--|CPGDE", &robots())
            .expect("structurally valid");
        assert_eq!(rec.speed, 0);
        assert_eq!((rec.left_ticks, rec.right_ticks), (0, 0));
        assert_eq!(rec.distance, NO_DISTANCE);
    }

    #[test]
    fn negative_ticks_are_kept() {
        let rec = parse_telemetry("R3|9s|TURN_L|LEFT|SPD:120|L:-15,R:40|D:--|ccccc", &robots())
            .expect("valid packet");
        assert_eq!((rec.left_ticks, rec.right_ticks), (-15, 40));
        assert_eq!(rec.flags, Some(Flags::default()));
    }

    #[test]
    fn short_flags_field_yields_none() {
        let rec = parse_telemetry("R1|1s|IDLE|NONE|SPD:0|L:0,R:0|D:--|CP", &robots())
            .expect("valid packet");
        assert_eq!(rec.flags, None);
    }

    #[test]
    fn structural_failures() {
        assert_eq!(
            parse_telemetry("R2|45s|FOLLOW", &robots()),
            Err(TelemetryParseError::TooFewFields(3))
        );
        assert_eq!(
            parse_telemetry("R9|1s|A|B|SPD:1|L:1,R:1|D:1cm|CPGDE", &robots()),
            Err(TelemetryParseError::UnknownDevice("R9".into()))
        );
    }

    #[test]
    fn classifies_packets_by_leading_id() {
        assert!(is_telemetry_line("R2|anything", &robots()));
        assert!(!is_telemetry_line("R2 says hi", &robots()));
        assert!(!is_telemetry_line("R22|x", &robots()));
        assert!(!is_telemetry_line("R2 |45s|FOLLOW|CENTER|SPD:200|L:1,R:1|D:--|CPgde", &robots()));
    }

    #[test]
    fn padded_id_is_not_a_packet() {
        assert_eq!(
            parse_telemetry("R2 |45s|FOLLOW|CENTER|SPD:200|L:1,R:1|D:--|CPgde", &robots()),
            Err(TelemetryParseError::UnknownDevice("R2 ".into()))
        );
        let rec = parse_telemetry("R2| 45s | FOLLOW |CENTER|SPD:200|L:1,R:1|D:--|CPgde", &robots())
            .expect("payload padding is tolerated");
        assert_eq!(rec.state, "FOLLOW");
    }

    #[test]
    fn flags_encode_matches_wire_case() {
        let flags = Flags::parse("cPgDe").expect("five letters");
        assert_eq!(flags.encode(), "cPgDe");
    }
}
