//! Line-follower debug console output.
//!
//! The follower firmware prints PID state and sensor diagnostics as loose
//! text. Recognised forms, checked in this order (first match wins):
//!
//! 1. `pos=3500 err=0 L=150 R=150`
//! 2. `SHARP pos=500 LEFT L=-200 R=200`
//! 3. `LOST! Spinning LEFT` (anything containing `LOST!`)
//! 4. `RAW:657,636,559,523,536,442,430,493`
//! 5. `  S0 (A0): 657`
//!
//! Forms 1 and 2 both carry `pos=`; the ordering keeps a sharp-turn line
//! from ever being read as a normal frame and vice versa.
use super::scan::search;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Number of reflectance channels on the sensor bar.
pub const SENSOR_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "LEFT" => Some(Direction::Left),
            "RIGHT" => Some(Direction::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}

/// Steering mode reported by the follower.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Normal,
    Sharp(Direction),
    Lost(Option<Direction>),
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Normal => f.write_str("NORMAL"),
            Mode::Sharp(dir) => write!(f, "SHARP {}", dir.as_str()),
            Mode::Lost(None) => f.write_str("LOST"),
            Mode::Lost(Some(dir)) => write!(f, "LOST {}", dir.as_str()),
        }
    }
}

impl Serialize for Mode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One classified debug line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugLine {
    Normal {
        position: i64,
        error: i64,
        left: i64,
        right: i64,
    },
    Sharp {
        position: i64,
        direction: Direction,
        left: i64,
        right: i64,
    },
    Lost(Option<Direction>),
    /// Up to [`SENSOR_COUNT`] readings, assigned to channels from 0.
    Raw(Vec<i32>),
    Sensor {
        channel: usize,
        value: i32,
    },
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebugParseError {
    #[error("bad RAW reading '{token}' at channel {channel}")]
    BadRawValue { channel: usize, token: String },
}

/// Classify one trimmed debug line.
///
/// A `RAW:` line with a malformed reading is an error so the caller can
/// drop it whole; every other unmatched line is simply `Unrecognized`.
pub fn parse_debug_line(line: &str) -> Result<DebugLine, DebugParseError> {
    if let Some(frame) = parse_normal(line) {
        return Ok(frame);
    }
    if let Some(frame) = parse_sharp(line) {
        return Ok(frame);
    }
    if line.contains("LOST!") {
        let direction = if line.contains("LEFT") {
            Some(Direction::Left)
        } else if line.contains("RIGHT") {
            Some(Direction::Right)
        } else {
            None
        };
        return Ok(DebugLine::Lost(direction));
    }
    if let Some(payload) = line.trim().strip_prefix("RAW:") {
        return parse_raw(payload);
    }
    Ok(parse_sensor_diag(line).unwrap_or(DebugLine::Unrecognized))
}

fn parse_normal(line: &str) -> Option<DebugLine> {
    search(line, "pos=", |c| {
        c.literal("pos=")?;
        let position = c.unsigned()?;
        c.spaces(1)?;
        c.literal("err=")?;
        let error = c.signed()?;
        c.spaces(1)?;
        c.literal("L=")?;
        let left = c.signed()?;
        c.spaces(1)?;
        c.literal("R=")?;
        let right = c.signed()?;
        Some(DebugLine::Normal {
            position,
            error,
            left,
            right,
        })
    })
}

fn parse_sharp(line: &str) -> Option<DebugLine> {
    search(line, "SHARP pos=", |c| {
        c.literal("SHARP pos=")?;
        let position = c.unsigned()?;
        c.spaces(1)?;
        let direction = Direction::from_token(c.one_of(&["LEFT", "RIGHT"])?)?;
        c.spaces(1)?;
        c.literal("L=")?;
        let left = c.signed()?;
        c.spaces(1)?;
        c.literal("R=")?;
        let right = c.signed()?;
        Some(DebugLine::Sharp {
            position,
            direction,
            left,
            right,
        })
    })
}

fn parse_raw(payload: &str) -> Result<DebugLine, DebugParseError> {
    payload
        .split(',')
        .take(SENSOR_COUNT)
        .enumerate()
        .map(|(channel, token)| {
            token
                .trim()
                .parse::<i32>()
                .map_err(|_| DebugParseError::BadRawValue {
                    channel,
                    token: token.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(DebugLine::Raw)
}

fn parse_sensor_diag(line: &str) -> Option<DebugLine> {
    search(line, "S", |c| {
        c.literal("S")?;
        let channel = c.digit()? as usize;
        c.spaces(0)?;
        c.literal("(A")?;
        c.digit()?;
        c.literal("):")?;
        c.spaces(0)?;
        let value = i32::try_from(c.unsigned()?).ok()?;
        Some((channel, value))
    })
    .filter(|(channel, _)| *channel < SENSOR_COUNT)
    .map(|(channel, value)| DebugLine::Sensor { channel, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> DebugLine {
        parse_debug_line(line).expect("not a malformed RAW line")
    }

    #[test]
    fn normal_frame() {
        assert_eq!(
            parse("pos=3500 err=-12 L=150 R=138"),
            DebugLine::Normal {
                position: 3500,
                error: -12,
                left: 150,
                right: 138
            }
        );
    }

    #[test]
    fn sharp_turn_is_not_a_normal_frame() {
        assert_eq!(
            parse("SHARP pos=500 LEFT L=-200 R=200"),
            DebugLine::Sharp {
                position: 500,
                direction: Direction::Left,
                left: -200,
                right: 200
            }
        );
    }

    #[test]
    fn lost_refines_direction() {
        assert_eq!(parse("LOST! Spinning LEFT"), DebugLine::Lost(Some(Direction::Left)));
        assert_eq!(parse("LOST! Spinning RIGHT"), DebugLine::Lost(Some(Direction::Right)));
        assert_eq!(parse("LOST!"), DebugLine::Lost(None));
        assert_eq!(parse("LOST line"), DebugLine::Unrecognized);
    }

    #[test]
    fn raw_stream_takes_first_eight() {
        assert_eq!(
            parse("RAW:657,636,559,523,536,442,430,493,999"),
            DebugLine::Raw(vec![657, 636, 559, 523, 536, 442, 430, 493])
        );
        assert_eq!(parse("RAW: 1, 2"), DebugLine::Raw(vec![1, 2]));
    }

    #[test]
    fn first_matching_form_wins() {
        assert_eq!(
            parse("pos=3500 err=0 L=150 R=150 LOST!"),
            DebugLine::Normal {
                position: 3500,
                error: 0,
                left: 150,
                right: 150
            }
        );
        assert_eq!(parse("RAW:657,636 LOST!"), DebugLine::Lost(None));
        assert_eq!(
            parse("LOST! RAW:1,2,3 RIGHT"),
            DebugLine::Lost(Some(Direction::Right))
        );
    }

    #[test]
    fn malformed_raw_is_rejected_whole() {
        let err = parse_debug_line("RAW:657,abc,559").unwrap_err();
        assert_eq!(
            err,
            DebugParseError::BadRawValue {
                channel: 1,
                token: "abc".into()
            }
        );
        assert!(parse_debug_line("RAW:").is_err());
    }

    #[test]
    fn sensor_diagnostics() {
        assert_eq!(parse("  S0 (A0): 657"), DebugLine::Sensor { channel: 0, value: 657 });
        assert_eq!(parse("S7(A7):12"), DebugLine::Sensor { channel: 7, value: 12 });
        assert_eq!(parse("  S8 (A0): 657"), DebugLine::Unrecognized);
        assert_eq!(parse("S10 (A1): 5"), DebugLine::Unrecognized);
    }

    #[test]
    fn mode_labels() {
        assert_eq!(Mode::Normal.to_string(), "NORMAL");
        assert_eq!(Mode::Sharp(Direction::Right).to_string(), "SHARP RIGHT");
        assert_eq!(Mode::Lost(Some(Direction::Left)).to_string(), "LOST LEFT");
        assert_eq!(Mode::Lost(None).to_string(), "LOST");
    }

    #[test]
    fn chatter_is_unrecognized() {
        assert_eq!(parse("Kp=0.08 Kd=0.9"), DebugLine::Unrecognized);
    }
}
