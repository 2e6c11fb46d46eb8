//! # Simulator Interface
//!
//! Frames exchanged with the driving simulator. The simulator speaks a socket.io style text
//! protocol: every event frame starts with `42` followed by a JSON array of `[event, data]`.
//!
//! Inbound the only event of interest is `telemetry`, whose readings arrive as numeric strings.
//! Outbound the drive executable sends `steer`, `reset` or `manual` events.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Prefix marking a socket.io event message (`4` = message, `2` = event).
pub const EVENT_PREFIX: &str = "42";

/// Name of the telemetry event.
pub const TELEMETRY_EVENT: &str = "telemetry";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One step of telemetry from the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Cross track error, the signed lateral distance from the reference path.
    #[serde(deserialize_with = "de_reading")]
    pub cte: f64,

    /// Vehicle speed.
    #[serde(deserialize_with = "de_reading")]
    pub speed: f64,

    /// Current steering angle of the vehicle.
    #[serde(deserialize_with = "de_reading")]
    pub steering_angle: f64
}

#[derive(Serialize)]
struct SteerPayload {
    steering_angle: f64,
    throttle: f64
}

#[derive(Serialize)]
struct EmptyPayload {}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SimFrame {
    /// Not a socket.io event message, nothing to respond to.
    NotEvent,

    /// An event with no data. The simulator is in manual mode and expects a `manual` reply.
    NoData,

    /// A telemetry step.
    Telemetry(Telemetry),

    /// Any other event, identified by name.
    Other(String)
}

/// Commands sent back to the simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimCmd {
    /// Steering and throttle demands. Steering is normalised to `[-1, 1]`.
    Steer {
        steering_angle: f64,
        throttle: f64
    },

    /// Restart the run from its initial conditions.
    Reset,

    /// Acknowledge a frame without data, leaving the simulator under manual control.
    Manual
}

/// Errors which can occur while parsing a frame.
#[derive(Debug, thiserror::Error)]
pub enum SimParseError {
    #[error("Frame contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Frame does not contain an event name")]
    MissingEvent,

    #[error("Event {0} is expected to have data but it doesn't")]
    MissingData(String),

    #[error("Could not encode the command: {0}")]
    EncodeError(serde_json::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimCmd {
    /// Encode the command as a frame ready to be sent to the simulator.
    pub fn to_frame(&self) -> Result<String, SimParseError> {
        let body = match *self {
            SimCmd::Steer { steering_angle, throttle } => serde_json::to_string(
                &("steer", SteerPayload { steering_angle, throttle })
            ),
            SimCmd::Reset => serde_json::to_string(&("reset", EmptyPayload {})),
            SimCmd::Manual => serde_json::to_string(&("manual", EmptyPayload {}))
        }.map_err(SimParseError::EncodeError)?;

        Ok(format!("{}{}", EVENT_PREFIX, body))
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse a frame received from the simulator.
pub fn parse_frame(msg: &str) -> Result<SimFrame, SimParseError> {
    if msg.len() <= EVENT_PREFIX.len() || !msg.starts_with(EVENT_PREFIX) {
        return Ok(SimFrame::NotEvent)
    }

    // The simulator sends a literal null in place of the data when it's driven manually
    if msg.contains("null") {
        return Ok(SimFrame::NoData)
    }

    let body = match (msg.find('['), msg.rfind(']')) {
        (Some(b1), Some(b2)) if b2 > b1 => &msg[b1..=b2],
        _ => return Ok(SimFrame::NoData)
    };

    let items: Vec<Value> = serde_json::from_str(body)
        .map_err(SimParseError::InvalidJson)?;

    let event = match items.get(0).and_then(Value::as_str) {
        Some(e) => e,
        None => return Err(SimParseError::MissingEvent)
    };

    if event != TELEMETRY_EVENT {
        return Ok(SimFrame::Other(event.to_string()))
    }

    let data = items.get(1)
        .ok_or_else(|| SimParseError::MissingData(event.to_string()))?;

    Telemetry::deserialize(data)
        .map(SimFrame::Telemetry)
        .map_err(SimParseError::InvalidJson)
}

/// Readings may be sent either as numbers or as strings containing numbers.
fn de_reading<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Reading {
        Num(f64),
        Str(String)
    }

    match Reading::deserialize(deserializer)? {
        Reading::Num(n) => Ok(n),
        Reading::Str(s) => s.trim().parse().map_err(serde::de::Error::custom)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_telemetry() {
        let frame = parse_frame(
            r#"42["telemetry",{"cte":"0.7598","speed":"0.4380","steering_angle":"-1.25","throttle":"0.3"}]"#
        ).unwrap();

        assert_eq!(frame, SimFrame::Telemetry(Telemetry {
            cte: 0.7598,
            speed: 0.4380,
            steering_angle: -1.25
        }));
    }

    #[test]
    fn test_parse_numeric_readings() {
        let frame = parse_frame(
            r#"42["telemetry",{"cte":-0.5,"speed":12,"steering_angle":0.0}]"#
        ).unwrap();

        assert_eq!(frame, SimFrame::Telemetry(Telemetry {
            cte: -0.5,
            speed: 12.0,
            steering_angle: 0.0
        }));
    }

    #[test]
    fn test_parse_no_data() {
        assert_eq!(parse_frame(r#"42["telemetry",null]"#).unwrap(), SimFrame::NoData);
        assert_eq!(parse_frame("42 no brackets").unwrap(), SimFrame::NoData);
    }

    #[test]
    fn test_parse_not_event() {
        assert_eq!(parse_frame("2").unwrap(), SimFrame::NotEvent);
        assert_eq!(parse_frame("42").unwrap(), SimFrame::NotEvent);
        assert_eq!(parse_frame(r#"40["telemetry",{}]"#).unwrap(), SimFrame::NotEvent);
    }

    #[test]
    fn test_parse_other_event() {
        assert_eq!(
            parse_frame(r#"42["hello",{}]"#).unwrap(),
            SimFrame::Other(String::from("hello"))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_frame("42[1, 2]"), Err(SimParseError::MissingEvent)));
        assert!(matches!(
            parse_frame(r#"42["telemetry"]"#),
            Err(SimParseError::MissingData(_))
        ));
        assert!(matches!(
            parse_frame(r#"42["telemetry",{"cte":"abc","speed":"1","steering_angle":"0"}]"#),
            Err(SimParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_encode_cmds() {
        assert_eq!(
            SimCmd::Steer { steering_angle: -0.25, throttle: 0.3 }.to_frame().unwrap(),
            r#"42["steer",{"steering_angle":-0.25,"throttle":0.3}]"#
        );
        assert_eq!(SimCmd::Reset.to_frame().unwrap(), r#"42["reset",{}]"#);
        assert_eq!(SimCmd::Manual.to_frame().unwrap(), r#"42["manual",{}]"#);
    }
}
