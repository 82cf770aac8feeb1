//! Telemetry from the mission link.
//!
//! The perception loop consumes resolved [`Telemetry`]
//! records only. [`parse_record`] adapts the mission
//! planner's text protocol, one record per line:
//!
//! ```text
//! STAT:1;ALT:52.5;POS:34.0001,-118.0002
//! ```
//!
//! for links (or recorded logs) that speak it.

use std::{collections::VecDeque, convert::TryFrom};

use anyhow::{anyhow, bail, Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_derive::*;

/// Mission status code reported by the flight controller.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "i32", into = "i32")]
pub enum MissionStatus {
    /// `-1`
    ReturningToBase,
    /// `0`
    EnRoute,
    /// `1`
    OnTarget,
}

impl TryFrom<i32> for MissionStatus {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        Ok(match code {
            -1 => MissionStatus::ReturningToBase,
            0 => MissionStatus::EnRoute,
            1 => MissionStatus::OnTarget,
            _ => bail!("unknown mission status code {}", code),
        })
    }
}

impl From<MissionStatus> for i32 {
    fn from(status: MissionStatus) -> i32 {
        match status {
            MissionStatus::ReturningToBase => -1,
            MissionStatus::EnRoute => 0,
            MissionStatus::OnTarget => 1,
        }
    }
}

/// One telemetry tick. Altitude and position may be missing
/// on any given record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub status: MissionStatus,
    pub altitude: Option<f64>,
    /// `(lat, lon)` in degrees.
    pub position: Option<(f64, f64)>,
}

impl Telemetry {
    pub fn new(status: MissionStatus) -> Self {
        Telemetry {
            status,
            altitude: None,
            position: None,
        }
    }

    pub fn with_fix(status: MissionStatus, altitude: f64, lat: f64, lon: f64) -> Self {
        Telemetry {
            status,
            altitude: Some(altitude),
            position: Some((lat, lon)),
        }
    }
}

/// Source of telemetry records. Transport concerns
/// (reconnects, retries) stay behind this trait.
pub trait TelemetryLink {
    /// The next record, or `None` if nothing new has arrived.
    fn poll(&mut self) -> Option<Telemetry>;

    /// Whether the link will never deliver another record.
    fn is_closed(&self) -> bool {
        false
    }
}

impl TelemetryLink for VecDeque<Telemetry> {
    fn poll(&mut self) -> Option<Telemetry> {
        self.pop_front()
    }

    fn is_closed(&self) -> bool {
        self.is_empty()
    }
}

/// Parse one `KEY:value;KEY:value` record.
///
/// `STAT` is required. A malformed `ALT` or `POS` is treated
/// as missing, and unknown keys are ignored.
pub fn parse_record(line: &str) -> Result<Telemetry> {
    lazy_static! {
        static ref POS: Regex =
            Regex::new(r"^\(?\s*([-+]?[0-9]*\.?[0-9]+)\s*,\s*([-+]?[0-9]*\.?[0-9]+)\s*\)?$").unwrap();
    }

    let mut status = None;
    let mut altitude = None;
    let mut position = None;

    for pair in line.trim().split(';').filter(|p| !p.trim().is_empty()) {
        let (key, value) = pair
            .split_once(':')
            .ok_or_else(|| anyhow!("malformed field `{}`", pair))?;
        let value = value.trim();
        match key.trim() {
            "STAT" => {
                let code: i32 = value
                    .parse()
                    .map_err(|_| anyhow!("malformed status `{}`", value))?;
                status = Some(MissionStatus::try_from(code)?);
            }
            "ALT" => altitude = value.parse::<f64>().ok().filter(|a| a.is_finite()),
            "POS" => {
                position = POS.captures(value).and_then(|c| {
                    let lat = c[1].parse::<f64>().ok()?;
                    let lon = c[2].parse::<f64>().ok()?;
                    Some((lat, lon))
                })
            }
            _ => {}
        }
    }

    Ok(Telemetry {
        status: status.ok_or_else(|| anyhow!("record without STAT: `{}`", line.trim()))?,
        altitude,
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_record() {
        let t = parse_record("STAT:1;ALT:52.5;POS:34.0001,-118.0002\n").unwrap();
        assert_eq!(t, Telemetry::with_fix(MissionStatus::OnTarget, 52.5, 34.0001, -118.0002));
    }

    #[test]
    fn parenthesized_position_and_any_order() {
        let t = parse_record("POS:(34.5, -118.25);STAT:0;GPS:x").unwrap();
        assert_eq!(t.status, MissionStatus::EnRoute);
        assert_eq!(t.position, Some((34.5, -118.25)));
        assert_eq!(t.altitude, None);
    }

    #[test]
    fn malformed_fields_become_missing() {
        let t = parse_record("STAT:1;ALT:high;POS:34").unwrap();
        assert_eq!(t, Telemetry::new(MissionStatus::OnTarget));
    }

    #[test]
    fn status_is_required_and_known() {
        assert!(parse_record("ALT:50;POS:1,2").is_err());
        assert!(parse_record("STAT:7").is_err());
        assert!(parse_record("STAT:1;garbage").is_err());
        assert_eq!(
            parse_record("STAT:-1").unwrap().status,
            MissionStatus::ReturningToBase
        );
    }

    #[test]
    fn status_codes_round_trip_through_serde() {
        let json = serde_json::to_string(&Telemetry::new(MissionStatus::ReturningToBase)).unwrap();
        assert!(json.contains("\"status\":-1"));
        let back: Telemetry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, MissionStatus::ReturningToBase);
    }
}
