//! # OBD-II Protocol Constants and Types
//!
//! Core definitions shared by the telegram encoder and decoder.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ObdLoggerError, Result};

/// Service 01: show current data
pub const SERVICE_CURRENT_DATA: u8 = 0x01;

/// Positive responses echo the service id plus 0x40 (service 01 -> "41")
pub const SERVICE_RESPONSE_OFFSET: u8 = 0x40;

/// Response data begins at byte 2, after the service and PID echo bytes
pub const RESPONSE_DATA_BYTE_OFFSET: usize = 2;

/// Character index of the first data byte in a hex response
pub const RESPONSE_DATA_OFFSET: usize = RESPONSE_DATA_BYTE_OFFSET * 2;

/// Service 01 parameters this logger knows how to request and decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ParameterId {
    /// Calculated engine load (0x04)
    EngineLoad = 0x04,
    /// Engine RPM (0x0C)
    EngineRpm = 0x0C,
    /// Vehicle speed (0x0D)
    VehicleSpeed = 0x0D,
    /// Mass air flow rate (0x10)
    MassAirFlow = 0x10,
}

impl ParameterId {
    /// All supported parameters in log column order
    pub const ALL: [ParameterId; 4] = [
        ParameterId::VehicleSpeed,
        ParameterId::EngineRpm,
        ParameterId::EngineLoad,
        ParameterId::MassAirFlow,
    ];

    /// PID code byte
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Look up a parameter by its PID code
    pub fn from_code(code: u8) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.code() == code)
            .ok_or_else(|| ObdLoggerError::UnsupportedParameter(format!("PID 0x{:02X}", code)))
    }

    /// Configuration name (`speed`, `rpm`, `engine_load`, `maf`)
    pub fn name(&self) -> &'static str {
        match self {
            ParameterId::VehicleSpeed => "speed",
            ParameterId::EngineRpm => "rpm",
            ParameterId::EngineLoad => "engine_load",
            ParameterId::MassAirFlow => "maf",
        }
    }

    /// Unit implied by the parameter
    pub fn unit(&self) -> Unit {
        match self {
            ParameterId::VehicleSpeed => Unit::KilometersPerHour,
            ParameterId::EngineRpm => Unit::RevolutionsPerMinute,
            ParameterId::EngineLoad => Unit::Percent,
            ParameterId::MassAirFlow => Unit::GramsPerSecond,
        }
    }

    /// Minimum response length in hex characters
    pub fn min_response_len(&self) -> usize {
        match self {
            ParameterId::MassAirFlow => 8,
            _ => 6,
        }
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParameterId {
    type Err = ObdLoggerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ObdLoggerError::UnsupportedParameter(s.to_string()))
    }
}

/// Measurement units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    KilometersPerHour,
    RevolutionsPerMinute,
    Percent,
    GramsPerSecond,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::KilometersPerHour => "km/h",
            Unit::RevolutionsPerMinute => "rpm",
            Unit::Percent => "%",
            Unit::GramsPerSecond => "g/s",
        }
    }
}

/// A decoded numeric value, or the sentinel marking a failed decode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    Value(f64),
    DecodeError,
}

impl Reading {
    /// Text written in place of a value that failed to decode
    pub const ERROR_TEXT: &'static str = "ERROR";

    /// Numeric value, if finite
    pub fn value(&self) -> Option<f64> {
        match *self {
            Reading::Value(v) if v.is_finite() => Some(v),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.value().is_none()
    }
}

/// Two decimals, matching the derived metric columns
impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Some(v) => write!(f, "{:.2}", v),
            None => f.write_str(Self::ERROR_TEXT),
        }
    }
}

/// One decoded response for one parameter in one acquisition cycle.
///
/// Measurements are never updated in place; the next cycle's measurement
/// for the same parameter replaces this one in the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub parameter: ParameterId,
    /// Normalized response text the value was taken from
    pub raw_text: String,
    pub value: Reading,
}

impl Measurement {
    pub fn new(parameter: ParameterId, raw_text: impl Into<String>, value: Reading) -> Self {
        Self {
            parameter,
            raw_text: raw_text.into(),
            value,
        }
    }

    /// Measurement carrying the decode error sentinel
    pub fn decode_error(parameter: ParameterId, raw_text: impl Into<String>) -> Self {
        Self::new(parameter, raw_text, Reading::DecodeError)
    }

    pub fn unit(&self) -> Unit {
        self.parameter.unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_codes() {
        assert_eq!(ParameterId::EngineLoad.code(), 0x04);
        assert_eq!(ParameterId::EngineRpm.code(), 0x0C);
        assert_eq!(ParameterId::VehicleSpeed.code(), 0x0D);
        assert_eq!(ParameterId::MassAirFlow.code(), 0x10);
    }

    #[test]
    fn test_from_code() {
        assert_eq!(ParameterId::from_code(0x0D).unwrap(), ParameterId::VehicleSpeed);
        assert!(matches!(
            ParameterId::from_code(0x05),
            Err(ObdLoggerError::UnsupportedParameter(_))
        ));
    }

    #[test]
    fn test_from_str() {
        assert_eq!("speed".parse::<ParameterId>().unwrap(), ParameterId::VehicleSpeed);
        assert_eq!("MAF".parse::<ParameterId>().unwrap(), ParameterId::MassAirFlow);
        assert_eq!(" engine_load ".parse::<ParameterId>().unwrap(), ParameterId::EngineLoad);
        assert!("coolant".parse::<ParameterId>().is_err());
    }

    #[test]
    fn test_units() {
        assert_eq!(ParameterId::VehicleSpeed.unit().symbol(), "km/h");
        assert_eq!(ParameterId::MassAirFlow.unit().symbol(), "g/s");
        assert_eq!(ParameterId::EngineLoad.unit().symbol(), "%");
    }

    #[test]
    fn test_reading_display() {
        assert_eq!(Reading::Value(26.0).to_string(), "26.00");
        assert_eq!(Reading::Value(4.0).to_string(), "4.00");
        assert_eq!(Reading::Value(128.0 * 100.0 / 255.0).to_string(), "50.20");
        assert_eq!(Reading::DecodeError.to_string(), "ERROR");
        assert_eq!(Reading::Value(f64::NAN).to_string(), "ERROR");
    }

    #[test]
    fn test_reading_non_finite_is_error() {
        assert!(Reading::Value(f64::INFINITY).is_error());
        assert!(!Reading::Value(0.0).is_error());
    }
}
