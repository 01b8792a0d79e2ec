//! # Derived Metrics Module
//!
//! Secondary quantities computed once per cycle from the primary readings.
//!
//! Each metric is derived independently: a missing or invalid input turns
//! only the metrics that depend on it into [`MetricValue::Error`].

pub mod heuristics;

use std::fmt;

use crate::obd::protocol::{Measurement, ParameterId, Reading};

/// Kinds of derived metric, in log column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    FuelConsumption,
    GearPosition,
    BrakeStatus,
    SteeringAngle,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::FuelConsumption,
        MetricKind::GearPosition,
        MetricKind::BrakeStatus,
        MetricKind::SteeringAngle,
    ];

    /// Log column name
    pub fn column(&self) -> &'static str {
        match self {
            MetricKind::FuelConsumption => "Fuel Consumption (L/100km)",
            MetricKind::GearPosition => "Gear Position",
            MetricKind::BrakeStatus => "Brake Status",
            MetricKind::SteeringAngle => "Steering Angle",
        }
    }

    /// Whether the metric is a synthetic estimate rather than a physical derivation
    pub fn is_heuristic(&self) -> bool {
        !matches!(self, MetricKind::FuelConsumption)
    }
}

/// Brake status estimated from vehicle speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrakeStatus {
    Engaged,
    NotEngaged,
}

impl fmt::Display for BrakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrakeStatus::Engaged => f.write_str("Engaged"),
            BrakeStatus::NotEngaged => f.write_str("Not Engaged"),
        }
    }
}

/// Value of a derived metric, or the error sentinel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Gear(u8),
    Brake(BrakeStatus),
    Error,
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(v) => write!(f, "{:.2}", v),
            MetricValue::Gear(g) => write!(f, "{}", g),
            MetricValue::Brake(b) => write!(f, "{}", b),
            MetricValue::Error => f.write_str(Reading::ERROR_TEXT),
        }
    }
}

/// One derived metric for one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedMetric {
    pub kind: MetricKind,
    pub value: MetricValue,
}

/// Primary readings a cycle derives from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimaryReadings {
    pub speed: Reading,
    pub rpm: Reading,
    pub engine_load: Reading,
    pub maf: Reading,
}

impl Default for PrimaryReadings {
    fn default() -> Self {
        Self {
            speed: Reading::DecodeError,
            rpm: Reading::DecodeError,
            engine_load: Reading::DecodeError,
            maf: Reading::DecodeError,
        }
    }
}

impl PrimaryReadings {
    /// Collect readings from measurements; absent parameters stay as errors
    pub fn from_measurements<'a>(measurements: impl IntoIterator<Item = &'a Measurement>) -> Self {
        let mut readings = Self::default();
        for m in measurements {
            *readings.slot(m.parameter) = m.value;
        }
        readings
    }

    /// Reading for `parameter`
    pub fn get(&self, parameter: ParameterId) -> Reading {
        match parameter {
            ParameterId::VehicleSpeed => self.speed,
            ParameterId::EngineRpm => self.rpm,
            ParameterId::EngineLoad => self.engine_load,
            ParameterId::MassAirFlow => self.maf,
        }
    }

    fn slot(&mut self, parameter: ParameterId) -> &mut Reading {
        match parameter {
            ParameterId::VehicleSpeed => &mut self.speed,
            ParameterId::EngineRpm => &mut self.rpm,
            ParameterId::EngineLoad => &mut self.engine_load,
            ParameterId::MassAirFlow => &mut self.maf,
        }
    }
}

/// Compute all derived metrics, in [`MetricKind::ALL`] order
pub fn derive(readings: &PrimaryReadings) -> [DerivedMetric; 4] {
    MetricKind::ALL.map(|kind| DerivedMetric {
        kind,
        value: derive_one(kind, readings),
    })
}

fn derive_one(kind: MetricKind, r: &PrimaryReadings) -> MetricValue {
    match kind {
        MetricKind::FuelConsumption => heuristics::fuel_consumption(r.maf, r.speed),
        MetricKind::GearPosition => heuristics::gear_position(r.rpm, r.speed),
        MetricKind::BrakeStatus => heuristics::brake_status(r.speed),
        MetricKind::SteeringAngle => heuristics::steering_angle(r.speed, r.engine_load, r.rpm),
    }
}
