//! # Derived Metric Formulas
//!
//! Pure functions computing secondary quantities from primary readings.
//!
//! Only fuel consumption has a physical basis. Gear position, brake status
//! and steering angle are heuristics computed from speed, RPM and load;
//! they are not sensor data and must not be treated as ground truth.

use super::{BrakeStatus, MetricValue};
use crate::obd::protocol::Reading;

/// Stoichiometric air-fuel ratio for gasoline
pub const STOICHIOMETRIC_AFR: f64 = 14.7;

/// Gasoline density in g/L
pub const GASOLINE_DENSITY_G_PER_L: f64 = 720.0;

/// Speeds below this (km/h) count as stationary
pub const BRAKE_ENGAGED_BELOW_KMH: f64 = 1.0;

/// Upper ratio bounds for gears 5, 4, 3 and 2; anything above is gear 1
const GEAR_RATIO_THRESHOLDS: [(f64, u8); 4] = [(0.5, 5), (1.0, 4), (1.5, 3), (2.0, 2)];

/// Fuel consumption in L/100 km from MAF (g/s) and speed (km/h)
///
/// ```text
/// fuel_rate (L/h) = (maf / 14.7) / 720 × 3600
/// consumption     = fuel_rate / max(1, speed) × 100
/// ```
pub fn fuel_consumption(maf: Reading, speed: Reading) -> MetricValue {
    match (maf.value(), speed.value()) {
        (Some(maf), Some(speed)) => {
            let fuel_rate_l_per_h = (maf / STOICHIOMETRIC_AFR) / GASOLINE_DENSITY_G_PER_L * 3600.0;
            number(fuel_rate_l_per_h / speed.max(1.0) * 100.0)
        }
        _ => MetricValue::Error,
    }
}

/// Heuristic gear (1-5) from the ratio of kRPM to speed
pub fn gear_position(rpm: Reading, speed: Reading) -> MetricValue {
    let (Some(rpm), Some(speed)) = (rpm.value(), speed.value()) else {
        return MetricValue::Error;
    };

    let ratio = (rpm / 1000.0) / speed.max(1.0);
    if !ratio.is_finite() {
        return MetricValue::Error;
    }

    let gear = GEAR_RATIO_THRESHOLDS
        .iter()
        .find(|(bound, _)| ratio < *bound)
        .map(|&(_, gear)| gear)
        .unwrap_or(1);

    MetricValue::Gear(gear)
}

/// Brake status: engaged when the vehicle is below 1 km/h
pub fn brake_status(speed: Reading) -> MetricValue {
    match speed.value() {
        Some(speed) if speed < BRAKE_ENGAGED_BELOW_KMH => MetricValue::Brake(BrakeStatus::Engaged),
        Some(_) => MetricValue::Brake(BrakeStatus::NotEngaged),
        None => MetricValue::Error,
    }
}

/// Synthetic steering signal: `(sin(speed/100) + load/100) × (rpm/1000)`
pub fn steering_angle(speed: Reading, engine_load: Reading, rpm: Reading) -> MetricValue {
    match (speed.value(), engine_load.value(), rpm.value()) {
        (Some(speed), Some(load), Some(rpm)) => number(((speed / 100.0).sin() + load / 100.0) * (rpm / 1000.0)),
        _ => MetricValue::Error,
    }
}

fn number(value: f64) -> MetricValue {
    if value.is_finite() {
        MetricValue::Number(value)
    } else {
        MetricValue::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(value: MetricValue, expected: f64) {
        match value {
            MetricValue::Number(v) => assert!((v - expected).abs() < 1e-6, "{} != {}", v, expected),
            other => panic!("Expected number, got {:?}", other),
        }
    }

    #[test]
    fn test_fuel_consumption() {
        // (4.0 / 14.7) / 720 * 3600 = 1.3605 L/h; / 26 km/h * 100
        let expected = (4.0 / 14.7) / 720.0 * 3600.0 / 26.0 * 100.0;
        approx(fuel_consumption(Reading::Value(4.0), Reading::Value(26.0)), expected);
        match fuel_consumption(Reading::Value(4.0), Reading::Value(26.0)) {
            MetricValue::Number(v) => assert!((v - 5.233).abs() < 1e-3),
            other => panic!("Expected number, got {:?}", other),
        }
    }

    #[test]
    fn test_fuel_consumption_stationary_uses_unit_speed() {
        let expected = (4.0 / 14.7) / 720.0 * 3600.0 * 100.0;
        approx(fuel_consumption(Reading::Value(4.0), Reading::Value(0.0)), expected);
    }

    #[test]
    fn test_fuel_consumption_missing_input() {
        assert_eq!(fuel_consumption(Reading::DecodeError, Reading::Value(26.0)), MetricValue::Error);
        assert_eq!(fuel_consumption(Reading::Value(4.0), Reading::DecodeError), MetricValue::Error);
        assert_eq!(fuel_consumption(Reading::Value(f64::NAN), Reading::Value(26.0)), MetricValue::Error);
    }

    #[test]
    fn test_gear_thresholds() {
        let gear = |rpm: f64, speed: f64| gear_position(Reading::Value(rpm), Reading::Value(speed));
        assert_eq!(gear(2000.0, 100.0), MetricValue::Gear(5)); // 0.02
        assert_eq!(gear(2000.0, 4.0), MetricValue::Gear(4)); // 0.5
        assert_eq!(gear(2000.0, 2.0), MetricValue::Gear(3)); // 1.0
        assert_eq!(gear(3000.0, 2.0), MetricValue::Gear(2)); // 1.5
        assert_eq!(gear(4000.0, 2.0), MetricValue::Gear(1)); // 2.0
    }

    #[test]
    fn test_gear_stationary_no_divide_by_zero() {
        // max(1, 0) = 1 -> ratio = 0.8
        assert_eq!(gear_position(Reading::Value(800.0), Reading::Value(0.0)), MetricValue::Gear(4));
        assert_eq!(gear_position(Reading::Value(0.0), Reading::Value(0.0)), MetricValue::Gear(5));
    }

    #[test]
    fn test_gear_missing_input() {
        assert_eq!(gear_position(Reading::DecodeError, Reading::Value(10.0)), MetricValue::Error);
    }

    #[test]
    fn test_brake_status() {
        assert_eq!(brake_status(Reading::Value(0.0)), MetricValue::Brake(BrakeStatus::Engaged));
        assert_eq!(brake_status(Reading::Value(0.5)), MetricValue::Brake(BrakeStatus::Engaged));
        assert_eq!(brake_status(Reading::Value(1.0)), MetricValue::Brake(BrakeStatus::NotEngaged));
        assert_eq!(brake_status(Reading::DecodeError), MetricValue::Error);
    }

    #[test]
    fn test_steering_angle() {
        let expected = ((26.0f64 / 100.0).sin() + 50.0 / 100.0) * (3000.0 / 1000.0);
        approx(
            steering_angle(Reading::Value(26.0), Reading::Value(50.0), Reading::Value(3000.0)),
            expected,
        );
        approx(steering_angle(Reading::Value(0.0), Reading::Value(0.0), Reading::Value(3000.0)), 0.0);
    }

    #[test]
    fn test_steering_angle_missing_input() {
        assert_eq!(
            steering_angle(Reading::Value(26.0), Reading::DecodeError, Reading::Value(3000.0)),
            MetricValue::Error
        );
    }
}
