// Physical quantities accepted at construction time.
//
// Everything inside the drivetrain works in plain SI f64 values; these types only
// exist so callers (and config files) state which unit they mean.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const METERS_PER_FOOT: f64 = 0.3048;
const METERS_PER_INCH: f64 = 0.0254;

/// Linear velocity, e.g. `{"meters_per_second": 4.5}` in a config file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearVelocity {
    MetersPerSecond(f64),
    FeetPerSecond(f64),
}

impl LinearVelocity {
    pub fn as_meters_per_second(&self) -> f64 {
        match *self {
            Self::MetersPerSecond(v) => v,
            Self::FeetPerSecond(v) => v * METERS_PER_FOOT,
        }
    }
}

/// Angular velocity, CCW positive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngularVelocity {
    RadiansPerSecond(f64),
    DegreesPerSecond(f64),
    RotationsPerSecond(f64),
}

impl AngularVelocity {
    pub fn as_radians_per_second(&self) -> f64 {
        match *self {
            Self::RadiansPerSecond(v) => v,
            Self::DegreesPerSecond(v) => v.to_radians(),
            Self::RotationsPerSecond(v) => v * 2.0 * PI,
        }
    }
}

/// Length, used for module placements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Length {
    Meters(f64),
    Inches(f64),
    Feet(f64),
}

impl Length {
    pub fn as_meters(&self) -> f64 {
        match *self {
            Self::Meters(v) => v,
            Self::Inches(v) => v * METERS_PER_INCH,
            Self::Feet(v) => v * METERS_PER_FOOT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_conversions() {
        assert_eq!(LinearVelocity::MetersPerSecond(4.5).as_meters_per_second(), 4.5);
        let fps = LinearVelocity::FeetPerSecond(10.0).as_meters_per_second();
        assert!((fps - 3.048).abs() < 1e-12);
    }

    #[test]
    fn test_angular_conversions() {
        let deg = AngularVelocity::DegreesPerSecond(180.0).as_radians_per_second();
        assert!((deg - PI).abs() < 1e-12);
        let rps = AngularVelocity::RotationsPerSecond(1.0).as_radians_per_second();
        assert!((rps - 2.0 * PI).abs() < 1e-12);
    }

    #[test]
    fn test_length_from_json() {
        let len: Length = serde_json::from_str(r#"{"inches": 10.865}"#).unwrap();
        assert!((len.as_meters() - 0.275971).abs() < 1e-6);
    }
}
