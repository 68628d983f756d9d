// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Physical-value quantization for ITS data elements.
//!
//! ETSI data elements carry scaled integers plus a 95 % confidence value.
//! These helpers convert between SI values / standard deviations and the
//! scaled representation. Everything here is a pure function over explicit
//! inputs; the bucket tables are `const`.

use std::f64::consts::PI;

/// Two-sided 95 % quantile of the normal distribution.
pub const CONFIDENCE_95: f64 = 1.96;

/// WGS84 angle resolution (0.1 degree).
pub const WGS84_ANGLE_UNIT_DEG: f64 = 0.1;
/// `Wgs84AngleValue` for true north.
pub const WGS84_ANGLE_NORTH: i64 = 0;
/// `Wgs84AngleValue` for east.
pub const WGS84_ANGLE_EAST: i64 = 900;
/// `Wgs84AngleValue` reserved upper bound.
pub const WGS84_ANGLE_DO_NOT_USE: i64 = 3600;

/// Scale and clamp a physical value: `clamp(round(value / unit), min, max)`.
pub fn encode_value(value: f64, unit: f64, min: i64, max: i64) -> i64 {
    clamp_rounded(value / unit, min, max)
}

/// Encode a standard deviation as a 95 % confidence value in `[0, out_of_range]`.
pub fn encode_confidence_from_std_dev(std_dev: f64, unit: f64, out_of_range: i64) -> i64 {
    clamp_rounded(std_dev / unit * CONFIDENCE_95, 0, out_of_range)
}

/// Decode a 95 % confidence value into a variance in the unit's base quantity.
pub fn decode_confidence(confidence: i64, unit: f64) -> f64 {
    (confidence as f64 * unit / CONFIDENCE_95).powi(2)
}

/// Decode a 95 % angular confidence given in `unit_deg` into a variance in rad².
pub fn decode_confidence_angle(confidence: i64, unit_deg: f64) -> f64 {
    (confidence as f64 * unit_deg / CONFIDENCE_95 * PI / 180.0).powi(2)
}

/// Yaw angle (rad, 0 = east, counter-clockwise) -> `Wgs84AngleValue`
/// (0.1 deg, 0 = north, clockwise).
pub fn encode_wgs84_angle(angle_rad: f64) -> i64 {
    let mut degrees =
        (WGS84_ANGLE_EAST as f64 * WGS84_ANGLE_UNIT_DEG - angle_rad.to_degrees()) % 360.0;
    if degrees < 0.0 {
        degrees += 360.0;
    }
    encode_value(
        degrees,
        WGS84_ANGLE_UNIT_DEG,
        WGS84_ANGLE_NORTH,
        WGS84_ANGLE_DO_NOT_USE,
    )
}

/// `Wgs84AngleValue` -> yaw angle (rad, 0 = east, counter-clockwise).
pub fn decode_wgs84_angle(value: i64) -> f64 {
    (-((value - WGS84_ANGLE_EAST) as f64) * WGS84_ANGLE_UNIT_DEG).to_radians()
}

fn clamp_rounded(scaled: f64, min: i64, max: i64) -> i64 {
    if scaled.is_nan() {
        return max;
    }
    // `as` saturates for out-of-range floats
    (scaled.round() as i64).clamp(min, max)
}

/// Standard deviation (rad/s) -> 95 % confidence in deg/s.
fn confidence_deg_per_s(std_dev_rad: f64) -> f64 {
    std_dev_rad * CONFIDENCE_95 * 180.0 / PI
}

/// `AngularSpeedConfidence` buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AngularSpeedConfidence {
    DegSec01 = 0,
    DegSec02 = 1,
    DegSec05 = 2,
    DegSec10 = 3,
    DegSec20 = 4,
    DegSec50 = 5,
    OutOfRange = 6,
    Unavailable = 7,
}

impl AngularSpeedConfidence {
    const BUCKETS: [(f64, Self); 6] = [
        (1.0, Self::DegSec01),
        (2.0, Self::DegSec02),
        (5.0, Self::DegSec05),
        (10.0, Self::DegSec10),
        (20.0, Self::DegSec20),
        (50.0, Self::DegSec50),
    ];

    /// Smallest bucket whose bound exceeds the 95 % confidence of `std_dev_rad`.
    pub fn from_std_dev(std_dev_rad: f64) -> Self {
        let conf = confidence_deg_per_s(std_dev_rad);
        Self::BUCKETS
            .iter()
            .find(|(bound, _)| conf < *bound)
            .map_or(Self::OutOfRange, |(_, bucket)| *bucket)
    }

    /// Standard deviation (rad/s) at the bucket bound. Out-of-range and
    /// unavailable map to the widest bucket.
    pub fn to_std_dev(self) -> f64 {
        let bound = Self::BUCKETS
            .iter()
            .find(|(_, bucket)| *bucket == self)
            .map_or(50.0, |(bound, _)| *bound);
        bound / confidence_deg_per_s(1.0)
    }
}

/// `YawRateConfidence` buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum YawRateConfidence {
    DegSec000_01 = 0,
    DegSec000_05 = 1,
    DegSec000_10 = 2,
    DegSec001_00 = 3,
    DegSec005_00 = 4,
    DegSec010_00 = 5,
    DegSec100_00 = 6,
    OutOfRange = 7,
    Unavailable = 8,
}

impl YawRateConfidence {
    const BUCKETS: [(f64, Self); 7] = [
        (0.01, Self::DegSec000_01),
        (0.05, Self::DegSec000_05),
        (0.1, Self::DegSec000_10),
        (1.0, Self::DegSec001_00),
        (5.0, Self::DegSec005_00),
        (10.0, Self::DegSec010_00),
        (100.0, Self::DegSec100_00),
    ];

    /// Smallest bucket whose bound exceeds the 95 % confidence of `std_dev_rad`.
    pub fn from_std_dev(std_dev_rad: f64) -> Self {
        let conf = confidence_deg_per_s(std_dev_rad);
        Self::BUCKETS
            .iter()
            .find(|(bound, _)| conf < *bound)
            .map_or(Self::OutOfRange, |(_, bucket)| *bucket)
    }

    /// Standard deviation (rad/s) at the bucket bound.
    pub fn to_std_dev(self) -> f64 {
        let bound = Self::BUCKETS
            .iter()
            .find(|(_, bucket)| *bucket == self)
            .map_or(100.0, |(bound, _)| *bound);
        bound / confidence_deg_per_s(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_encode_value_rounds_and_clamps() {
        assert_eq!(encode_value(1.0, 0.01, 0, 16_383), 100);
        assert_eq!(encode_value(0.014, 0.01, 0, 16_383), 1);
        assert_eq!(encode_value(500.0, 0.01, 0, 16_383), 16_383);
        assert_eq!(encode_value(-3.0, 0.1, -160, 161), -30);
        assert_eq!(encode_value(-300.0, 0.1, -160, 161), -160);
    }

    #[test]
    fn test_confidence_roundtrip() {
        let std_dev = 1.0;
        let conf = encode_confidence_from_std_dev(std_dev, 0.01, 126);
        assert_eq!(conf, 126); // 1.96 m > 1.26 m saturates

        let conf = encode_confidence_from_std_dev(0.5, 0.01, 4095);
        assert_eq!(conf, 98);
        let variance = decode_confidence(conf, 0.01);
        assert!((variance - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_wgs84_angle() {
        // Facing east
        assert_eq!(encode_wgs84_angle(0.0), 900);
        // Facing north
        assert_eq!(encode_wgs84_angle(PI / 2.0), 0);
        // Facing south
        assert_eq!(encode_wgs84_angle(-PI / 2.0), 1800);
        // Facing west
        assert_eq!(encode_wgs84_angle(PI), 2700);

        assert!((decode_wgs84_angle(900) - 0.0).abs() < EPS);
        assert!((decode_wgs84_angle(0) - PI / 2.0).abs() < EPS);
        assert!((decode_wgs84_angle(2700) + PI).abs() < EPS);
    }

    #[test]
    fn test_angular_speed_buckets() {
        let one_deg = 1.0_f64.to_radians() / CONFIDENCE_95;
        assert_eq!(
            AngularSpeedConfidence::from_std_dev(0.5 * one_deg),
            AngularSpeedConfidence::DegSec01
        );
        assert_eq!(
            AngularSpeedConfidence::from_std_dev(3.0 * one_deg),
            AngularSpeedConfidence::DegSec05
        );
        assert_eq!(
            AngularSpeedConfidence::from_std_dev(80.0 * one_deg),
            AngularSpeedConfidence::OutOfRange
        );
        assert!((AngularSpeedConfidence::DegSec10.to_std_dev() - 10.0 * one_deg).abs() < EPS);
        assert!((AngularSpeedConfidence::Unavailable.to_std_dev() - 50.0 * one_deg).abs() < EPS);
    }

    #[test]
    fn test_yaw_rate_buckets() {
        let one_deg = 1.0_f64.to_radians() / CONFIDENCE_95;
        assert_eq!(
            YawRateConfidence::from_std_dev(0.001 * one_deg),
            YawRateConfidence::DegSec000_01
        );
        assert_eq!(
            YawRateConfidence::from_std_dev(0.5 * one_deg),
            YawRateConfidence::DegSec001_00
        );
        assert_eq!(
            YawRateConfidence::from_std_dev(200.0 * one_deg),
            YawRateConfidence::OutOfRange
        );
        assert!((YawRateConfidence::OutOfRange.to_std_dev() - 100.0 * one_deg).abs() < EPS);
    }
}
