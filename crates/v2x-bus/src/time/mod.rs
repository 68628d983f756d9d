// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Time scale conversions used by ITS messages.
//!
//! - Unix time: nanoseconds since 1970-01-01 UTC, without leap seconds.
//! - ITS time: milliseconds since 2004-01-01T00:00:00 UTC, counting every
//!   leap second inserted since then (`TimestampIts`).
//! - TAI time: nanoseconds since the Unix epoch on the TAI scale, so that
//!   TAI - Unix equals the TAI-UTC offset in force (37 s since 2017).
//! - Generation delta time: the ITS time modulo 65536, a 16-bit wrapping
//!   millisecond counter that needs a nearby reference to be unwrapped.
//!
//! All functions are pure. Inputs are trusted: out-of-range values (e.g. Unix
//! instants before the ITS epoch) are not validated and wrap.

mod leap;

use std::time::{SystemTime, UNIX_EPOCH};

/// Modulus of the generation delta time counter.
pub const GENERATION_DELTA_TIME_MODULUS: u64 = 65_536;

/// 2004-01-01T00:00:00Z as Unix seconds.
pub const ITS_EPOCH_UNIX_S: i64 = 1_072_915_200;

/// TAI-UTC at the ITS epoch.
const ITS_EPOCH_TAI_UTC_S: i64 = 32;

const NANOS_PER_MILLI: i128 = 1_000_000;
const NANOS_PER_SEC: i128 = 1_000_000_000;
const HALF_MODULUS: i64 = (GENERATION_DELTA_TIME_MODULUS / 2) as i64;

/// Current wall-clock time as Unix nanoseconds.
pub fn now_unix_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Unix nanoseconds -> ITS milliseconds (leap-second aware).
///
/// Returns 0 at 2004-01-01T00:00:00Z. Sub-millisecond precision is truncated.
pub fn unix_to_its_time(unix_ns: u64) -> u64 {
    let unix = i128::from(unix_ns);
    let since_epoch_ns = unix - i128::from(ITS_EPOCH_UNIX_S) * NANOS_PER_SEC;
    let leaps = i128::from(leap::tai_utc_offset(unix) - ITS_EPOCH_TAI_UTC_S);
    let its_ms = since_epoch_ns / NANOS_PER_MILLI + leaps * 1_000;
    its_ms as u64
}

/// ITS milliseconds -> Unix nanoseconds. Exact inverse of [`unix_to_its_time`]
/// for millisecond-aligned instants.
pub fn its_time_to_unix(its_ms: u64) -> u64 {
    // UTC scale counting leap seconds since 1970 (the first 10 s are implicit)
    let epoch_utc_ns = (i128::from(ITS_EPOCH_UNIX_S)
        + i128::from(ITS_EPOCH_TAI_UTC_S - leap::BASE_OFFSET_S))
        * NANOS_PER_SEC;
    let utc_ns = epoch_utc_ns + i128::from(its_ms) * NANOS_PER_MILLI;
    leap::shifted_to_unix(utc_ns, leap::BASE_OFFSET_S) as u64
}

/// Unix nanoseconds -> TAI nanoseconds.
pub fn unix_to_tai(unix_ns: u64) -> u64 {
    let unix = i128::from(unix_ns);
    (unix + i128::from(leap::tai_utc_offset(unix)) * NANOS_PER_SEC) as u64
}

/// TAI nanoseconds -> Unix nanoseconds.
pub fn tai_to_unix(tai_ns: u64) -> u64 {
    leap::shifted_to_unix(i128::from(tai_ns), 0) as u64
}

/// Unix nanoseconds -> 16-bit generation delta time.
pub fn unix_to_generation_delta_time(unix_ns: u64) -> u16 {
    (unix_to_its_time(unix_ns) % GENERATION_DELTA_TIME_MODULUS) as u16
}

/// Unwrap a generation delta time against a reference instant.
///
/// Returns the unique Unix instant within [-32768, +32767] ms of
/// `reference_unix_ns` whose ITS time has `gdt` as its low 16 bits. Works
/// across the wrap of the 16-bit counter in both directions.
pub fn generation_delta_time_to_unix(gdt: u16, reference_unix_ns: u64) -> u64 {
    let reference_its = i128::from(unix_to_its_time(reference_unix_ns));
    let reference_gdt = unix_to_generation_delta_time(reference_unix_ns);
    let its = reference_its + i128::from(signed_gdt_distance(reference_gdt, gdt));
    its_time_to_unix(its as u64)
}

/// Signed distance `to - from` on the 16-bit ring, in [-32768, 32767].
fn signed_gdt_distance(from: u16, to: u16) -> i64 {
    let modulus = GENERATION_DELTA_TIME_MODULUS as i64;
    let forward = (i64::from(to) - i64::from(from)).rem_euclid(modulus);
    if forward >= HALF_MODULUS {
        forward - modulus
    } else {
        forward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITS_EPOCH_UNIX_NS: u64 = 1_072_915_200_000_000_000;

    #[test]
    fn test_its_epoch_is_zero() {
        assert_eq!(unix_to_its_time(ITS_EPOCH_UNIX_NS), 0);
        assert_eq!(its_time_to_unix(0), ITS_EPOCH_UNIX_NS);
    }

    #[test]
    fn test_its_example_value() {
        // 2007-01-01T00:00:00Z, one leap second (end of 2005) after the epoch
        assert_eq!(unix_to_its_time(1_167_609_600_000_000_000), 94_694_401_000);
    }

    #[test]
    fn test_signed_distance() {
        assert_eq!(signed_gdt_distance(0, 0), 0);
        assert_eq!(signed_gdt_distance(100, 110), 10);
        assert_eq!(signed_gdt_distance(110, 100), -10);
        assert_eq!(signed_gdt_distance(65_530, 5), 11);
        assert_eq!(signed_gdt_distance(5, 65_530), -11);
        assert_eq!(signed_gdt_distance(0, 32_767), 32_767);
        assert_eq!(signed_gdt_distance(0, 32_768), -32_768);
    }

    #[test]
    fn test_tai_offset() {
        let unix = 1_665_054_116_801_000_000;
        assert_eq!(unix_to_tai(unix) - unix, 37_000_000_000);
        assert_eq!(tai_to_unix(unix_to_tai(unix)), unix);
    }

    #[test]
    fn test_generation_delta_time_reference_values() {
        assert_eq!(unix_to_generation_delta_time(1_664_975_024_000_000_000), 2_824);
        assert_eq!(unix_to_generation_delta_time(1_663_039_020_000_000_000), 63_336);
        assert_eq!(unix_to_generation_delta_time(1_664_961_470_000_000_000), 14_776);
        assert_eq!(unix_to_generation_delta_time(1_665_054_116_801_000_000), 59_209);
    }
}
