// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Leap second table (IERS Bulletin C, as distributed in `leap-seconds.list`).
//!
//! Each entry is the Unix second at which a new TAI-UTC offset takes effect,
//! i.e. the first second after the inserted leap second. Before 1972 the
//! offset is fixed at 10 s, matching the usual proleptic convention.

/// TAI-UTC offset (seconds) before the first table entry.
pub(crate) const BASE_OFFSET_S: i64 = 10;

/// (Unix second the offset applies from, TAI-UTC in seconds)
pub(crate) const LEAP_SECONDS: [(i64, i64); 28] = [
    (63_072_000, 10),    // 1972-01-01
    (78_796_800, 11),    // 1972-07-01
    (94_694_400, 12),    // 1973-01-01
    (126_230_400, 13),   // 1974-01-01
    (157_766_400, 14),   // 1975-01-01
    (189_302_400, 15),   // 1976-01-01
    (220_924_800, 16),   // 1977-01-01
    (252_460_800, 17),   // 1978-01-01
    (283_996_800, 18),   // 1979-01-01
    (315_532_800, 19),   // 1980-01-01
    (362_793_600, 20),   // 1981-07-01
    (394_329_600, 21),   // 1982-07-01
    (425_865_600, 22),   // 1983-07-01
    (489_024_000, 23),   // 1985-07-01
    (567_993_600, 24),   // 1988-01-01
    (631_152_000, 25),   // 1990-01-01
    (662_688_000, 26),   // 1991-01-01
    (709_948_800, 27),   // 1992-07-01
    (741_484_800, 28),   // 1993-07-01
    (773_020_800, 29),   // 1994-07-01
    (820_454_400, 30),   // 1996-01-01
    (867_715_200, 31),   // 1997-07-01
    (915_148_800, 32),   // 1999-01-01
    (1_136_073_600, 33), // 2006-01-01
    (1_230_768_000, 34), // 2009-01-01
    (1_341_100_800, 35), // 2012-07-01
    (1_435_708_800, 36), // 2015-07-01
    (1_483_228_800, 37), // 2017-01-01
];

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// TAI-UTC (seconds) in effect at the given Unix instant.
pub(crate) fn tai_utc_offset(unix_ns: i128) -> i64 {
    LEAP_SECONDS
        .iter()
        .rev()
        .find(|(since, _)| unix_ns >= i128::from(*since) * NANOS_PER_SEC)
        .map_or(BASE_OFFSET_S, |(_, offset)| *offset)
}

/// Map a leap-aware scale back to Unix time.
///
/// `scale_ns` must have been produced as `unix_ns + (tai_utc_offset(unix) - base) * 1e9`
/// (base 0 gives TAI, base 10 gives UTC counting leap seconds since 1970).
/// An instant inside an inserted leap second has no Unix representation and
/// maps to the last nanosecond before the insertion.
pub(crate) fn shifted_to_unix(scale_ns: i128, base: i64) -> i128 {
    let mut offset = BASE_OFFSET_S;
    let mut insertion: Option<i128> = None;

    for &(since, new_offset) in &LEAP_SECONDS {
        let since_ns = i128::from(since) * NANOS_PER_SEC;
        // The new offset is in force from `since` onwards, i.e. from this scale value.
        let effective = since_ns + i128::from(new_offset - base) * NANOS_PER_SEC;
        if scale_ns >= effective {
            offset = new_offset;
            continue;
        }
        // Inserted second: scale values in [since + old, since + new) have no Unix image.
        let start = since_ns + i128::from(offset - base) * NANOS_PER_SEC;
        if scale_ns >= start {
            insertion = Some(since_ns);
        }
        break;
    }

    match insertion {
        Some(since_ns) => since_ns - 1,
        None => scale_ns - i128::from(offset - base) * NANOS_PER_SEC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        for pair in LEAP_SECONDS.windows(2) {
            assert!(pair[0].0 < pair[1].0);
            assert!(pair[1].1 - pair[0].1 <= 1);
        }
    }

    #[test]
    fn test_offset_lookup() {
        assert_eq!(tai_utc_offset(0), 10);
        // 2004-01-01
        assert_eq!(tai_utc_offset(1_072_915_200 * NANOS_PER_SEC), 32);
        // 2022-10-06
        assert_eq!(tai_utc_offset(1_665_054_116_801_000_000), 37);
        // Offset switches exactly on the table boundary
        assert_eq!(tai_utc_offset(1_483_228_800 * NANOS_PER_SEC - 1), 36);
        assert_eq!(tai_utc_offset(1_483_228_800 * NANOS_PER_SEC), 37);
    }

    #[test]
    fn test_shifted_inverse() {
        let unix = 1_665_054_116_801_000_000_i128;
        let tai = unix + 37 * NANOS_PER_SEC;
        assert_eq!(shifted_to_unix(tai, 0), unix);
        let utc = unix + 27 * NANOS_PER_SEC;
        assert_eq!(shifted_to_unix(utc, BASE_OFFSET_S), unix);
    }

    #[test]
    fn test_leap_second_clamps() {
        let since = 1_483_228_800_i128 * NANOS_PER_SEC;
        // TAI instant half-way through the 2016-12-31T23:59:60 insertion
        let inside = since + 36 * NANOS_PER_SEC + NANOS_PER_SEC / 2;
        assert_eq!(shifted_to_unix(inside, 0), since - 1);
        // First TAI instant of 2017
        assert_eq!(shifted_to_unix(since + 37 * NANOS_PER_SEC, 0), since);
    }
}
