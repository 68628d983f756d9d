// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::unreadable_literal)] // Large test constants
#![allow(clippy::cast_possible_wrap)] // Test conversions
#![allow(clippy::cast_possible_truncation)] // Test parameters

//! Time conversion properties over randomized instants.
//!
//! Instants are drawn between the ITS epoch and 2030 with a fixed seed so a
//! failure is reproducible.

use v2x_bus::time::{
    generation_delta_time_to_unix, its_time_to_unix, tai_to_unix, unix_to_generation_delta_time,
    unix_to_its_time, unix_to_tai, GENERATION_DELTA_TIME_MODULUS,
};

const ITS_EPOCH_NS: u64 = 1_072_915_200_000_000_000;
const YEAR_2030_NS: u64 = 1_893_456_000_000_000_000;
const SAMPLES: usize = 2_000;

fn random_ms_instant(rng: &mut fastrand::Rng) -> u64 {
    let ns = rng.u64(ITS_EPOCH_NS..YEAR_2030_NS);
    ns - ns % 1_000_000
}

#[test]
fn its_round_trip_on_millisecond_instants() {
    let mut rng = fastrand::Rng::with_seed(0x1751);
    for _ in 0..SAMPLES {
        let unix = random_ms_instant(&mut rng);
        let its = unix_to_its_time(unix);
        assert_eq!(its_time_to_unix(its), unix, "unix {} its {}", unix, its);
    }
}

#[test]
fn tai_round_trip_and_offset_range() {
    let mut rng = fastrand::Rng::with_seed(0x7a1);
    for _ in 0..SAMPLES {
        let unix = rng.u64(ITS_EPOCH_NS..YEAR_2030_NS);
        let tai = unix_to_tai(unix);
        let offset_s = (tai - unix) / 1_000_000_000;
        assert!((32..=37).contains(&offset_s), "offset {} at {}", offset_s, unix);
        assert_eq!(tai_to_unix(tai), unix);
    }
}

#[test]
fn its_time_is_monotonic() {
    let mut rng = fastrand::Rng::with_seed(42);
    let mut instants: Vec<u64> = (0..SAMPLES).map(|_| random_ms_instant(&mut rng)).collect();
    instants.sort_unstable();
    for pair in instants.windows(2) {
        assert!(unix_to_its_time(pair[0]) <= unix_to_its_time(pair[1]));
    }
}

#[test]
fn generation_delta_time_unwraps_near_reference() {
    let mut rng = fastrand::Rng::with_seed(0x6d7);
    for _ in 0..SAMPLES {
        let generated = random_ms_instant(&mut rng);
        // Receiver clock within +/- 30 s of the sender (room for one leap second)
        let skew_ms = rng.i64(-30_000..=30_000);
        let reference = (generated as i64 + skew_ms * 1_000_000) as u64;

        let gdt = unix_to_generation_delta_time(generated);
        assert_eq!(
            generation_delta_time_to_unix(gdt, reference),
            generated,
            "gdt {} skew {} ms",
            gdt,
            skew_ms
        );
    }
}

#[test]
fn generation_delta_time_across_the_wrap() {
    // Find an instant whose counter is just below the wrap
    let mut unix = 1_665_054_116_801_000_000;
    while unix_to_generation_delta_time(unix) != 65_530 {
        unix += 1_000_000;
    }
    let before_wrap = unix;
    let after_wrap = before_wrap + 10_000_000;
    assert_eq!(unix_to_generation_delta_time(after_wrap), 4);

    // Forward: sender just after the wrap, receiver still before it
    let gdt = unix_to_generation_delta_time(after_wrap);
    assert_eq!(generation_delta_time_to_unix(gdt, before_wrap), after_wrap);

    // Backward: sender before the wrap, receiver already past it
    let gdt = unix_to_generation_delta_time(before_wrap);
    assert_eq!(generation_delta_time_to_unix(gdt, after_wrap), before_wrap);
}

#[test]
fn generation_delta_time_stays_in_range() {
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..SAMPLES {
        let unix = rng.u64(ITS_EPOCH_NS..YEAR_2030_NS);
        let gdt = u64::from(unix_to_generation_delta_time(unix));
        assert_eq!(gdt, unix_to_its_time(unix) % GENERATION_DELTA_TIME_MODULUS);
    }
}
