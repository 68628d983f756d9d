// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//!
//! Benchmark: per-envelope costs on the receive path
//!
//! Time conversions, selector matching, validation + decode, and CPM
//! reassembly, isolated from the broker and threads.

#![allow(clippy::uninlined_format_args)]

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use v2x_bus::message::pdu::{Cam, Cpm, ItsMessage};
use v2x_bus::reassembly::{Insert, ReassemblyCache};
use v2x_bus::selector::Selector;
use v2x_bus::transceiver::validate;
use v2x_bus::{time, BincodeCodec, Envelope, MessageCodec, MessageType};

const NOW_NS: u64 = 1_665_054_116_801_000_000;

fn bench_time(c: &mut Criterion) {
    let mut group = c.benchmark_group("time");
    group.bench_function("unix_to_its_time", |b| {
        b.iter(|| time::unix_to_its_time(black_box(NOW_NS)))
    });
    group.bench_function("its_time_to_unix", |b| {
        let its = time::unix_to_its_time(NOW_NS);
        b.iter(|| time::its_time_to_unix(black_box(its)))
    });
    group.bench_function("gdt_unwrap", |b| {
        b.iter(|| time::generation_delta_time_to_unix(black_box(59_209), black_box(NOW_NS)))
    });
    group.finish();
}

fn bench_selector(c: &mut Criterion) {
    let envelope = Envelope::for_message(MessageType::Cpm, 101, Some(7), vec![0; 64]);
    let mut group = c.benchmark_group("selector");
    for expression in [
        "mid = 2049",
        "NOT(station_id = 101) AND mid = 2049",
        "subject LIKE 'c%' OR destination_station_id = 7",
    ] {
        let Ok(selector) = Selector::parse(expression) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::from_parameter(expression), &selector, |b, s| {
            b.iter(|| s.matches(black_box(&envelope)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let payload = BincodeCodec
        .encode(&ItsMessage::Cam(Cam::new(101, 2_824)))
        .unwrap_or_default();
    c.bench_function("validate_and_decode_cam", |b| {
        b.iter(|| {
            let envelope = Envelope::for_message(MessageType::Cam, 101, None, payload.clone());
            let meta = validate(envelope).ok()?;
            BincodeCodec.decode(meta.message_type, black_box(&meta.data)).ok()
        })
    });
}

fn bench_reassembly(c: &mut Criterion) {
    let reference = time::unix_to_its_time(NOW_NS);
    let mut group = c.benchmark_group("reassembly");
    for total in [1u8, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(total), &total, |b, &total| {
            b.iter(|| {
                let mut cache = ReassemblyCache::new(Duration::from_secs(60));
                let mut complete = 0;
                for index in (1..=total).rev() {
                    let cpm = Cpm::new(101, reference).with_segment(index, total);
                    if let Insert::Complete(_) = cache.insert(cpm) {
                        complete += 1;
                    }
                }
                black_box(complete)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_time, bench_selector, bench_decode, bench_reassembly);
criterion_main!(benches);
