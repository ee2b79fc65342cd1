//! Benchmarks for payload encoding on the pacing path
//!
//! Every tick rebuilds one payload. At 120 fps with 512-channel payloads the
//! encode step has a budget of several milliseconds; these benchmarks check
//! it stays in the sub-microsecond range:
//! - Fresh allocation per frame (`encode_frame`)
//! - Buffer reuse (`write_frame`), which is what the pacing task does
//! - Counter extraction on the receive side (`decode_frame`)

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use frame_conductor::types::{FRAME_BYTES, decode_frame, encode_frame, write_frame};
use std::hint::black_box;

const PAYLOAD_LENGTHS: [usize; 3] = [24, 128, 512];

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");

    for length in PAYLOAD_LENGTHS {
        group.throughput(Throughput::Bytes(length as u64));
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, &length| {
            let mut frame = 0u16;
            b.iter(|| {
                frame = frame.wrapping_add(1);
                black_box(encode_frame(black_box(frame), length))
            });
        });
    }

    group.finish();
}

fn bench_reuse(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_frame_reused_buffer");

    for length in PAYLOAD_LENGTHS {
        group.throughput(Throughput::Bytes(length as u64));
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, &length| {
            let mut payload = Vec::with_capacity(length);
            let mut frame = 0u16;
            b.iter(|| {
                frame = frame.wrapping_add(1);
                payload.clear();
                payload.resize(length.max(FRAME_BYTES), 0);
                write_frame(&mut payload, black_box(frame));
                black_box(&payload);
            });
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let payload = encode_frame(54321, 512);

    c.bench_function("decode_frame", |b| {
        b.iter(|| black_box(decode_frame(black_box(&payload))));
    });
}

criterion_group!(benches, bench_encode, bench_reuse, bench_decode);
criterion_main!(benches);
