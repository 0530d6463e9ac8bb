//! Throughput benchmarks

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;
use uartlink_core::core::codec::{format_hex, parse_hex};
use uartlink_core::core::protocol::{crc16_modbus, FrameParser, FrameShape};

fn checksum_benchmark(c: &mut Criterion) {
    let data: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();

    let mut group = c.benchmark_group("checksum");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("crc16_modbus_1k", |b| {
        b.iter(|| black_box(crc16_modbus(black_box(&data))))
    });

    group.finish();
}

fn frame_benchmark(c: &mut Criterion) {
    let shape = FrameShape::mcu();
    let payload = [0x10, 0x00, 0x0F, 0xA0];

    // 256 sensor reports back to back, fed in 64-byte chunks
    let stream: Vec<u8> = (0..256).flat_map(|_| shape.pack(&payload)).collect();

    let mut group = c.benchmark_group("frame");

    group.bench_function("pack", |b| {
        b.iter(|| black_box(shape.pack(black_box(&payload))))
    });

    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("parse_stream", |b| {
        let parser = FrameParser::new();
        b.iter(|| {
            let mut frames = 0;
            for chunk in stream.chunks(64) {
                frames += parser.feed(black_box(chunk)).len();
            }
            black_box(frames)
        })
    });

    group.finish();
}

fn hex_benchmark(c: &mut Criterion) {
    let data: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
    let text = format_hex(&data);

    let mut group = c.benchmark_group("hex");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("format", |b| b.iter(|| black_box(format_hex(black_box(&data)))));

    group.bench_function("parse", |b| {
        b.iter(|| black_box(parse_hex(black_box(&text)).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, checksum_benchmark, frame_benchmark, hex_benchmark);
criterion_main!(benches);
