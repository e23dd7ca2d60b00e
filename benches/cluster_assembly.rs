//! Benchmarks for cluster assembly
//!
//! Muxes synthetic video and audio packets into memory.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mkvmux_core::{
    BlockBlobMode, MemoryOutput, MuxConfig, MuxSession, Packet, SegmentSettings, TrackConfig,
    TrackType,
};

const MS: i64 = 1_000_000;

/// Video at 25 fps with a key frame every 12 frames, audio in 20ms frames.
fn packets(seconds: i64) -> Vec<Packet> {
    let mut packets = Vec::new();
    for frame in 0..seconds * 25 {
        let ts = frame * 40 * MS;
        let mut video = Packet::new(1, ts, vec![0u8; 4096]).with_duration(40 * MS);
        if frame % 12 != 0 {
            video = video.with_bref(ts - 40 * MS);
        }
        packets.push(video);
        packets.push(Packet::new(2, ts, vec![1u8; 160]).with_duration(20 * MS));
        packets.push(Packet::new(2, ts + 20 * MS, vec![1u8; 160]).with_duration(20 * MS));
    }
    packets
}

fn mux(config: &MuxConfig, packets: &[Packet]) -> usize {
    let output = MemoryOutput::new(SegmentSettings::for_config(config));
    let mut session = MuxSession::new(config.clone(), output).unwrap();
    session
        .register_track(TrackConfig::new(1, TrackType::Video, "V_VP9"))
        .unwrap();
    session
        .register_track(TrackConfig::new(2, TrackType::Audio, "A_OPUS"))
        .unwrap();
    for packet in packets {
        session.add_packet(packet.clone()).unwrap();
    }
    session.finish().unwrap();
    session.output().files().iter().map(Vec::len).sum()
}

fn bench_mux(c: &mut Criterion) {
    let mut group = c.benchmark_group("mux");

    for seconds in [10, 60] {
        let input = packets(seconds);
        group.bench_with_input(BenchmarkId::new("simple_auto", seconds), &input, |b, input| {
            b.iter(|| mux(black_box(&MuxConfig::default()), black_box(input)));
        });

        let no_simple = MuxConfig {
            block_mode: BlockBlobMode::NoSimple,
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::new("no_simple", seconds), &input, |b, input| {
            b.iter(|| mux(black_box(&no_simple), black_box(input)));
        });
    }

    group.finish();
}

fn bench_unlaced_audio(c: &mut Criterion) {
    let input = packets(30);
    let config = MuxConfig {
        lacing: false,
        ..Default::default()
    };
    c.bench_function("mux/unlaced_30s", |b| {
        b.iter(|| mux(black_box(&config), black_box(&input)));
    });
}

criterion_group!(benches, bench_mux, bench_unlaced_audio);
criterion_main!(benches);
