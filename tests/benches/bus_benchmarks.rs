//! # State Bus Benchmarks
//!
//! | Path | Target |
//! |------|--------|
//! | Settings encode + decode | < 10 µs |
//! | Cached read (Arc clone under lock) | < 1 µs |
//! | Publish → read, in-process | < 1 ms |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use state_bus::{
    BincodeCodec, BusConfig, BusContext, ChannelDescriptor, ChannelRegistry, Codec,
    InProcTransport, Maneuver, Message, MessageType, Publisher, Settings, SubscriberHub,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn settings(search_input: i64, maneuvers: usize) -> Settings {
    Settings {
        search_input,
        upcoming_turn: "right".to_string(),
        banner_instructions: "Turn right onto Main Street".to_string(),
        all_maneuvers: (0..maneuvers)
            .map(|i| Maneuver {
                distance: i as f64 * 25.0,
                kind: "turn".to_string(),
                modifier: "left".to_string(),
            })
            .collect(),
        ..Default::default()
    }
}

fn inproc_context() -> BusContext {
    BusContext::new(
        Arc::new(BincodeCodec::new()),
        Arc::new(InProcTransport::new()),
        BusConfig::default().with_poll_interval(Duration::from_millis(5)),
    )
}

// ============================================================================
// Codec
// ============================================================================

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let codec = BincodeCodec::new();

    for maneuvers in [0, 10, 100] {
        let message: Message = settings(42, maneuvers).into();
        let raw: Arc<[u8]> = codec.encode(&message).unwrap_or_default().into();

        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::new("encode", maneuvers), &message, |b, m| {
            b.iter(|| black_box(codec.encode(m).map(|bytes| bytes.len())))
        });
        group.bench_with_input(BenchmarkId::new("decode", maneuvers), &raw, |b, raw| {
            b.iter(|| {
                let handle = codec.decode(MessageType::Settings, raw.clone());
                black_box(handle.map(|h| h.release()).is_ok())
            })
        });
    }

    group.finish();
}

// ============================================================================
// Hub
// ============================================================================

fn bench_hub(c: &mut Criterion) {
    let mut group = c.benchmark_group("hub");

    let registry = match ChannelRegistry::from_descriptors([ChannelDescriptor::new(
        "nav",
        "127.0.0.1:9201",
        MessageType::Settings,
        0.01,
    )]) {
        Ok(registry) => registry,
        Err(e) => panic!("benchmark registry: {e}"),
    };
    let context = inproc_context();
    let (Ok(mut publisher), Ok(hub)) = (
        Publisher::open_with("nav", &registry, &context),
        SubscriberHub::open_with(["nav"], &registry, &context),
    ) else {
        panic!("failed to open benchmark channel");
    };

    let mut next = 0i64;
    group.bench_function("publish_to_read", |b| {
        b.iter(|| {
            next += 1;
            let _ = publisher.publish(settings(next, 0));
            let deadline = Instant::now() + Duration::from_secs(1);
            while Instant::now() < deadline {
                let latest = hub
                    .read("nav")
                    .ok()
                    .flatten()
                    .and_then(|view| view.as_settings().map(|s| s.search_input));
                if latest == Some(next) {
                    break;
                }
            }
        })
    });

    group.bench_function("cached_read", |b| {
        let _ = publisher.publish(settings(-1, 0));
        b.iter(|| black_box(hub.read("nav").ok().flatten().is_some()))
    });

    group.finish();
}

criterion_group!(benches, bench_codec, bench_hub);
criterion_main!(benches);
