//! Performance benchmarks for mcbridge
//!
//! Tracks the cost of the hot paths: heap pushes and pops, admission,
//! payload validation, filter chains and end-to-end processing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mcbridge::prelude::*;
use mcbridge::testing::EventBuilder;
use mcbridge::{
    EventRegistry, FilterChain, PayloadValidator, PriorityFilter, PriorityHeap, SourceFilter,
    StateValidator,
};
use std::sync::Arc;
use tokio::time::Instant;

fn benchmark_priority_heap(c: &mut Criterion) {
    let mut group = c.benchmark_group("priority_heap");

    for event_count in [100, 1000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::new("push_pop", event_count),
            event_count,
            |b, &event_count| {
                b.iter(|| {
                    let mut heap = PriorityHeap::with_capacity(event_count);
                    let now = Instant::now();
                    for i in 0..event_count {
                        let _ = heap.push(i, Priority::new((i % 100) as i32), now);
                    }
                    while let Some(item) = heap.pop() {
                        black_box(item);
                    }
                });
            },
        );
    }

    group.finish();
}

fn benchmark_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue");

    for event_count in [100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("chat_events", event_count),
            event_count,
            |b, &event_count| {
                let events: Vec<InboundEvent> = (0..event_count)
                    .map(|_| EventBuilder::chat("alex", "hello").build())
                    .collect();
                b.iter(|| {
                    let queue = EventQueue::builder().build();
                    for event in &events {
                        black_box(queue.enqueue(event.clone()));
                    }
                });
            },
        );
    }

    group.finish();
}

fn benchmark_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload_validation");
    let validator = PayloadValidator::new(Arc::new(EventRegistry::with_defaults()));

    let cases = [
        ("spawn", EventBuilder::spawn().build()),
        ("chat", EventBuilder::chat("alex", "hello").build()),
        (
            "block_update",
            EventBuilder::block_update(10, 64, -4, "minecraft:stone").build(),
        ),
    ];
    for (name, event) in cases.iter() {
        group.bench_function(*name, |b| {
            b.iter(|| black_box(validator.validate_event(event)));
        });
    }

    group.finish();
}

fn benchmark_filter_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_chain");

    for filter_count in [1, 5, 10].iter() {
        group.bench_with_input(
            BenchmarkId::new("apply", filter_count),
            filter_count,
            |b, &filter_count| {
                let chain = FilterChain::new();
                for i in 0..filter_count {
                    if i % 2 == 0 {
                        chain.add_filter(PriorityFilter::at_least(0));
                    } else {
                        chain.add_filter(SourceFilter::new(["bot-1"], ["overworld"]));
                    }
                }
                let event = EventBuilder::chat("alex", "hello")
                    .bot("bot-1")
                    .priority(Priority::NORMAL)
                    .build();
                b.iter(|| black_box(chain.apply(&event)));
            },
        );
    }

    group.finish();
}

fn benchmark_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("end_to_end");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    group.bench_function("ingest_and_process", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let pipeline = Pipeline::builder()
                    .with_state_validator(StateValidator::new())
                    .build()
                    .unwrap();
                for _ in 0..50 {
                    pipeline
                        .ingest(EventBuilder::health(18.0, 20.0, 5.0).build())
                        .await;
                }
                while pipeline.process_next().await {}
                black_box(pipeline.stats());
            });
        });
    });

    group.finish();
}

// Group all benchmarks
criterion_group!(
    benches,
    benchmark_priority_heap,
    benchmark_enqueue,
    benchmark_validation,
    benchmark_filter_chain,
    benchmark_end_to_end
);

criterion_main!(benches);
