#![expect(missing_docs, reason = "benchmarks")]

use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;
use std::time::{Duration, Instant};

use criterion::{Criterion, criterion_group, criterion_main};
use rendezvous::{DispatchPool, Event};
use tokio::runtime::Runtime;
use tokio::task::LocalSet;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("failed to build benchmark runtime")
}

/// Fires `event` once per iteration and lets the dispatched listeners run before the next one.
fn fire_repeatedly(
    runtime: &Runtime,
    local: &LocalSet,
    event: &Event<u64>,
    iterations: u64,
) -> Duration {
    local.block_on(runtime, async {
        let start = Instant::now();

        for i in 0..iterations {
            event.fire(black_box(i));
            tokio::task::yield_now().await;
        }

        start.elapsed()
    })
}

fn counting_event(pool: DispatchPool, listeners: usize) -> (Event<u64>, Rc<Cell<u64>>) {
    let event = Event::with_pool(pool);
    let total = Rc::new(Cell::new(0_u64));

    for _ in 0..listeners {
        let total = Rc::clone(&total);
        event.connect(move |value| total.set(total.get().wrapping_add(value)));
    }

    (event, total)
}

fn entrypoint(c: &mut Criterion) {
    let runtime = runtime();

    // Shared so that parked workers survive from one measurement batch to the next.
    let local = LocalSet::new();

    let mut g = c.benchmark_group("event_fire");

    g.bench_function("one_listener", |b| {
        let (event, total) = counting_event(DispatchPool::new(), 1);

        b.iter_custom(|iterations| fire_repeatedly(&runtime, &local, &event, iterations));

        black_box(total.get());
    });

    g.bench_function("ten_listeners", |b| {
        let (event, total) =
            counting_event(DispatchPool::builder().max_idle_workers(10).build(), 10);

        b.iter_custom(|iterations| fire_repeatedly(&runtime, &local, &event, iterations));

        black_box(total.get());
    });

    g.bench_function("one_listener_no_reuse", |b| {
        let (event, total) =
            counting_event(DispatchPool::builder().max_idle_workers(0).build(), 1);

        b.iter_custom(|iterations| fire_repeatedly(&runtime, &local, &event, iterations));

        black_box(total.get());
    });

    g.finish();
}

criterion_group!(benches, entrypoint);
criterion_main!(benches);
