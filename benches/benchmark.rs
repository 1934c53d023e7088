use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use docfx::context::DbWriter;
use docfx::effect::{Concurrency, zip_all};
use docfx::filter::field;
use docfx::memory::MemoryBackend;
use docfx::store::{Order, PaginationOptions};
use docfx::todos::{self, Todo};
use docfx::Effect;

fn chain(depth: u32) -> Effect<u32> {
    (0..depth).fold(Effect::succeed(0), |effect, _| effect.flat_map(|n| Effect::succeed(n + 1)))
}

fn seeded(runtime: &Runtime, count: usize) -> DbWriter {
    let backend = MemoryBackend::new(todos::schema().expect("todos schema"));
    let db = DbWriter::from_backend(Arc::new(backend));
    let inserts = (0..count).map(|i| db.insert(Todo { text: format!("todo {i}"), completed: i % 3 == 0 }));
    runtime.block_on(zip_all(inserts, Concurrency::Sequential).run_exit()).expect("seed");
    db
}

fn bench_effects(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    c.bench_function("flat_map chain of 100", |b| {
        b.iter(|| runtime.block_on(chain(black_box(100)).run_exit()))
    });
    c.bench_function("zip_all of 100 unbounded", |b| {
        b.iter(|| {
            let batch = (0..black_box(100u32)).map(Effect::succeed);
            runtime.block_on(zip_all(batch, Concurrency::Unbounded).run_exit())
        })
    });
}

fn bench_queries(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    let db = seeded(&runtime, 1_000);
    c.bench_function("index lookup over 1000 todos", |b| {
        b.iter(|| {
            let query = db.query::<Todo>().by_index("completed", (black_box(true),)).expect("index");
            runtime.block_on(query.collect().run_exit())
        })
    });
    c.bench_function("filtered desc page over 1000 todos", |b| {
        b.iter(|| {
            let query = db.query::<Todo>().order(Order::Desc).filter(field("text").gte(black_box("todo 5")));
            runtime.block_on(query.paginate(PaginationOptions::first(50)).run_exit())
        })
    });
}

criterion_group!(benches, bench_effects, bench_queries);
criterion_main!(benches);
