// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Benchmarks for scheduler passes
//!
//! These benchmarks measure:
//! - Session-backed visits, sequential vs parallel, with write-back
//! - Read-only passes that skip persistence
//! - Raw-id classification vs session-based classification

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use colony::error::Result;
use colony::mapper::Mapper;
use colony::session::Session;
use colony::store::{Attribute, AttributeHandle, AttributeKind, IntAttribute, Row, Store, StoreSchema};
use colony::{Engine, EngineConfig, Execution, IteratingSystemBuilder, PersistenceMode, QueryService};

struct Wealth(i32);

#[derive(Default)]
struct WealthMapper {
    wealth: Option<AttributeHandle<IntAttribute>>,
}

impl WealthMapper {
    fn column<'s>(&self, store: &'s Store) -> &'s IntAttribute {
        store.column(self.wealth.as_ref().expect("attached"))
    }
}

impl Mapper for WealthMapper {
    type Component = Wealth;

    fn name(&self) -> &str {
        "wealth"
    }

    fn configure_store(&self, schema: &mut StoreSchema) {
        schema.attribute("wealth", AttributeKind::Int);
    }

    fn attach_store(&mut self, store: &Store) -> Result<()> {
        self.wealth = Some(store.handle("wealth")?);
        Ok(())
    }

    fn is_present(&self, store: &Store, row: Row) -> bool {
        !self.column(store).is_empty(row)
    }

    fn create(&self) -> Wealth {
        Wealth(0)
    }

    fn load(&self, session: &Session<'_>, wealth: &mut Wealth, row: Row) {
        wealth.0 = self.column(session.store()).get(row);
    }

    fn save(&self, session: &Session<'_>, wealth: &Wealth, row: Row) {
        self.column(session.store()).set(row, wealth.0);
    }

    fn erase(&self, store: &Store, row: Row) {
        self.column(store).set_empty(row);
    }
}

fn setup_engine(rows: usize) -> Engine {
    let mut engine = Engine::new(EngineConfig::new(rows, 10_000)).unwrap();
    engine.register(WealthMapper::default()).unwrap();
    for _ in 0..rows {
        engine.create_entity();
    }
    let column = engine.store().require::<IntAttribute>("wealth").unwrap();
    for row in 0..rows {
        column.set(row, (row % 1000) as i32);
    }
    engine
}

fn run_pass(engine: &Engine, persistence: PersistenceMode, execution: Execution) -> usize {
    IteratingSystemBuilder::new(engine)
        .selector(engine.all_entities())
        .persistence(persistence)
        .visit(|entity, _| {
            if let Some(wealth) = entity.get::<Wealth>() {
                wealth.borrow_mut().0 += 1;
            }
        })
        .build()
        .unwrap()
        .run(execution)
        .unwrap()
        .rows
}

/// Benchmark: one full pass with write-back
fn bench_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("pass");

    for row_count in [10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*row_count as u64));
        let engine = setup_engine(*row_count);

        group.bench_with_input(BenchmarkId::new("sequential", row_count), &engine, |b, engine| {
            b.iter(|| black_box(run_pass(engine, PersistenceMode::Default, Execution::Sequential)));
        });

        group.bench_with_input(BenchmarkId::new("parallel", row_count), &engine, |b, engine| {
            b.iter(|| black_box(run_pass(engine, PersistenceMode::Default, Execution::Parallel)));
        });

        group.bench_with_input(BenchmarkId::new("parallel_read_only", row_count), &engine, |b, engine| {
            b.iter(|| black_box(run_pass(engine, PersistenceMode::ReadOnly, Execution::Parallel)));
        });
    }

    group.finish();
}

/// Benchmark: bucket rows by wealth decile
fn bench_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("classification");
    let rows = 100_000;
    group.throughput(Throughput::Elements(rows as u64));
    let engine = setup_engine(rows);
    let handle = engine.store().handle::<IntAttribute>("wealth").unwrap();

    group.bench_function("raw_ids", |b| {
        b.iter(|| {
            let groups = QueryService::new(&engine).classify_ids(|store, row| Some(store.column(&handle).get(row) / 100));
            black_box(groups.len())
        });
    });

    group.bench_function("sessions", |b| {
        b.iter(|| {
            let index = QueryService::new(&engine)
                .classify(engine.all_entities(), |entity| {
                    entity.get::<Wealth>().map(|w| (w.borrow().0 / 100).to_string())
                })
                .unwrap();
            black_box(index.len())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pass, bench_classification);
criterion_main!(benches);
