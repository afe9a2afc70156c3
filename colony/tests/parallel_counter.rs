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
//! Parallel write-back safety
//!
//! Every row carries two counters. A pass increments one and decrements the
//! other, and the mapper also keeps a running total outside the store. Row
//! writes are always safe because chunks are row-disjoint; the running total
//! is only correct when the mapper switches to atomic accumulation for the
//! duration of a parallel pass.

#![cfg(feature = "parallel")]

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use colony::error::Result;
use colony::mapper::{LifecycleEvent, Mapper};
use colony::session::Session;
use colony::store::{Attribute, AttributeHandle, AttributeKind, IntAttribute, Row, Store, StoreSchema};
use colony::{Engine, EngineConfig, Execution, IteratingSystemBuilder};

const CHUNKS: usize = 8;
const ROWS_PER_CHUNK: usize = 5_000;

#[derive(Debug, Default)]
struct Tally {
    a: i32,
    b: i32,
}

struct TallyMapper {
    a: Option<AttributeHandle<IntAttribute>>,
    b: Option<AttributeHandle<IntAttribute>>,
    total: Arc<AtomicI64>,
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
    chunk_safe: bool,
    parallel: AtomicBool,
}

impl TallyMapper {
    fn new(chunk_safe: bool) -> Self {
        TallyMapper {
            a: None,
            b: None,
            total: Arc::new(AtomicI64::new(0)),
            events: Arc::new(Mutex::new(Vec::new())),
            chunk_safe,
            parallel: AtomicBool::new(false),
        }
    }

    fn columns<'s>(&self, store: &'s Store) -> (&'s IntAttribute, &'s IntAttribute) {
        (
            store.column(self.a.as_ref().expect("attached")),
            store.column(self.b.as_ref().expect("attached")),
        )
    }

    fn accumulate(&self, delta: i64) {
        if self.chunk_safe && self.parallel.load(Ordering::Acquire) {
            self.total.fetch_add(delta, Ordering::AcqRel);
        } else {
            // read-modify-write that only holds up on one thread
            let current = self.total.load(Ordering::Acquire);
            thread::yield_now();
            self.total.store(current + delta, Ordering::Release);
        }
    }
}

impl Mapper for TallyMapper {
    type Component = Tally;

    fn name(&self) -> &str {
        "tally"
    }

    fn configure_store(&self, schema: &mut StoreSchema) {
        schema.attribute("a", AttributeKind::Int).attribute("b", AttributeKind::Int);
    }

    fn attach_store(&mut self, store: &Store) -> Result<()> {
        self.a = Some(store.handle("a")?);
        self.b = Some(store.handle("b")?);
        Ok(())
    }

    fn is_present(&self, store: &Store, row: Row) -> bool {
        !self.columns(store).0.is_empty(row)
    }

    fn create(&self) -> Tally {
        Tally::default()
    }

    fn load(&self, session: &Session<'_>, tally: &mut Tally, row: Row) {
        let (a, b) = self.columns(session.store());
        tally.a = a.get(row);
        tally.b = b.get(row);
    }

    fn save(&self, session: &Session<'_>, tally: &Tally, row: Row) {
        let (a, b) = self.columns(session.store());
        let delta = i64::from(tally.a) - i64::from(a.get_or(row, 0));
        a.set(row, tally.a);
        b.set(row, tally.b);
        self.accumulate(delta);
    }

    fn erase(&self, store: &Store, row: Row) {
        let (a, b) = self.columns(store);
        a.set_empty(row);
        b.set_empty(row);
    }

    fn on_lifecycle(&self, event: LifecycleEvent) {
        self.events.lock().unwrap().push(event);
        match event {
            LifecycleEvent::PreParallelIteration => self.parallel.store(true, Ordering::Release),
            LifecycleEvent::PostParallelIteration => self.parallel.store(false, Ordering::Release),
        }
    }
}

struct Fixture {
    engine: Engine,
    total: Arc<AtomicI64>,
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

fn fixture(chunk_safe: bool) -> Fixture {
    let rows = CHUNKS * ROWS_PER_CHUNK;
    let config = EngineConfig::new(rows, ROWS_PER_CHUNK).with_threads(4);
    let mut engine = Engine::new(config).unwrap();
    let mapper = TallyMapper::new(chunk_safe);
    let total = Arc::clone(&mapper.total);
    let events = Arc::clone(&mapper.events);
    engine.register(mapper).unwrap();

    engine.reserve(rows);
    for _ in 0..rows {
        engine.create_entity();
    }
    let store = engine.store();
    let (a, b) = (
        store.require::<IntAttribute>("a").unwrap(),
        store.require::<IntAttribute>("b").unwrap(),
    );
    for row in 0..rows {
        a.set(row, 0);
        b.set(row, 0);
    }
    Fixture { engine, total, events }
}

fn run_pass(engine: &Engine, execution: Execution) {
    let summary = IteratingSystemBuilder::new(engine)
        .selector(engine.all_entities())
        .visit(|entity, _| {
            if let Some(tally) = entity.get::<Tally>() {
                let mut tally = tally.borrow_mut();
                tally.a += 1;
                tally.b -= 1;
            }
        })
        .build()
        .unwrap()
        .run(execution)
        .unwrap();
    assert_eq!(summary.chunks, CHUNKS);
    assert_eq!(summary.rows, CHUNKS * ROWS_PER_CHUNK);
}

fn assert_rows_balanced(engine: &Engine) -> i64 {
    let store = engine.store();
    let a = store.require::<IntAttribute>("a").unwrap();
    let b = store.require::<IntAttribute>("b").unwrap();
    let mut sum = 0i64;
    for row in 0..store.count() {
        assert_eq!(a.get(row), -b.get(row), "row {} out of balance", row);
        sum += i64::from(a.get(row));
    }
    sum
}

#[test]
fn test_chunk_safe_mapper_keeps_totals() {
    let fixture = fixture(true);
    let expected = (CHUNKS * ROWS_PER_CHUNK) as i64;

    run_pass(&fixture.engine, Execution::Parallel);

    assert_eq!(assert_rows_balanced(&fixture.engine), expected);
    assert_eq!(fixture.total.load(Ordering::Acquire), expected);
    assert_eq!(
        *fixture.events.lock().unwrap(),
        vec![LifecycleEvent::PreParallelIteration, LifecycleEvent::PostParallelIteration]
    );

    run_pass(&fixture.engine, Execution::Parallel);
    assert_eq!(assert_rows_balanced(&fixture.engine), 2 * expected);
    assert_eq!(fixture.total.load(Ordering::Acquire), 2 * expected);
}

#[test]
fn test_non_chunk_safe_mapper_loses_updates_in_parallel() {
    let fixture = fixture(false);
    let expected = (CHUNKS * ROWS_PER_CHUNK) as i64;

    run_pass(&fixture.engine, Execution::Parallel);

    // row cells are chunk-owned and stay consistent
    assert_eq!(assert_rows_balanced(&fixture.engine), expected);
    // the shared total is not
    let total = fixture.total.load(Ordering::Acquire);
    assert!(total < expected, "expected lost updates, got the full total {}", total);
}

#[test]
fn test_non_chunk_safe_mapper_is_exact_sequentially() {
    let fixture = fixture(false);
    let expected = (CHUNKS * ROWS_PER_CHUNK) as i64;

    run_pass(&fixture.engine, Execution::Sequential);

    assert_eq!(assert_rows_balanced(&fixture.engine), expected);
    assert_eq!(fixture.total.load(Ordering::Acquire), expected);
    assert!(fixture.events.lock().unwrap().is_empty());
}

#[test]
fn test_post_event_broadcast_after_panic() {
    let fixture = fixture(true);
    let engine = &fixture.engine;
    let system = IteratingSystemBuilder::new(engine)
        .selector(engine.all_entities())
        .visit(|entity, _| {
            if entity.id() == 7 {
                panic!("visit failed on row 7");
            }
        })
        .build()
        .unwrap();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| system.run_parallel()));
    assert!(outcome.is_err());
    assert_eq!(
        *fixture.events.lock().unwrap(),
        vec![LifecycleEvent::PreParallelIteration, LifecycleEvent::PostParallelIteration]
    );
}
