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
//! Benchmarks for column storage
//!
//! These benchmarks measure:
//! - Row appends with and without pre-sizing
//! - Direct column reads through handles
//! - String codec throughput used by bulk loads
//! - CSV import of a generated population

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use colony::io::read_into;
use colony::store::{Attribute, Store};

/// Benchmark: append rows, growing on demand vs reserved up front
fn bench_append_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_rows");

    for row_count in [1_000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*row_count as u64));

        group.bench_with_input(BenchmarkId::new("growing", row_count), row_count, |b, &count| {
            b.iter(|| {
                let mut store = Store::new("bench", 16);
                let wealth = store.add_int("wealth").unwrap();
                for _ in 0..count {
                    let row = store.append_row();
                    store.column(&wealth).set(row, row as i32);
                }
                black_box(store);
            });
        });

        group.bench_with_input(BenchmarkId::new("reserved", row_count), row_count, |b, &count| {
            b.iter(|| {
                let mut store = Store::new("bench", 16);
                let wealth = store.add_int("wealth").unwrap();
                store.reserve(count);
                for _ in 0..count {
                    let row = store.acquire_row().unwrap();
                    store.column(&wealth).set(row, row as i32);
                }
                black_box(store);
            });
        });
    }

    group.finish();
}

/// Benchmark: sum a column through a typed handle vs the string codec
fn bench_column_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("column_reads");

    for row_count in [1_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*row_count as u64));

        let mut store = Store::new("bench", *row_count);
        let wealth = store.add_int("wealth").unwrap();
        for row in 0..*row_count {
            store.column(&wealth).set(row, row as i32);
        }
        store.fire_underlying_data_changed(0, *row_count);

        group.bench_with_input(BenchmarkId::new("typed", row_count), row_count, |b, &count| {
            b.iter(|| {
                let column = store.column(&wealth);
                let sum: i64 = (0..count).map(|row| i64::from(column.get(row))).sum();
                black_box(sum);
            });
        });

        group.bench_with_input(BenchmarkId::new("codec", row_count), row_count, |b, &count| {
            b.iter(|| {
                let column = store.get("wealth").unwrap();
                let total: usize = (0..count).filter_map(|row| column.get_string(row)).map(|s| s.len()).sum();
                black_box(total);
            });
        });
    }

    group.finish();
}

/// Benchmark: CSV import
fn bench_csv_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("csv_load");

    for row_count in [1_000, 10_000].iter() {
        let mut input = String::from("name,age,friends\n");
        for i in 0..*row_count {
            input.push_str(&format!("agent-{},{},{} {}\n", i, i % 90, i / 2, i / 3));
        }
        group.throughput(Throughput::Bytes(input.len() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(row_count), &input, |b, input| {
            b.iter(|| {
                let mut store = Store::new("bench", 1024);
                store.add_string("name").unwrap();
                store.add_int("age").unwrap();
                store.add_entity_list("friends").unwrap();
                let summary = read_into(&mut store, input.as_bytes()).unwrap();
                black_box(summary);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_append_rows, bench_column_reads, bench_csv_load);
criterion_main!(benches);
