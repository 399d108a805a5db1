// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use memrel_db::{ColumnDef, Database, IndexDef, TableSchema, Transaction, col};
use memrel_var::{DataType, v_int, v_text};
use std::hint::black_box;
use std::time::Duration;

fn create_db(t: &Transaction) -> Database {
    let mut db = Database::default();
    db.declare_table(
        t,
        TableSchema::new("t")
            .column(ColumnDef::new("id", DataType::Int).primary_key())
            .column(ColumnDef::new("v", DataType::Int))
            .column(ColumnDef::new("name", DataType::Text)),
    )
    .unwrap();
    db.create_index(t, "t", IndexDef::on(col(1))).unwrap();
    db
}

fn insert_throughput(c: &mut Criterion) {
    let num_rows = 1_000;
    let mut group = c.benchmark_group("insert");
    group.sample_size(10);
    group.throughput(Throughput::Elements(num_rows));

    group.bench_function("indexed_insert", |b| {
        b.iter_custom(|iters| {
            let mut cumulative_time = Duration::new(0, 0);
            for _ in 0..iters {
                let root = Transaction::root();
                let db = create_db(&root);
                let table = db.get_table("t").unwrap();
                let t = root.fork();
                let start = std::time::Instant::now();
                for i in 0..num_rows as i64 {
                    table
                        .insert_values(&t, vec![v_int(i), v_int(i % 17), v_text("x")])
                        .unwrap();
                }
                cumulative_time += start.elapsed();
            }
            cumulative_time
        })
    });
    group.finish();
}

fn fork_commit(c: &mut Criterion) {
    let root = Transaction::root();
    let db = create_db(&root);
    let table = db.get_table("t").unwrap();
    for i in 0..10_000 {
        table
            .insert_values(&root, vec![v_int(i), v_int(i % 17), v_text("x")])
            .unwrap();
    }
    let mut next = 10_000;
    let mut group = c.benchmark_group("transaction");
    group.bench_function("fork_insert_commit", |b| {
        b.iter(|| {
            let t = root.fork();
            table
                .insert_values(&t, vec![v_int(next), v_int(1), v_text("y")])
                .unwrap();
            next += 1;
            black_box(t.commit());
        })
    });
    group.bench_function("fork_rollback", |b| {
        b.iter(|| {
            let t = root.fork();
            black_box(t.rollback());
        })
    });
    group.finish();
}

criterion_group!(benches, insert_throughput, fork_commit);
criterion_main!(benches);
