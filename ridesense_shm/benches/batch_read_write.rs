//! Read/write performance benchmarks for the sensor batch region.

use criterion::{criterion_group, criterion_main, Criterion};
use ridesense_shm::batch::{Batch, BatchReader, BatchRow, BatchWriter, ROWS_PER_BATCH};
use std::hint::black_box;

fn sample_batch() -> Batch {
    let mut batch: Batch = [BatchRow::default(); ROWS_PER_BATCH];
    for (i, row) in batch.iter_mut().enumerate() {
        row.t_sec = i as f64 * 0.01;
        row.acc_x = 0.117588;
        row.speed = 42.5;
        row.speed_limit = 50.0;
    }
    batch
}

fn bench_write_batch(c: &mut Criterion) {
    let mut writer = BatchWriter::create().expect("create batch writer");
    let batch = sample_batch();

    c.bench_function("write_batch_104_rows", |b| {
        b.iter(|| {
            writer.write_batch(black_box(&batch));
        });
    });
}

fn bench_read_batch(c: &mut Criterion) {
    let mut writer = BatchWriter::create().expect("create batch writer");
    writer.write_batch(&sample_batch());
    let reader = BatchReader::attach().expect("attach batch reader");

    c.bench_function("read_batch_104_rows", |b| {
        b.iter(|| {
            black_box(reader.read_batch());
        });
    });
}

criterion_group!(benches, bench_write_batch, bench_read_batch);
criterion_main!(benches);
