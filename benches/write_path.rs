//! Write and replay path benchmarks
//!
//! ## Benchmark Path Types
//!
//! - `table_post/*`: structured channel, one row per posted message
//! - `json_post/*`: structured-text channel, encode plus one row per message
//! - `table_replay`: rowid cursor over a populated table
//!
//! Write groups are labelled with the bulk size; `bulk_1` commits every write.
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench write_path
//! cargo bench --bench write_path -- "table_post"
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sqlbridge::{
    ChannelConfig, Field, FieldType, JsonChannel, Message, MessageSchema, Msg, OpenParams,
    RecordBuffer, TableChannel,
};
use std::time::Duration;
use tempfile::TempDir;

// =============================================================================
// Utilities - allocation happens here, outside timed loops
// =============================================================================

const MESSAGES: i64 = 1_000;

fn schema() -> MessageSchema {
    MessageSchema::new(vec![Message::builder("tick", 10)
        .field(Field::new("id", FieldType::Int64))
        .field(Field::new("size", FieldType::Int32))
        .field(Field::new("price", FieldType::Double))
        .field(Field::string("venue"))
        .build()])
    .expect("schema")
}

fn records(schema: &MessageSchema) -> Vec<Vec<u8>> {
    let msg = schema.by_id(10).expect("tick");
    (0..MESSAGES)
        .map(|i| {
            let mut buf = RecordBuffer::new(msg.size);
            buf.write_integer(&msg.fields[0], i).expect("id");
            buf.write_integer(&msg.fields[1], i % 100).expect("size");
            buf.write_double(&msg.fields[2], i as f64 * 0.25).expect("price");
            buf.set_string(&msg.fields[3], b"XNAS").expect("venue");
            buf.into_bytes()
        })
        .collect()
}

fn db_path(dir: &TempDir) -> String {
    dir.path().join("bench.db").to_string_lossy().into_owned()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn table_post_benchmarks(c: &mut Criterion) {
    let schema = schema();
    let data = records(&schema);
    let mut group = c.benchmark_group("table_post");
    group.throughput(Throughput::Elements(MESSAGES as u64));

    for bulk in [1usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("bulk", bulk), &bulk, |b, &bulk| {
            b.iter_with_setup(
                || {
                    let dir = TempDir::new().expect("tempdir");
                    let config = ChannelConfig::new(db_path(&dir)).with_bulk_size(bulk);
                    let mut channel = TableChannel::new(config, schema.clone()).expect("channel");
                    channel.open(&OpenParams::new()).expect("open");
                    (dir, channel)
                },
                |(_dir, mut channel)| {
                    for (seq, record) in data.iter().enumerate() {
                        channel
                            .post(&Msg::data(10, seq as i64, record.clone()))
                            .expect("post");
                    }
                    channel.close();
                },
            );
        });
    }
    group.finish();
}

fn json_post_benchmarks(c: &mut Criterion) {
    let schema = schema();
    let data = records(&schema);
    let mut group = c.benchmark_group("json_post");
    group.throughput(Throughput::Elements(MESSAGES as u64));

    for bulk in [1usize, 1000] {
        group.bench_with_input(BenchmarkId::new("bulk", bulk), &bulk, |b, &bulk| {
            b.iter_with_setup(
                || {
                    let dir = TempDir::new().expect("tempdir");
                    let config = ChannelConfig::new(db_path(&dir))
                        .with_table("ticks")
                        .with_bulk_size(bulk)
                        .with_dir(sqlbridge::Direction::Write);
                    let mut channel = JsonChannel::new(config, schema.clone()).expect("channel");
                    channel.open(&OpenParams::new()).expect("open");
                    (dir, channel)
                },
                |(_dir, mut channel)| {
                    for (seq, record) in data.iter().enumerate() {
                        channel
                            .post(&Msg::data(10, seq as i64, record.clone()))
                            .expect("post");
                    }
                    channel.close();
                },
            );
        });
    }
    group.finish();
}

fn table_replay_benchmarks(c: &mut Criterion) {
    let schema = schema();
    let dir = TempDir::new().expect("tempdir");
    let path = db_path(&dir);
    {
        let config = ChannelConfig::new(path.clone()).with_bulk_size(0);
        let mut channel = TableChannel::new(config, schema.clone()).expect("channel");
        channel.open(&OpenParams::new()).expect("open");
        for (seq, record) in records(&schema).into_iter().enumerate() {
            channel.post(&Msg::data(10, seq as i64, record)).expect("post");
        }
    }

    let mut group = c.benchmark_group("table_replay");
    group.throughput(Throughput::Elements(MESSAGES as u64));
    group.bench_function("all_rows", |b| {
        b.iter(|| {
            let mut channel =
                TableChannel::new(ChannelConfig::new(path.clone()), schema.clone()).expect("channel");
            channel
                .open(&OpenParams::new().with_table("tick"))
                .expect("open");
            let mut count = 0;
            while let Some(msg) = channel.process().expect("process") {
                count += black_box(msg).data.len();
            }
            count
        });
    });
    group.finish();
}

criterion_group!(
    name = writes;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(10);
    targets = table_post_benchmarks, json_post_benchmarks
);

criterion_group!(
    name = replay;
    config = Criterion::default().sample_size(20);
    targets = table_replay_benchmarks
);

criterion_main!(writes, replay);
