//! Performance benchmarks for trindex
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::PathBuf;
use tempfile::TempDir;
use trindex::index::{pfor, Index, IndexConfig, Writer};
use trindex::query::{Query, QueryExecutor};

/// Build a shard of generated source files
fn create_benchmark_shard() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let shard = temp_dir.path().join("shard");

    let mut writer = Writer::create(&shard, IndexConfig::default()).expect("Failed to create writer");
    for i in 0..200 {
        let content = format!(
            r#"// File {i}
fn function_{i}() {{
    println!("Hello from function {i}");
    let x = {i} * 2;
    let y = x + 1;
}}

struct Struct{i} {{
    field: i32,
    name: String,
}}
"#,
            i = i
        );
        writer
            .add_bytes(&format!("src/file_{i}.rs"), content.as_bytes())
            .expect("Failed to add file");
    }
    writer.flush().expect("Failed to flush shard");

    (temp_dir, shard)
}

fn bench_codec(c: &mut Criterion) {
    let sequential: Vec<u32> = (0..10_000).map(|i| i % 7 + 1).collect();
    let outliers: Vec<u32> = (0..10_000)
        .map(|i| if i % 97 == 0 { 1 << 20 } else { 3 })
        .collect();

    let mut group = c.benchmark_group("codec");
    for (name, values) in [("small_deltas", &sequential), ("outliers", &outliers)] {
        let encoded = pfor::encode_to_vec(values);
        group.bench_with_input(BenchmarkId::new("encode", name), values, |b, v| {
            b.iter(|| pfor::encode_to_vec(black_box(v)))
        });
        group.bench_with_input(BenchmarkId::new("decode", name), &encoded, |b, buf| {
            b.iter(|| pfor::decode_to_vec(black_box(buf), values.len()))
        });
    }
    group.finish();
}

fn bench_indexing(c: &mut Criterion) {
    let content = b"fn main() { println!(\"hello\"); }\n".repeat(1000);

    c.bench_function("add_bytes_32kb", |b| {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut writer = Writer::create(&temp_dir.path().join("shard"), IndexConfig::default())
            .expect("Failed to create writer");
        let mut n = 0u32;
        b.iter(|| {
            n += 1;
            writer.add_bytes(&format!("f{n}"), black_box(&content))
        })
    });
}

fn bench_queries(c: &mut Criterion) {
    let (_temp_dir, shard) = create_benchmark_shard();
    let index = Index::open(&shard).expect("Failed to open shard");

    let mut group = c.benchmark_group("query");

    group.bench_function("posting_list", |b| {
        let t = trindex::index::bytes_to_trigram(b'f', b'n', b' ');
        b.iter(|| index.posting_list(black_box(t)))
    });

    group.bench_function("literal_and", |b| {
        let query = Query::literal("Hello from function");
        b.iter(|| QueryExecutor::new(&index).execute(black_box(&query)))
    });

    group.bench_function("literal_or", |b| {
        let query = Query::any_literal(["Struct1", "function_42"]);
        b.iter(|| QueryExecutor::new(&index).execute(black_box(&query)))
    });

    group.bench_function("positional", |b| {
        b.iter(|| index.query_positional(black_box("let y = x")))
    });

    group.finish();
}

fn bench_index_open(c: &mut Criterion) {
    let (_temp_dir, shard) = create_benchmark_shard();

    c.bench_function("index_open", |b| b.iter(|| Index::open(black_box(&shard))));
}

criterion_group!(
    benches,
    bench_codec,
    bench_indexing,
    bench_queries,
    bench_index_open,
);

criterion_main!(benches);
