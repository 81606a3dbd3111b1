//! Marshalling ring benchmarks
//!
//! Fixed-size records of three ints and a long written and read back through
//! the typed accessors, with some records straddling the region end.
//!
//! Run: cargo bench --bench bench_marshalling

use criterion::{ criterion_group, criterion_main, BenchmarkId, Criterion, Throughput };
use std::hint::black_box;
use std::thread;

use spinring::marshalling::{ self, offsets };
use spinring::RingBufferConfig;

const REGION_SIZE: usize = 64 * 1024;
const TOTAL_RECORDS: u64 = 1_000_000;
const RECORD: usize = offsets::INT * 3 + offsets::LONG;

fn bench_records(records: u64, many_writers: bool) -> u64 {
    let config = RingBufferConfig::new(REGION_SIZE).unwrap().one_reader();
    let config = if many_writers { config.many_writers() } else { config.one_writer() };
    let (mut writer, mut reader) = marshalling::ring(config).unwrap();

    let producer = thread::spawn(move || {
        for i in 0..records {
            let mut claim = writer.next(RECORD).unwrap();
            let offset = claim.offset();
            claim.write_i32(offset, i as i32);
            claim.write_i32(offset + 4, 1);
            claim.write_i32(offset + 8, 2);
            claim.write_i64(offset + 12, i as i64);
            claim.put();
        }
    });

    let mut sum = 0i64;
    for _ in 0..records {
        let claim = reader.take(RECORD).unwrap();
        let offset = claim.offset();
        sum = sum.wrapping_add(claim.read_i32(offset) as i64);
        sum = sum.wrapping_add(claim.read_i64(offset + 12));
        claim.advance();
    }
    producer.join().unwrap();
    black_box(sum as u64)
}

fn benchmark_records(c: &mut Criterion) {
    let mut group = c.benchmark_group("Marshalling records (1M x 20B)");
    group.throughput(Throughput::Bytes(TOTAL_RECORDS * (RECORD as u64)));
    group.sample_size(20);

    group.bench_function(BenchmarkId::new("writers", "one"), |b| {
        b.iter(|| bench_records(TOTAL_RECORDS, false))
    });
    group.bench_function(BenchmarkId::new("writers", "many-locked"), |b| {
        b.iter(|| bench_records(TOTAL_RECORDS, true))
    });

    group.finish();
}

criterion_group!(benches, benchmark_records);
criterion_main!(benches);
