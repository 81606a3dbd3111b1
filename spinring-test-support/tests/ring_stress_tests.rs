//! Time-bounded stress runs for prefilled and marshalling rings.
//!
//! Run longer with: STRESS_SECS=30 cargo test -p spinring-test-support --test ring_stress -- --nocapture

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use spinring::marshalling::{ self, offsets };
use spinring::{ prefilled, FailBusyWaitStrategy, RingBufferConfig, Side };
use spinring_test_support::{ print_summary, SequenceChecker, StressConfig, StressRunner };

fn stress_duration() -> Duration {
    let secs = std::env::var("STRESS_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);
    Duration::from_secs(secs)
}

#[derive(Default)]
struct Frame {
    writer: u64,
    seq: u64,
    checksum: u64,
}

fn checksum(writer: u64, seq: u64) -> u64 {
    (writer << 48) ^ seq.wrapping_mul(0x9e3779b97f4a7c15)
}

#[test]
fn stress_prefilled_mpsc() {
    let config = StressConfig::new(stress_duration()).with_writers(3).with_capacity(256);
    let runner = StressRunner::new(config.clone());

    let metrics = runner.run_with_progress(|counters| {
        let ring_config = RingBufferConfig::new(config.capacity)
            .unwrap()
            .many_writers()
            .one_reader()
            .with_atomic_claim(true)
            .with_read_wait(FailBusyWaitStrategy::new(100_000));
        let (writer, mut reader) = prefilled::ring_default::<Frame>(ring_config).unwrap();
        let writers_done = Arc::new(AtomicBool::new(false));

        let writer_threads: Vec<_> = (0..config.writers as u64)
            .map(|id| {
                let mut writer = writer.try_clone().unwrap();
                let counters = counters.clone();
                thread::spawn(move || {
                    let mut seq = 0u64;
                    while counters.is_running() {
                        let mut slot = writer.next().unwrap();
                        slot.writer = id;
                        slot.seq = seq;
                        slot.checksum = checksum(id, seq);
                        slot.put();
                        counters.record_put(1, std::mem::size_of::<Frame>());
                        seq += 1;
                    }
                })
            })
            .collect();
        drop(writer);

        let done = writers_done.clone();
        let joiner = thread::spawn(move || {
            for handle in writer_threads {
                handle.join().unwrap();
            }
            done.store(true, Ordering::Release);
        });

        let mut checker = SequenceChecker::new();
        loop {
            let finished = writers_done.load(Ordering::Acquire);
            match reader.take() {
                Ok(frame) => {
                    if frame.checksum != checksum(frame.writer, frame.seq) {
                        counters.record_error();
                    }
                    checker.check(frame.writer, frame.seq);
                    counters.record_take(1, std::mem::size_of::<Frame>());
                }
                Err(err) if err.side() == Some(Side::Read) && finished => {
                    break;
                }
                Err(err) if err.side() == Some(Side::Read) => {}
                Err(_) => {
                    counters.record_error();
                    break;
                }
            }
        }
        joiner.join().unwrap();
        assert!(checker.stats().is_perfect(), "{:?}", checker.stats());
    });

    print_summary("prefilled mpsc (cas)", &metrics);
    assert_eq!(metrics.errors, 0);
    assert_eq!(metrics.puts, metrics.takes);
}

#[test]
fn stress_marshalling_variable_records() {
    let config = StressConfig::new(stress_duration()).with_capacity(1024).with_max_batch(8);
    let runner = StressRunner::new(config.clone());

    let metrics = runner.run_with_progress(|counters| {
        let ring_config = RingBufferConfig::new(config.capacity).unwrap().one_writer().one_reader();
        let (mut writer, mut reader) = marshalling::ring(ring_config).unwrap();

        let writer_counters = counters.clone();
        let max_batch = config.max_batch;
        let producer = thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut seq = 0u64;
            while writer_counters.is_running() {
                // header: sequence and value count, then that many ints
                let values = rng.gen_range(0..=max_batch);
                let size = offsets::LONG + offsets::INT + values * offsets::INT;
                let mut claim = writer.next(size).unwrap();
                let at = claim.offset();
                claim.write_u64(at, seq);
                claim.write_u32(at + 8, values as u32);
                for i in 0..values {
                    claim.write_i32(at + 12 + (i as u64) * 4, (seq as i32).wrapping_add(i as i32));
                }
                claim.put();
                writer_counters.record_put(1, size);
                seq += 1;
            }
            // end marker
            let mut claim = writer.next(offsets::LONG + offsets::INT).unwrap();
            let at = claim.offset();
            claim.write_u64(at, u64::MAX);
            claim.write_u32(at + 8, 0);
        });

        let mut expected = 0u64;
        loop {
            // header first, then the body it announces
            let (seq, values) = {
                let claim = reader.take(offsets::LONG + offsets::INT).unwrap();
                let at = claim.offset();
                (claim.read_u64(at), claim.read_u32(at + 8) as usize)
            };
            if seq == u64::MAX {
                break;
            }
            if seq != expected {
                counters.record_error();
            }
            if values > 0 {
                let claim = reader.take(values * offsets::INT).unwrap();
                let at = claim.offset();
                for i in 0..values {
                    let value = claim.read_i32(at + (i as u64) * 4);
                    if value != (seq as i32).wrapping_add(i as i32) {
                        counters.record_error();
                    }
                }
            }
            counters.record_take(1, offsets::LONG + offsets::INT + values * offsets::INT);
            expected += 1;
        }
        producer.join().unwrap();
    });

    print_summary("marshalling variable records", &metrics);
    assert_eq!(metrics.errors, 0);
    assert_eq!(metrics.puts, metrics.takes);
}
