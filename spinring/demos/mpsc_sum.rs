//! Average Calculator - MPSC (4 Writers, 1 Reader)
//!
//! Each writer puts 250k numbers, the reader averages all 1M. Run once with
//! the write lock and once with compare-and-swap claims.

use spinring::{ object, RingBufferConfig };
use std::panic;
use std::thread;
use std::time::Instant;

const RING_SIZE: usize = 64 * 1024;
const MESSAGES_PER_WRITER: u64 = 250_000;
const NUM_WRITERS: u64 = 4;
const MAX_NUMBER: u64 = MESSAGES_PER_WRITER * NUM_WRITERS;

fn run(atomic_claim: bool) -> spinring::Result<()> {
    let config = RingBufferConfig::new(RING_SIZE)?
        .many_writers()
        .one_reader()
        .with_atomic_claim(atomic_claim);
    let (writer, mut reader) = object::ring::<u64>(config)?;

    let start = Instant::now();

    let mut writer_threads = vec![];
    for writer_id in 0..NUM_WRITERS {
        let mut writer = writer.try_clone()?;
        writer_threads.push(
            thread::spawn(move || -> spinring::Result<()> {
                let first = writer_id * MESSAGES_PER_WRITER + 1;
                for number in first..first + MESSAGES_PER_WRITER {
                    writer.put(number)?;
                }
                Ok(())
            })
        );
    }
    drop(writer);

    let mut sum = 0u64;
    for _ in 0..MAX_NUMBER {
        sum += reader.take()?;
    }
    for handle in writer_threads {
        handle.join().unwrap_or_else(|panic| panic::resume_unwind(panic))?;
    }

    let elapsed = start.elapsed();
    let average = (sum as f64) / (MAX_NUMBER as f64);
    let expected = ((MAX_NUMBER + 1) as f64) / 2.0;
    println!(
        "{:<6} claim: average {:.1} (expected {:.1}) in {:?}, {:.1} M/s",
        if atomic_claim { "cas" } else { "locked" },
        average,
        expected,
        elapsed,
        (MAX_NUMBER as f64) / elapsed.as_secs_f64() / 1e6
    );
    Ok(())
}

fn main() -> spinring::Result<()> {
    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  Average Calculator - MPSC (4 Writers)                 ║");
    println!("╚════════════════════════════════════════════════════════╝\n");

    println!("Task: Calculate average of numbers 1 to {}\n", MAX_NUMBER);

    run(false)?;
    run(true)?;
    Ok(())
}
