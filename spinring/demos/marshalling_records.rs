//! Marshalling Records - SPSC over a byte region
//!
//! A writer streams fixed-layout trade records (id, price, quantity, side)
//! into a small byte ring, so records regularly wrap around its end. The
//! reader decodes them with the typed accessors and checks every field.

use spinring::marshalling::{ self, offsets };
use spinring::{ RingBufferConfig, TwoStepBusyWaitStrategy };
use std::panic;
use std::thread;
use std::time::Instant;

const REGION_SIZE: usize = 4096;
const RECORDS: u64 = 1_000_000;
const RECORD_SIZE: usize = offsets::LONG + offsets::DOUBLE + offsets::INT + offsets::BOOLEAN;

fn main() -> spinring::Result<()> {
    println!("\n╔════════════════════════════════════════════════════════╗");
    println!("║  Marshalling Records - {}B records in a {}B region    ║", RECORD_SIZE, REGION_SIZE);
    println!("╚════════════════════════════════════════════════════════╝\n");

    let config = RingBufferConfig::new(REGION_SIZE)?
        .one_writer()
        .one_reader()
        .with_read_wait(TwoStepBusyWaitStrategy::new(100));
    let (mut writer, mut reader) = marshalling::ring(config)?;

    let start = Instant::now();

    let producer = thread::spawn(move || -> spinring::Result<()> {
        for id in 0..RECORDS {
            let mut claim = writer.next(RECORD_SIZE)?;
            let at = claim.offset();
            claim.write_u64(at, id);
            claim.write_f64(at + 8, (id as f64) * 0.25);
            claim.write_u32(at + 16, (id % 1000) as u32);
            claim.write_bool(at + 20, id % 2 == 0);
            claim.put();
        }
        Ok(())
    });

    let mut buys = 0u64;
    for id in 0..RECORDS {
        let claim = reader.take(RECORD_SIZE)?;
        let at = claim.offset();
        assert_eq!(claim.read_u64(at), id);
        assert_eq!(claim.read_f64(at + 8), (id as f64) * 0.25);
        assert_eq!(claim.read_u32(at + 16), (id % 1000) as u32);
        if claim.read_bool(at + 20) {
            buys += 1;
        }
        claim.advance();
    }
    producer.join().unwrap_or_else(|panic| panic::resume_unwind(panic))?;

    let elapsed = start.elapsed();
    println!("Decoded {} records ({} buys) in {:?}", RECORDS, buys, elapsed);
    println!(
        "Throughput: {:.1} M records/s, {:.1} MB/s",
        (RECORDS as f64) / elapsed.as_secs_f64() / 1e6,
        ((RECORDS * (RECORD_SIZE as u64)) as f64) / elapsed.as_secs_f64() / 1e6
    );
    Ok(())
}
