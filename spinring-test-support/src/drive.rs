//! Threaded writers and readers over an object ring.
//!
//! Writers put tagged sequences in randomly sized batches, readers take in
//! randomly sized batches and check per-writer ordering. Once every writer
//! has finished, readers drain what is left and stop on the first empty
//! wait.

use std::panic;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::thread::{ self, JoinHandle };

use crossbeam_channel::unbounded;
use rand::Rng;

use spinring::{
    object,
    FailBusyWaitStrategy,
    HintBusyWaitStrategy,
    MetricsSnapshot,
    MultiStepBusyWaitStrategy,
    Side,
    YieldBusyWaitStrategy,
};

use crate::pattern::Pattern;
use crate::verify::{ SequenceChecker, SequenceStats };

pub const MANY_WRITERS: u64 = 3;
pub const MANY_READERS: u64 = 2;

/// A value identifying its writer and its position in that writer's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tagged {
    pub writer: u64,
    pub seq: u64,
}

#[derive(Debug, Clone)]
pub struct DriveReport {
    pub pattern: Pattern,
    pub writers: u64,
    pub readers: u64,
    pub put: u64,
    pub stats: SequenceStats,
    pub metrics: MetricsSnapshot,
}

impl DriveReport {
    pub fn taken(&self) -> u64 {
        self.stats.total_seen
    }

    /// Every put is either taken, overwritten or discarded
    pub fn is_accounted(&self) -> bool {
        self.taken() + self.metrics.overwritten + self.metrics.discarded == self.put
    }
}

/// Run `pattern` over an object ring of `capacity` with `per_writer` values
/// from each writer.
pub fn drive_object_ring(
    pattern: Pattern,
    capacity: usize,
    per_writer: u64,
    max_batch: usize
) -> spinring::Result<DriveReport> {
    let max_batch = max_batch.clamp(1, capacity);
    let read_wait = MultiStepBusyWaitStrategy::end_with(FailBusyWaitStrategy::new(0))
        .after(YieldBusyWaitStrategy, 1_000)
        .after(HintBusyWaitStrategy, 100);
    let config = pattern.config(capacity)?.with_read_wait(read_wait);
    let (writer, reader) = object::ring::<Tagged>(config)?;

    let writers = if pattern.writers.is_many() { MANY_WRITERS } else { 1 };
    let readers = if pattern.readers.is_many() { MANY_READERS } else { 1 };
    let done = Arc::new(AtomicBool::new(false));
    let (results_tx, results_rx) = unbounded();

    let reader_handles = if readers == 1 {
        vec![reader]
    } else {
        (0..readers).map(|_| reader.try_clone()).collect::<spinring::Result<Vec<_>>>()?
    };
    let writer_handles = if writers == 1 {
        vec![writer]
    } else {
        (0..writers).map(|_| writer.try_clone()).collect::<spinring::Result<Vec<_>>>()?
    };

    let reader_threads: Vec<_> = reader_handles
        .into_iter()
        .map(|mut handle| {
            let done = done.clone();
            let results = results_tx.clone();
            thread::spawn(move || {
                let result = read_until_done(&mut handle, &done, max_batch);
                // receiver outlives every reader
                let _ = results.send(result.map(|stats| (stats, handle.metrics())));
            })
        })
        .collect();
    drop(results_tx);

    let writer_threads: Vec<_> = writer_handles
        .into_iter()
        .zip(0u64..)
        .map(|(mut handle, id)| {
            thread::spawn(move || -> spinring::Result<()> {
                let mut rng = rand::thread_rng();
                let mut seq = 0u64;
                while seq < per_writer {
                    let n = (rng.gen_range(1..=max_batch) as u64).min(per_writer - seq);
                    if n == 1 {
                        handle.put(Tagged { writer: id, seq })?;
                    } else {
                        handle.put_batch(
                            (seq..seq + n).map(|s| Tagged { writer: id, seq: s }).collect::<Vec<_>>()
                        )?;
                    }
                    seq += n;
                }
                Ok(())
            })
        })
        .collect();

    let mut first_error = join_writers(writer_threads, &done).err();

    let mut stats = SequenceStats::default();
    let mut metrics = MetricsSnapshot::default();
    for result in results_rx.iter() {
        match result {
            Ok((reader_stats, snapshot)) => {
                stats.merge(&reader_stats);
                metrics = snapshot;
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    for handle in reader_threads {
        // a panicked reader sent nothing; surface its panic
        if let Err(panic) = handle.join() {
            panic::resume_unwind(panic);
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }

    Ok(DriveReport {
        pattern,
        writers,
        readers,
        put: writers * per_writer,
        stats,
        metrics,
    })
}

/// Join every writer, then set `done` so readers drain and stop. A writer
/// panic is resumed on the calling thread once `done` is set.
fn join_writers(
    writers: Vec<JoinHandle<spinring::Result<()>>>,
    done: &AtomicBool
) -> spinring::Result<()> {
    let mut first_error = None;
    let mut writer_panic = None;
    for handle in writers {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                first_error.get_or_insert(err);
            }
            Err(panic) => {
                writer_panic.get_or_insert(panic);
            }
        }
    }
    done.store(true, Ordering::Release);
    if let Some(panic) = writer_panic {
        panic::resume_unwind(panic);
    }
    first_error.map_or(Ok(()), Err)
}

fn read_until_done(
    reader: &mut object::ObjectReader<Tagged>,
    done: &AtomicBool,
    max_batch: usize
) -> spinring::Result<SequenceStats> {
    let mut rng = rand::thread_rng();
    let mut checker = SequenceChecker::new();

    loop {
        let finished = done.load(Ordering::Acquire);
        let n = rng.gen_range(1..=max_batch);
        let taken = if n == 1 {
            reader.take().map(|value| vec![value])
        } else {
            reader.take_batch(n).map(|batch| batch.collect::<Vec<_>>())
        };

        match taken {
            Ok(values) => {
                for value in values {
                    checker.check(value.writer, value.seq);
                }
            }
            Err(err) if err.side() == Some(Side::Read) => {
                if finished {
                    // everything is published; drain single values
                    while let Ok(value) = reader.take() {
                        checker.check(value.writer, value.seq);
                    }
                    return Ok(checker.stats());
                }
            }
            Err(err) => {
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinring::RingError;

    #[test]
    #[should_panic(expected = "writer failed")]
    fn test_writer_panic_is_resumed() {
        let done = AtomicBool::new(false);
        let writers = vec![
            thread::spawn(|| Ok(())),
            thread::spawn(|| -> spinring::Result<()> { panic!("writer failed") })
        ];
        let _ = join_writers(writers, &done);
    }

    #[test]
    fn test_writer_error_is_returned_after_done() {
        let done = AtomicBool::new(false);
        let writers = vec![
            thread::spawn(|| -> spinring::Result<()> { Err(RingError::exhausted(Side::Write, 3)) }),
            thread::spawn(|| Ok(()))
        ];
        let err = join_writers(writers, &done).unwrap_err();
        assert_eq!(err, RingError::exhausted(Side::Write, 3));
        assert!(done.load(Ordering::Acquire));
    }

    #[test]
    fn test_drive_spsc_blocking_is_perfect() {
        let pattern = Pattern {
            writers: spinring::Cardinality::One,
            readers: spinring::Cardinality::One,
            policy: spinring::FullPolicy::Blocking,
            atomic_claim: false,
            memory_order: spinring::MemoryOrder::Opaque,
        };
        let report = drive_object_ring(pattern, 16, 1_000, 4).unwrap();
        assert_eq!(report.taken(), report.put);
        assert!(report.stats.is_perfect());
    }
}
