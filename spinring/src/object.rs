//! Object rings: owned elements moved in by `put` and out by `take`.
//!
//! ```
//! use spinring::{ object, RingBufferConfig };
//!
//! let config = RingBufferConfig::new(4)?.one_writer().one_reader().overwriting();
//! let (mut writer, mut reader) = object::ring::<u32>(config)?;
//! for value in [10, 20, 30, 40, 50] {
//!     writer.put(value)?;
//! }
//! assert_eq!(reader.to_string(), "[20, 30, 40, 50]");
//! assert_eq!(reader.take()?, 20);
//! # Ok::<(), spinring::RingError>(())
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;

use crate::config::{ RingBufferConfig, StorageKind };
use crate::engine::{ Engine, ReadClaim };
use crate::error::{ Result, RingError };
use crate::metrics::MetricsSnapshot;
use crate::wait::BusyWaitStrategy;

struct ObjectRing<T> {
    engine: Engine,
    slots: Box<[UnsafeCell<Option<T>>]>,
    gc_assist: bool,
}

// Slots are only touched by the side that holds the matching claim.
unsafe impl<T: Send> Send for ObjectRing<T> {}
unsafe impl<T: Send> Sync for ObjectRing<T> {}

impl<T> ObjectRing<T> {
    /// Raw slot pointer; dereferencing it requires a claim covering `seq`.
    #[inline(always)]
    fn slot(&self, seq: u64) -> *mut Option<T> {
        let idx = self.engine.index(seq);
        #[cfg(feature = "unsafe-perf")]
        // SAFETY: index() is always below capacity
        let cell = unsafe { self.slots.get_unchecked(idx) };
        #[cfg(not(feature = "unsafe-perf"))]
        let cell = &self.slots[idx];
        cell.get()
    }

    /// # Safety: caller holds a read claim covering `seq`
    #[inline(always)]
    unsafe fn take_slot(&self, seq: u64) -> T {
        match (*self.slot(seq)).take() {
            Some(value) => value,
            None => unreachable!("published slot {} is empty", seq),
        }
    }

    /// Drop elements consumed without being read, if configured to.
    ///
    /// # Safety: caller holds a read claim covering `from..to`
    unsafe fn clear(&self, from: u64, to: u64) {
        if self.gc_assist {
            for seq in from..to {
                *self.slot(seq) = None;
            }
        }
    }

    fn take_claimed(&self, claim: ReadClaim<'_>) -> T {
        // SAFETY: the claim covers skipped..seq + count
        let value = unsafe {
            self.clear(claim.skipped, claim.seq);
            self.take_slot(claim.seq)
        };
        self.engine.release(claim);
        value
    }
}

/// Build an object ring, returning its writer and reader handles.
///
/// Handles of a "many" side can be cloned with `try_clone`.
pub fn ring<T: Send>(config: RingBufferConfig) -> Result<(ObjectWriter<T>, ObjectReader<T>)> {
    let engine = Engine::new(&config, StorageKind::Object)?;
    let slots = (0..config.capacity)
        .map(|_| UnsafeCell::new(None))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let ring = Arc::new(ObjectRing {
        engine,
        slots,
        gc_assist: config.gc_assist,
    });
    Ok((ObjectWriter { ring: ring.clone() }, ObjectReader { ring }))
}

// ============================================================================
// Writer
// ============================================================================

pub struct ObjectWriter<T> {
    ring: Arc<ObjectRing<T>>,
}

impl<T: Send> ObjectWriter<T> {
    /// Add an element. A discarding ring that is full drops `value`.
    #[inline]
    pub fn put(&mut self, value: T) -> Result<()> {
        let ring = &*self.ring;
        let claim = ring.engine.claim_write(1)?;
        if !claim.discarded {
            // SAFETY: the claim gives this writer exclusive use of the slot
            unsafe {
                *ring.slot(claim.seq) = Some(value);
            }
        }
        ring.engine.publish(claim);
        Ok(())
    }

    /// Add several elements with one claim and one publish.
    pub fn put_batch<I>(&mut self, values: I) -> Result<()>
        where I: IntoIterator<Item = T>, I::IntoIter: ExactSizeIterator
    {
        let values = values.into_iter();
        let count = values.len() as u64;
        if count == 0 {
            return Ok(());
        }
        let ring = &*self.ring;
        ring.engine.check_count(count)?;

        let mut claim = ring.engine.claim_write(count)?;
        if !claim.discarded {
            let mut written = 0;
            for value in values.take(count as usize) {
                // SAFETY: seq + written lies inside the claim
                unsafe {
                    *ring.slot(claim.seq + written) = Some(value);
                }
                written += 1;
            }
            claim.count = written;
        }
        ring.engine.publish(claim);
        Ok(())
    }

    pub fn try_clone(&self) -> Result<Self> {
        if !self.ring.engine.writers().is_many() {
            return Err(RingError::unsupported("cloning a writer", self.ring.engine.variant()));
        }
        Ok(Self { ring: self.ring.clone() })
    }

    pub fn capacity(&self) -> usize {
        self.ring.engine.capacity() as usize
    }

    pub fn size(&self) -> usize {
        self.ring.engine.size() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.ring.engine.is_empty()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ring.engine.metrics().snapshot()
    }
}

impl<T> fmt::Debug for ObjectWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectWriter").field("engine", &self.ring.engine).finish()
    }
}

// ============================================================================
// Reader
// ============================================================================

pub struct ObjectReader<T> {
    ring: Arc<ObjectRing<T>>,
}

impl<T: Send> ObjectReader<T> {
    /// Remove the oldest element, spinning until one is published.
    #[inline]
    pub fn take(&mut self) -> Result<T> {
        let ring = &*self.ring;
        let claim = ring.engine.claim_read(1, ring.engine.read_wait())?;
        Ok(ring.take_claimed(claim))
    }

    /// `take` with a one-off busy-wait strategy. Unsupported where readers
    /// wait under a lock.
    pub fn take_with(&mut self, strategy: &dyn BusyWaitStrategy) -> Result<T> {
        let ring = &*self.ring;
        ring.engine.check_wait_override()?;
        let claim = ring.engine.claim_read(1, strategy)?;
        Ok(ring.take_claimed(claim))
    }

    /// Remove the newest element, dropping every older one.
    pub fn take_last(&mut self) -> Result<T> {
        let ring = &*self.ring;
        let claim = ring.engine.claim_last(ring.engine.read_wait())?;
        Ok(ring.take_claimed(claim))
    }

    /// Wait until `size` elements are published and drain them in order.
    ///
    /// The positions are released when the returned iterator is dropped;
    /// elements it did not yield are consumed with it.
    pub fn take_batch(&mut self, size: usize) -> Result<TakeBatch<'_, T>> {
        let ring = &*self.ring;
        ring.engine.check_count(size as u64)?;
        let claim = ring.engine.claim_read(size as u64, ring.engine.read_wait())?;
        let next = claim.seq;
        Ok(TakeBatch {
            ring,
            claim: Some(claim),
            next,
        })
    }

    pub fn try_clone(&self) -> Result<Self> {
        if !self.ring.engine.readers().is_many() {
            return Err(RingError::unsupported("cloning a reader", self.ring.engine.variant()));
        }
        Ok(Self { ring: self.ring.clone() })
    }

    pub fn capacity(&self) -> usize {
        self.ring.engine.capacity() as usize
    }

    pub fn size(&self) -> usize {
        self.ring.engine.size() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.ring.engine.is_empty()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ring.engine.metrics().snapshot()
    }
}

impl<T: Send + Sync> ObjectReader<T> {
    /// Visit the unread elements, oldest first, without consuming them.
    pub fn for_each(&self, mut action: impl FnMut(&T)) {
        let ring = &*self.ring;
        let visible = ring.engine.visible();
        for seq in visible.start..visible.end {
            // SAFETY: published and pinned by `visible`
            if let Some(value) = unsafe { &*ring.slot(seq) } {
                action(value);
            }
        }
    }

    pub fn contains(&self, element: &T) -> bool where T: PartialEq {
        let mut found = false;
        self.for_each(|value| {
            found |= value == element;
        });
        found
    }
}

impl<T: Send + Sync + fmt::Display> fmt::Display for ObjectReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = f.write_str("[");
        let mut first = true;
        self.for_each(|value| {
            if result.is_ok() {
                result = if first { write!(f, "{}", value) } else { write!(f, ", {}", value) };
                first = false;
            }
        });
        result?;
        f.write_str("]")
    }
}

impl<T> fmt::Debug for ObjectReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader").field("engine", &self.ring.engine).finish()
    }
}

/// Draining iterator over a batch claimed by `ObjectReader::take_batch`.
pub struct TakeBatch<'a, T> {
    ring: &'a ObjectRing<T>,
    claim: Option<ReadClaim<'a>>,
    next: u64,
}

impl<T> fmt::Debug for TakeBatch<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TakeBatch").field("next", &self.next).field("end", &self.end()).finish()
    }
}

impl<T> TakeBatch<'_, T> {
    fn end(&self) -> u64 {
        self.claim.as_ref().map_or(self.next, |claim| claim.seq + claim.count)
    }
}

impl<T> Iterator for TakeBatch<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.next >= self.end() {
            return None;
        }
        // SAFETY: next lies inside the claim
        let value = unsafe { self.ring.take_slot(self.next) };
        self.next += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end() - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for TakeBatch<'_, T> {}

impl<T> Drop for TakeBatch<'_, T> {
    fn drop(&mut self) {
        if let Some(claim) = self.claim.take() {
            // SAFETY: the untaken rest of the claim
            unsafe {
                self.ring.clear(self.next, claim.seq + claim.count);
            }
            self.ring.engine.release(claim);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Side;
    use crate::wait::{ FailBusyWaitStrategy, HintBusyWaitStrategy };
    use std::sync::atomic::{ AtomicUsize, Ordering };

    fn spsc(capacity: usize) -> RingBufferConfig {
        RingBufferConfig::new(capacity).unwrap().one_writer().one_reader()
    }

    #[test]
    fn test_fifo() {
        let (mut writer, mut reader) = ring::<u64>(spsc(8)).unwrap();
        for i in 0..5 {
            writer.put(i).unwrap();
        }
        assert_eq!(reader.size(), 5);
        for i in 0..5 {
            assert_eq!(reader.take().unwrap(), i);
        }
        assert!(reader.is_empty());
    }

    #[test]
    fn test_wraps_non_power_of_two() {
        let (mut writer, mut reader) = ring::<u64>(spsc(3)).unwrap();
        for i in 0..20 {
            writer.put(i).unwrap();
            assert_eq!(reader.take().unwrap(), i);
        }
    }

    #[test]
    fn test_overwrite_scenario() {
        let (mut writer, mut reader) = ring::<u32>(spsc(4).overwriting()).unwrap();
        for value in [10, 20, 30, 40, 50] {
            writer.put(value).unwrap();
        }
        assert_eq!(reader.to_string(), "[20, 30, 40, 50]");
        assert_eq!(writer.metrics().overwritten, 1);
        let drained: Vec<_> = (0..4).map(|_| reader.take().unwrap()).collect();
        assert_eq!(drained, vec![20, 30, 40, 50]);
    }

    #[test]
    fn test_discarding_drops_newest() {
        let (mut writer, mut reader) = ring::<u32>(spsc(2).discarding()).unwrap();
        for value in [1, 2, 3] {
            writer.put(value).unwrap();
        }
        assert_eq!(reader.to_string(), "[1, 2]");
        assert_eq!(writer.metrics().discarded, 1);
    }

    #[test]
    fn test_blocking_exhaustion_tags_write() {
        let config = spsc(2).blocking_with(FailBusyWaitStrategy::new(16));
        let (mut writer, reader) = ring::<u32>(config).unwrap();
        writer.put(1).unwrap();
        writer.put(2).unwrap();
        let err = writer.put(3).unwrap_err();
        assert_eq!(err.side(), Some(Side::Write));
        assert_eq!(reader.size(), 2);
    }

    #[test]
    fn test_read_exhaustion_tags_read() {
        let config = spsc(2).with_read_wait(FailBusyWaitStrategy::new(16));
        let (_writer, mut reader) = ring::<u32>(config).unwrap();
        let err = reader.take().unwrap_err();
        assert_eq!(err.side(), Some(Side::Read));
    }

    #[test]
    fn test_display_and_contains() {
        let (mut writer, mut reader) = ring::<u32>(spsc(4)).unwrap();
        assert_eq!(reader.to_string(), "[]");
        writer.put(7).unwrap();
        writer.put(8).unwrap();
        assert!(reader.contains(&8));
        assert!(!reader.contains(&9));
        reader.take().unwrap();
        assert!(!reader.contains(&7));
        assert_eq!(reader.to_string(), "[8]");
    }

    #[test]
    fn test_take_batch_drains_in_order() {
        let (mut writer, mut reader) = ring::<u32>(spsc(4)).unwrap();
        writer.put_batch([1, 2, 3]).unwrap();
        let batch: Vec<_> = reader.take_batch(2).unwrap().collect();
        assert_eq!(batch, vec![1, 2]);
        assert_eq!(reader.size(), 1);
        assert!(reader.take_batch(5).is_err());
        assert!(reader.take_batch(0).unwrap_err().is_misuse());
    }

    #[test]
    fn test_overwriting_writer_gives_up_while_batch_held() {
        let config = spsc(2).overwriting().with_write_wait(FailBusyWaitStrategy::new(8));
        let (mut writer, mut reader) = ring::<u32>(config).unwrap();
        writer.put_batch([1, 2]).unwrap();
        {
            let mut batch = reader.take_batch(2).unwrap();
            let err = writer.put(9).unwrap_err();
            assert_eq!(err.side(), Some(Side::Write));
            assert_eq!(batch.next(), Some(1));
        }
        writer.put(9).unwrap();
        assert_eq!(reader.take().unwrap(), 9);
        assert_eq!(writer.metrics().overwritten, 0);
    }

    #[test]
    fn test_overwriting_writer_resumes_after_batch_release() {
        let (mut writer, mut reader) = ring::<u32>(spsc(2).overwriting()).unwrap();
        writer.put_batch([1, 2]).unwrap();
        let batch = reader.take_batch(2).unwrap();
        std::thread::scope(|s| {
            let handle = s.spawn(|| writer.put(3));
            std::thread::sleep(std::time::Duration::from_millis(10));
            assert_eq!(batch.collect::<Vec<_>>(), vec![1, 2]);
            handle.join().unwrap().unwrap();
        });
        assert_eq!(reader.take().unwrap(), 3);
    }

    #[test]
    fn test_partial_batch_consumes_window() {
        let (mut writer, mut reader) = ring::<u32>(spsc(4)).unwrap();
        writer.put_batch(vec![1, 2, 3]).unwrap();
        {
            let mut batch = reader.take_batch(2).unwrap();
            assert_eq!(batch.next(), Some(1));
        }
        assert_eq!(reader.take().unwrap(), 3);
    }

    #[test]
    fn test_take_last() {
        let (mut writer, mut reader) = ring::<u32>(spsc(8)).unwrap();
        writer.put_batch([1, 2, 3, 4, 5]).unwrap();
        assert_eq!(reader.take_last().unwrap(), 5);
        assert!(reader.is_empty());
    }

    #[derive(Debug)]
    struct Tracked<'a>(&'a AtomicUsize);

    impl Drop for Tracked<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_gc_assist_drops_skipped_now() {
        let drops = AtomicUsize::new(0);
        let (mut writer, mut reader) = ring::<Tracked<'_>>(spsc(4)).unwrap();
        for _ in 0..3 {
            writer.put(Tracked(&drops)).unwrap();
        }
        drop(reader.take_last().unwrap());
        assert_eq!(drops.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_without_gc_assist_skipped_linger() {
        let drops = AtomicUsize::new(0);
        let (mut writer, mut reader) = ring::<Tracked<'_>>(spsc(4).with_gc_assist(false)).unwrap();
        for _ in 0..3 {
            writer.put(Tracked(&drops)).unwrap();
        }
        drop(reader.take_last().unwrap());
        assert_eq!(drops.load(Ordering::Relaxed), 1);
        drop(writer);
        drop(reader);
        assert_eq!(drops.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_try_clone_respects_cardinality() {
        let (writer, reader) = ring::<u32>(spsc(4)).unwrap();
        assert!(writer.try_clone().unwrap_err().is_misuse());
        assert!(reader.try_clone().unwrap_err().is_misuse());

        let config = RingBufferConfig::new(4).unwrap().many_writers().many_readers();
        let (writer, reader) = ring::<u32>(config).unwrap();
        assert!(writer.try_clone().is_ok());
        assert!(reader.try_clone().is_ok());
    }

    #[test]
    fn test_take_with_override() {
        let (mut writer, mut reader) = ring::<u32>(spsc(4)).unwrap();
        writer.put(1).unwrap();
        assert_eq!(reader.take_with(&HintBusyWaitStrategy).unwrap(), 1);
        let err = reader.take_with(&FailBusyWaitStrategy::new(2)).unwrap_err();
        assert_eq!(err.side(), Some(Side::Read));

        let (_, mut locked) = ring::<u32>(spsc(4).overwriting()).unwrap();
        assert!(locked.take_with(&HintBusyWaitStrategy).unwrap_err().is_misuse());
    }
}
