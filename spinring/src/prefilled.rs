//! Prefilled rings: slots hold long-lived elements reused in place.
//!
//! Every slot is created once by a filler when the ring is built. Writers
//! claim a slot (its key is the slot index), mutate the element through the
//! returned [`WriteSlot`] and publish it; readers look at the element in
//! place through a [`ReadSlot`] and release it. Nothing is allocated or
//! dropped on the hot path.
//!
//! A full discarding ring hands out a dummy element instead of a real slot.
//! Writes to it are lost; [`WriteSlot::is_discarded`] tells the two apart.

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{ Deref, DerefMut };
use std::sync::Arc;

use crate::config::{ RingBufferConfig, StorageKind };
use crate::engine::{ Engine, ReadClaim, WriteClaim };
use crate::error::{ Result, RingError };
use crate::metrics::MetricsSnapshot;
use crate::wait::BusyWaitStrategy;

struct PrefilledRing<T> {
    engine: Engine,
    slots: Box<[UnsafeCell<T>]>,
    /// Handed out by discarding claims; guarded by the writer's exclusivity
    dummy: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for PrefilledRing<T> {}
unsafe impl<T: Send> Sync for PrefilledRing<T> {}

impl<T> PrefilledRing<T> {
    #[inline(always)]
    fn slot(&self, seq: u64) -> *mut T {
        let idx = self.engine.index(seq);
        #[cfg(feature = "unsafe-perf")]
        // SAFETY: index() is always below capacity
        let cell = unsafe { self.slots.get_unchecked(idx) };
        #[cfg(not(feature = "unsafe-perf"))]
        let cell = &self.slots[idx];
        cell.get()
    }
}

/// Build a prefilled ring whose slots (and dummy element) come from `filler`.
pub fn ring<T, F>(
    config: RingBufferConfig,
    mut filler: F
) -> Result<(PrefilledWriter<T>, PrefilledReader<T>)>
    where T: Send, F: FnMut() -> T
{
    let engine = Engine::new(&config, StorageKind::Prefilled)?;
    let slots = (0..config.capacity)
        .map(|_| UnsafeCell::new(filler()))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let ring = Arc::new(PrefilledRing {
        engine,
        slots,
        dummy: UnsafeCell::new(filler()),
    });
    Ok((PrefilledWriter { ring: ring.clone() }, PrefilledReader { ring }))
}

/// Prefilled ring whose slots start as `T::default()`.
pub fn ring_default<T: Send + Default>(
    config: RingBufferConfig
) -> Result<(PrefilledWriter<T>, PrefilledReader<T>)> {
    ring(config, T::default)
}

// ============================================================================
// Writer
// ============================================================================

pub struct PrefilledWriter<T> {
    ring: Arc<PrefilledRing<T>>,
}

impl<T: Send> PrefilledWriter<T> {
    /// Claim the next slot for in-place mutation.
    ///
    /// The slot is published by [`WriteSlot::put`] or when it is dropped.
    #[inline]
    pub fn next(&mut self) -> Result<WriteSlot<'_, T>> {
        let ring = &*self.ring;
        let claim = ring.engine.claim_write(1)?;
        Ok(WriteSlot {
            ring,
            claim: Some(claim),
        })
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

impl<T> fmt::Debug for PrefilledWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefilledWriter").field("engine", &self.ring.engine).finish()
    }
}

/// A claimed slot (or the dummy element, when discarded).
pub struct WriteSlot<'a, T> {
    ring: &'a PrefilledRing<T>,
    claim: Option<WriteClaim<'a>>,
}

impl<T> WriteSlot<'_, T> {
    /// Slot index, or `None` for the dummy element
    pub fn key(&self) -> Option<usize> {
        match &self.claim {
            Some(claim) if !claim.discarded => Some(self.ring.engine.index(claim.seq)),
            _ => None,
        }
    }

    pub fn is_discarded(&self) -> bool {
        self.key().is_none()
    }

    /// Publish the slot.
    pub fn put(self) {}

    fn target(&self) -> *mut T {
        match &self.claim {
            Some(claim) if !claim.discarded => self.ring.slot(claim.seq),
            _ => self.ring.dummy.get(),
        }
    }
}

impl<T> Deref for WriteSlot<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the claim (or writer exclusivity for the dummy) pins the target
        unsafe { &*self.target() }
    }
}

impl<T> DerefMut for WriteSlot<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above, and no reader sees the slot before publish
        unsafe { &mut *self.target() }
    }
}

impl<T> Drop for WriteSlot<'_, T> {
    fn drop(&mut self) {
        if let Some(claim) = self.claim.take() {
            self.ring.engine.publish(claim);
        }
    }
}

// ============================================================================
// Reader
// ============================================================================

pub struct PrefilledReader<T> {
    ring: Arc<PrefilledRing<T>>,
}

impl<T: Send> PrefilledReader<T> {
    /// Wait for the next published slot. It is released when the returned
    /// guard is dropped.
    #[inline]
    pub fn take(&mut self) -> Result<ReadSlot<'_, T>> {
        let ring = &*self.ring;
        let claim = ring.engine.claim_read(1, ring.engine.read_wait())?;
        Ok(ReadSlot { ring, claim: Some(claim) })
    }

    /// `take` with a one-off busy-wait strategy. Unsupported where readers
    /// wait under a lock.
    pub fn take_with(&mut self, strategy: &dyn BusyWaitStrategy) -> Result<ReadSlot<'_, T>> {
        let ring = &*self.ring;
        ring.engine.check_wait_override()?;
        let claim = ring.engine.claim_read(1, strategy)?;
        Ok(ReadSlot { ring, claim: Some(claim) })
    }

    /// The newest published slot; every older one is consumed with it.
    pub fn take_last(&mut self) -> Result<ReadSlot<'_, T>> {
        let ring = &*self.ring;
        let claim = ring.engine.claim_last(ring.engine.read_wait())?;
        Ok(ReadSlot { ring, claim: Some(claim) })
    }

    /// Wait until `size` slots are published and hold them as one window.
    ///
    /// On a many-readers ring the read lock is held for the lifetime of the
    /// window, so its elements can be walked with `take_plain` without
    /// further synchronization. Dropping the window advances past all of it.
    pub fn take_batch(&mut self, size: usize) -> Result<BatchRead<'_, T>> {
        let ring = &*self.ring;
        ring.engine.check_count(size as u64)?;
        let claim = ring.engine.claim_read(size as u64, ring.engine.read_wait())?;
        let next = claim.seq;
        Ok(BatchRead { ring, claim: Some(claim), next })
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

impl<T: Send + Sync> PrefilledReader<T> {
    /// Visit the unread elements, oldest first, without consuming them.
    pub fn for_each(&self, mut action: impl FnMut(&T)) {
        let ring = &*self.ring;
        let visible = ring.engine.visible();
        for seq in visible.start..visible.end {
            // SAFETY: published and pinned by `visible`
            action(unsafe { &*ring.slot(seq) });
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

impl<T: Send + Sync + fmt::Display> fmt::Display for PrefilledReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        self.for_each(|value| parts.push(value.to_string()));
        write!(f, "[{}]", parts.join(", "))
    }
}

impl<T> fmt::Debug for PrefilledReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefilledReader").field("engine", &self.ring.engine).finish()
    }
}

/// A published slot being read in place.
pub struct ReadSlot<'a, T> {
    ring: &'a PrefilledRing<T>,
    claim: Option<ReadClaim<'a>>,
}

impl<T> ReadSlot<'_, T> {
    pub fn key(&self) -> usize {
        self.claim.as_ref().map_or(0, |claim| self.ring.engine.index(claim.seq))
    }
}

impl<T> Deref for ReadSlot<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        let seq = self.claim.as_ref().map_or(0, |claim| claim.seq);
        // SAFETY: the claim keeps writers off this slot until drop
        unsafe { &*self.ring.slot(seq) }
    }
}

impl<T> Drop for ReadSlot<'_, T> {
    fn drop(&mut self) {
        if let Some(claim) = self.claim.take() {
            self.ring.engine.release(claim);
        }
    }
}

/// A window of published slots claimed by `take_batch`.
pub struct BatchRead<'a, T> {
    ring: &'a PrefilledRing<T>,
    claim: Option<ReadClaim<'a>>,
    next: u64,
}

impl<'a, T> BatchRead<'a, T> {
    fn bounds(&self) -> (u64, u64) {
        self.claim.as_ref().map_or((0, 0), |claim| (claim.seq, claim.seq + claim.count))
    }

    pub fn len(&self) -> usize {
        let (start, end) = self.bounds();
        (end - start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next element of the window, in order.
    pub fn take_plain(&mut self) -> Option<&T> {
        let (_, end) = self.bounds();
        if self.next >= end {
            return None;
        }
        let seq = self.next;
        self.next += 1;
        // SAFETY: seq lies inside the claim
        Some(unsafe { &*self.ring.slot(seq) })
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let (start, end) = self.bounds();
        // SAFETY: every position lies inside the claim
        (start..end).map(move |seq| unsafe { &*self.ring.slot(seq) })
    }

    /// Release the whole window.
    pub fn advance_batch(self) {}
}

impl<T> Drop for BatchRead<'_, T> {
    fn drop(&mut self) {
        if let Some(claim) = self.claim.take() {
            self.ring.engine.release(claim);
        }
    }
}
