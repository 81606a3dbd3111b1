//! Position engine shared by every storage kind.
//!
//! The engine owns the read and write cursors, the cached snapshots of each
//! side, the optional side locks and the full-buffer policy. It hands out
//! position claims and never touches slot contents; storage modules turn a
//! claim into slot or byte access and hand it back to publish or release.
//!
//! | writers | readers | write side | read side |
//! |---------|---------|------------|-----------|
//! | one     | one     | owner      | owner |
//! | many    | one     | write lock, or CAS claim + per-slot stamps | owner |
//! | one     | many    | owner      | read lock |
//! | many    | many    | write lock | read lock (blocking only) |
//!
//! Overwriting rings always carry a read lock: the writer advances the read
//! cursor under it, so no reader can be inside a slot that is being replaced.

use std::fmt;
use std::sync::Arc;

use parking_lot::{ Mutex, MutexGuard };

use crate::config::{ Cardinality, FullPolicy, RingBufferConfig, StorageKind };
use crate::cursor::{ CachedCursor, Cursor, Padded };
use crate::error::{ Result, RingError, Side };
use crate::insights;
use crate::metrics::Metrics;
use crate::wait::{ BusyWait, BusyWaitStrategy };

pub(crate) type SideGuard<'a> = Option<MutexGuard<'a, ()>>;

/// Positions `seq..seq + count` claimed for writing.
pub(crate) struct WriteClaim<'a> {
    pub(crate) seq: u64,
    pub(crate) count: u64,
    /// No room under the discarding policy; nothing may be published.
    pub(crate) discarded: bool,
    _guard: SideGuard<'a>,
}

/// Positions `seq..seq + count` claimed for reading. Positions
/// `skipped..seq` are consumed without being read (`claim_last`).
pub(crate) struct ReadClaim<'a> {
    pub(crate) seq: u64,
    pub(crate) count: u64,
    pub(crate) skipped: u64,
    _guard: SideGuard<'a>,
}

/// Published positions `start..end`, pinned against readers for inspection.
pub(crate) struct Visible<'a> {
    pub(crate) start: u64,
    pub(crate) end: u64,
    _guard: SideGuard<'a>,
}

pub(crate) struct Engine {
    write: Padded<Cursor>,
    read: Padded<Cursor>,
    /// Writer-side snapshot of `read`
    cached_read: Padded<CachedCursor>,
    /// Reader-side snapshot of the published write position
    cached_write: Padded<CachedCursor>,
    /// Per-slot publish stamps for CAS-claimed writers: `seq + 1` once
    /// `seq` is written
    stamps: Option<Box<[Cursor]>>,
    write_lock: Option<Mutex<()>>,
    read_lock: Option<Mutex<()>>,
    capacity: u64,
    mask: Option<u64>,
    policy: FullPolicy,
    kind: StorageKind,
    writers: Cardinality,
    readers: Cardinality,
    read_wait: Arc<dyn BusyWaitStrategy>,
    write_wait: Arc<dyn BusyWaitStrategy>,
    metrics: Metrics,
}

impl Engine {
    pub(crate) fn new(config: &RingBufferConfig, kind: StorageKind) -> Result<Self> {
        let (writers, readers) = config.validate(kind)?;
        let capacity = config.capacity as u64;
        let order = config.memory_order;

        let stamps = config.atomic_claim.then(|| {
            (0..config.capacity).map(|_| Cursor::new(0, order)).collect::<Vec<_>>().into_boxed_slice()
        });
        let write_lock = (writers.is_many() && !config.atomic_claim).then(|| Mutex::new(()));
        let read_lock = (readers.is_many() || config.policy == FullPolicy::Overwriting).then(||
            Mutex::new(())
        );

        insights::record_ring_created(
            match kind {
                StorageKind::Object => "object",
                StorageKind::Prefilled => "prefilled",
                StorageKind::Marshalling => "marshalling",
            },
            config
        );

        Ok(Self {
            write: Padded::new(Cursor::new(0, order)),
            read: Padded::new(Cursor::new(0, order)),
            cached_read: Padded::new(CachedCursor::new(0)),
            cached_write: Padded::new(CachedCursor::new(0)),
            stamps,
            write_lock,
            read_lock,
            capacity,
            mask: config.capacity.is_power_of_two().then_some(capacity - 1),
            policy: config.policy,
            kind,
            writers,
            readers,
            read_wait: config.read_wait.clone(),
            write_wait: config.write_wait.clone(),
            metrics: Metrics::new(),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline(always)]
    pub(crate) fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Slot index of a position
    #[inline(always)]
    pub(crate) fn index(&self, seq: u64) -> usize {
        match self.mask {
            Some(mask) => (seq & mask) as usize,
            None => (seq % self.capacity) as usize,
        }
    }

    pub(crate) fn writers(&self) -> Cardinality {
        self.writers
    }

    pub(crate) fn readers(&self) -> Cardinality {
        self.readers
    }

    pub(crate) fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub(crate) fn read_wait(&self) -> &dyn BusyWaitStrategy {
        &*self.read_wait
    }

    /// Human readable variant name for misuse errors
    pub(crate) fn variant(&self) -> String {
        self.to_string()
    }

    /// Number of published, unread positions.
    pub(crate) fn size(&self) -> u64 {
        // read first: read <= write holds for any later load of write
        let read = self.read.get();
        // CAS writers move `write` at claim time, stamps mark publication
        let write = self.published_end(read);
        write.saturating_sub(read).min(self.capacity)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Per-call wait overrides are only offered where no lock is held while
    /// waiting, since a locked side's strategy is shared by every reader.
    pub(crate) fn check_wait_override(&self) -> Result<()> {
        if self.read_lock.is_some() {
            return Err(RingError::unsupported("a per-call busy-wait strategy", self.variant()));
        }
        Ok(())
    }

    pub(crate) fn check_count(&self, count: u64) -> Result<()> {
        if count == 0 || count > self.capacity {
            return Err(
                RingError::invalid_argument(
                    format!("claim of {} must be between 1 and the capacity {}", count, self.capacity)
                )
            );
        }
        Ok(())
    }

    #[inline]
    fn lock_read(&self) -> SideGuard<'_> {
        self.read_lock.as_ref().map(|lock| lock.lock())
    }

    /// Read lock for an overwriting writer. Readers may hold it across a
    /// caller-held guard, so the writer spins on the write-side strategy
    /// instead of parking.
    fn spin_lock_read(&self) -> Result<SideGuard<'_>> {
        let Some(lock) = &self.read_lock else {
            return Ok(None);
        };
        let mut wait = BusyWait::new(&*self.write_wait, Side::Write);
        loop {
            if let Some(guard) = lock.try_lock() {
                return Ok(Some(guard));
            }
            wait.tick().map_err(|err| self.exhausted(err, &wait))?;
        }
    }

    fn exhausted(&self, err: RingError, wait: &BusyWait<'_>) -> RingError {
        if let Some(side) = err.side() {
            self.metrics.record_exhausted(side);
            insights::record_busy_wait_exhausted(side, wait.ticks());
        }
        err
    }

    // ========================================================================
    // Write side
    // ========================================================================

    /// Claim `count` positions for writing, applying the full-buffer policy.
    ///
    /// On error no cursor has moved.
    #[inline]
    pub(crate) fn claim_write(&self, count: u64) -> Result<WriteClaim<'_>> {
        debug_assert!(count > 0 && count <= self.capacity);
        if self.stamps.is_some() {
            return self.claim_write_cas(count);
        }

        let guard = self.write_lock.as_ref().map(|lock| lock.lock());
        let seq = self.write.get_plain();
        let limit = seq + count;

        let discarded = if self.cached_read.get() + self.capacity < limit {
            !self.make_room(limit)?
        } else {
            false
        };

        Ok(WriteClaim {
            seq,
            count,
            discarded,
            _guard: guard,
        })
    }

    /// Slow path: the cached read position says there is no room for
    /// `limit`. Returns false when the write must be discarded.
    #[cold]
    fn make_room(&self, limit: u64) -> Result<bool> {
        let read = self.read.get();
        self.cached_read.set(read);
        if read + self.capacity >= limit {
            return Ok(true);
        }

        match self.policy {
            FullPolicy::Discarding => {
                let requested = limit - self.write.get_plain();
                self.metrics.record_discard(requested);
                insights::record_discard(requested);
                Ok(false)
            }
            FullPolicy::Blocking => {
                let mut wait = BusyWait::new(&*self.write_wait, Side::Write);
                loop {
                    wait.tick().map_err(|err| self.exhausted(err, &wait))?;
                    let read = self.read.get();
                    if read + self.capacity >= limit {
                        self.cached_read.set(read);
                        return Ok(true);
                    }
                }
            }
            FullPolicy::Overwriting => {
                let _readers = self.spin_lock_read()?;
                let read = self.read.get();
                let floor = limit - self.capacity;
                if read < floor {
                    self.read.set(floor);
                    self.metrics.record_overwrite(floor - read);
                    insights::record_overwrite(floor - read);
                }
                self.cached_read.set(read.max(floor));
                Ok(true)
            }
        }
    }

    /// Lock-free claim for many writers: reserve with compare-and-swap, then
    /// publish each slot through its stamp.
    fn claim_write_cas(&self, count: u64) -> Result<WriteClaim<'_>> {
        let mut wait = BusyWait::new(&*self.write_wait, Side::Write);
        let mut seq = self.write.get();
        loop {
            let limit = seq + count;
            if self.cached_read.get() + self.capacity < limit {
                let read = self.read.get();
                self.cached_read.set(read);
                if read + self.capacity < limit {
                    wait.tick().map_err(|err| self.exhausted(err, &wait))?;
                    seq = self.write.get();
                    continue;
                }
            }
            match self.write.compare_and_advance(seq, count) {
                Ok(_) => {
                    return Ok(WriteClaim {
                        seq,
                        count,
                        discarded: false,
                        _guard: None,
                    });
                }
                Err(actual) => {
                    seq = actual;
                }
            }
        }
    }

    /// Make a claim visible to readers and release the write lock.
    #[inline]
    pub(crate) fn publish(&self, claim: WriteClaim<'_>) {
        if claim.discarded {
            return;
        }
        let end = claim.seq + claim.count;
        match &self.stamps {
            Some(stamps) => {
                for seq in claim.seq..end {
                    stamps[self.index(seq)].set(seq + 1);
                }
            }
            None => self.write.set(end),
        }
    }

    // ========================================================================
    // Read side
    // ========================================================================

    /// Claim the next `count` positions, spinning until they are published.
    #[inline]
    pub(crate) fn claim_read(
        &self,
        count: u64,
        strategy: &dyn BusyWaitStrategy
    ) -> Result<ReadClaim<'_>> {
        debug_assert!(count > 0 && count <= self.capacity);
        let mut wait = BusyWait::new(strategy, Side::Read);
        loop {
            let guard = self.lock_read();
            let seq = self.read.get_plain();
            let limit = seq + count;
            if self.cached_write.get() < limit {
                if guard.is_some() && count > 1 {
                    // batch waits leave the lock to other readers and
                    // overwriting writers
                    let write = self.published_end(seq);
                    self.cached_write.set(write);
                    if write < limit {
                        drop(guard);
                        wait.tick().map_err(|err| self.exhausted(err, &wait))?;
                        continue;
                    }
                } else {
                    self.wait_published(seq, limit, &mut wait)?;
                }
            }

            return Ok(ReadClaim {
                seq,
                count,
                skipped: seq,
                _guard: guard,
            });
        }
    }

    /// Claim only the newest published position, consuming everything
    /// older.
    pub(crate) fn claim_last(&self, strategy: &dyn BusyWaitStrategy) -> Result<ReadClaim<'_>> {
        let mut wait = BusyWait::new(strategy, Side::Read);
        let guard = self.lock_read();
        let skipped = self.read.get_plain();
        if self.cached_write.get() <= skipped {
            self.wait_published(skipped, skipped + 1, &mut wait)?;
        }
        let end = self.published_end(skipped + 1);
        self.cached_write.set(end);

        Ok(ReadClaim {
            seq: end - 1,
            count: 1,
            skipped,
            _guard: guard,
        })
    }

    /// Spin until every position below `limit` is published.
    fn wait_published(&self, seq: u64, limit: u64, wait: &mut BusyWait<'_>) -> Result<()> {
        match &self.stamps {
            Some(stamps) => {
                let from = seq.max(self.cached_write.get());
                for pos in from..limit {
                    let stamp = &stamps[self.index(pos)];
                    while stamp.get() != pos + 1 {
                        wait.tick().map_err(|err| self.exhausted(err, wait))?;
                    }
                }
                self.cached_write.set(limit);
            }
            None => {
                let mut write = self.write.get();
                while write < limit {
                    wait.tick().map_err(|err| self.exhausted(err, wait))?;
                    write = self.write.get();
                }
                self.cached_write.set(write);
            }
        }
        Ok(())
    }

    /// End of the contiguous published range, given that everything below
    /// `from` is known to be published.
    fn published_end(&self, from: u64) -> u64 {
        match &self.stamps {
            Some(stamps) => {
                let claimed = self.write.get();
                let mut end = from;
                while end < claimed && stamps[self.index(end)].get() == end + 1 {
                    end += 1;
                }
                end
            }
            None => self.write.get().max(from),
        }
    }

    /// Consume a read claim and release the read lock.
    #[inline]
    pub(crate) fn release(&self, claim: ReadClaim<'_>) {
        self.read.set(claim.seq + claim.count);
    }

    /// Pin the published range for iteration.
    pub(crate) fn visible(&self) -> Visible<'_> {
        let guard = self.lock_read();
        let start = self.read.get();
        let end = self.published_end(start);
        Visible {
            start,
            end,
            _guard: guard,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |cardinality: Cardinality| {
            match cardinality {
                Cardinality::One => "one",
                Cardinality::Many => "many",
            }
        };
        write!(
            f,
            "{} {} ring with {} writer(s) and {} reader(s)",
            format!("{:?}", self.policy).to_lowercase(),
            self.kind,
            side(self.writers),
            side(self.readers)
        )
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("capacity", &self.capacity)
            .field("write", &*self.write)
            .field("read", &*self.read)
            .field("policy", &self.policy)
            .field("writers", &self.writers)
            .field("readers", &self.readers)
            .finish()
    }
}
