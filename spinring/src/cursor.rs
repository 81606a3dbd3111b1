//! Cursors: ring positions with a selectable memory-ordering discipline.
//!
//! A cursor is an unbounded `u64` sequence. The slot it designates is
//! `sequence & mask` (or `sequence % capacity` for non power-of-two rings),
//! so cursors never wrap in practice and `write - read` is always the number
//! of in-flight elements.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{ fence, AtomicU64, Ordering };

/// Ordering discipline used when a cursor is published to, or observed from,
/// another thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryOrder {
    /// Relaxed access, only meaningful to the owning thread.
    Plain,
    /// Relaxed cursor access; publish and observe are paired with standalone
    /// release/acquire fences, so spin loops poll with relaxed loads.
    Opaque,
    /// Store-release / load-acquire.
    #[default]
    ReleaseAcquire,
    /// Sequentially consistent loads, stores and read-modify-writes.
    Volatile,
}

impl MemoryOrder {
    #[inline(always)]
    fn load(self) -> Ordering {
        match self {
            MemoryOrder::Plain | MemoryOrder::Opaque => Ordering::Relaxed,
            MemoryOrder::ReleaseAcquire => Ordering::Acquire,
            MemoryOrder::Volatile => Ordering::SeqCst,
        }
    }

    #[inline(always)]
    fn store(self) -> Ordering {
        match self {
            MemoryOrder::Plain | MemoryOrder::Opaque => Ordering::Relaxed,
            MemoryOrder::ReleaseAcquire => Ordering::Release,
            MemoryOrder::Volatile => Ordering::SeqCst,
        }
    }

    /// Ordering for contended read-modify-write paths (never weaker than AcqRel)
    #[inline(always)]
    fn rmw(self) -> Ordering {
        match self {
            MemoryOrder::Volatile => Ordering::SeqCst,
            _ => Ordering::AcqRel,
        }
    }

    /// Whether a cursor with this ordering may publish data to another thread.
    pub fn publishes(self) -> bool {
        !matches!(self, MemoryOrder::Plain)
    }
}

impl fmt::Display for MemoryOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryOrder::Plain => "plain",
            MemoryOrder::Opaque => "opaque",
            MemoryOrder::ReleaseAcquire => "release/acquire",
            MemoryOrder::Volatile => "volatile",
        };
        f.write_str(name)
    }
}

/// A ring position with its ordering discipline.
pub struct Cursor {
    value: AtomicU64,
    order: MemoryOrder,
}

impl Cursor {
    pub const fn new(initial: u64, order: MemoryOrder) -> Self {
        Self {
            value: AtomicU64::new(initial),
            order,
        }
    }

    /// Owner-side read of the staged value.
    #[inline(always)]
    pub fn get_plain(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Observe the cursor from the opposite side.
    #[inline(always)]
    pub fn get(&self) -> u64 {
        let value = self.value.load(self.order.load());
        if self.order == MemoryOrder::Opaque {
            fence(Ordering::Acquire);
        }
        value
    }

    /// Publish the cursor, making every earlier write of this thread visible
    /// to a thread that observes `value`.
    #[inline(always)]
    pub fn set(&self, value: u64) {
        if self.order == MemoryOrder::Opaque {
            fence(Ordering::Release);
        }
        self.value.store(value, self.order.store());
    }

    /// Claim `delta` positions if the cursor still reads `current`.
    #[inline(always)]
    pub fn compare_and_advance(&self, current: u64, delta: u64) -> Result<u64, u64> {
        self.value.compare_exchange_weak(
            current,
            current + delta,
            self.order.rmw(),
            Ordering::Relaxed
        )
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("value", &self.get_plain())
            .field("order", &self.order)
            .finish()
    }
}

/// Cache-line aligned wrapper.
///
/// Every independently written field of a ring (read cursor, write cursor and
/// each cached snapshot) sits in its own `Padded` so that no two of them share
/// a cache line.
#[repr(align(128))]
pub struct Padded<T>(T);

impl<T> Padded<T> {
    pub const fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T> Deref for Padded<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Padded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A locally cached snapshot of the opposite side's cursor.
///
/// Relaxed accesses suffice: every stored value was loaded from a cursor that
/// only moves forward, so any value read back is a lower bound of the real
/// cursor. Compare-and-swap writers store `cached_read` concurrently and may
/// replace a newer snapshot with an older one, which costs at most an extra
/// load of the real cursor.
pub struct CachedCursor(AtomicU64);

impl CachedCursor {
    pub const fn new(initial: u64) -> Self {
        Self(AtomicU64::new(initial))
    }

    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }
}

impl fmt::Debug for CachedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CachedCursor({})", self.get())
    }
}
