//! Metrics for spinring ring buffers.
//!
//! Per-ring counters for the exceptional paths. Normal puts and takes are
//! never counted, so the counters cost nothing until a ring overflows or a
//! bounded wait gives up.

use std::sync::atomic::{ AtomicU64, Ordering };

use crate::error::Side;

/// Counters owned by a single ring
#[derive(Debug)]
pub struct Metrics {
    pub overwritten: AtomicU64,
    pub discarded: AtomicU64,
    pub read_exhausted: AtomicU64,
    pub write_exhausted: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            overwritten: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            read_exhausted: AtomicU64::new(0),
            write_exhausted: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_overwrite(&self, dropped: u64) {
        self.overwritten.fetch_add(dropped, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_discard(&self, requested: u64) {
        self.discarded.fetch_add(requested, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_exhausted(&self, side: Side) {
        match side {
            Side::Read => self.read_exhausted.fetch_add(1, Ordering::Relaxed),
            Side::Write => self.write_exhausted.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            overwritten: self.overwritten.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            read_exhausted: self.read_exhausted.load(Ordering::Relaxed),
            write_exhausted: self.write_exhausted.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Unread elements (or bytes, for marshalling rings) dropped by overwriting
    pub overwritten: u64,
    /// Incoming elements (or bytes) dropped by discarding
    pub discarded: u64,
    pub read_exhausted: u64,
    pub write_exhausted: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "overwritten={} discarded={} read_exhausted={} write_exhausted={}",
            self.overwritten,
            self.discarded,
            self.read_exhausted,
            self.write_exhausted
        )
    }
}
