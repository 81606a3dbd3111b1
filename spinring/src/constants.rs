//! Spinring constants
//!
//! Core constants shared by every ring buffer variant.

/// Default ring capacity (power of 2 so every storage kind accepts it)
pub const DEFAULT_CAPACITY: usize = 1024;

/// Smallest capacity that can tell "empty" apart from "full"
pub const MIN_CAPACITY: usize = 2;

/// Alignment used to keep independently written cursors on separate cache lines.
///
/// 128 rather than 64 so adjacent-line prefetching on x86 and the 128B lines
/// on Apple silicon are both covered.
pub const CACHE_LINE_PADDING: usize = 128;

/// Ticks a `FailBusyWaitStrategy` allows when built with `Default`
pub const DEFAULT_TICK_BUDGET: u64 = 1_000_000;

/// Spin ticks before `TwoStepBusyWaitStrategy::default()` switches to yielding
pub const DEFAULT_SPIN_TICKS: u64 = 100;
