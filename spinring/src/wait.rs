//! Busy-wait strategies
//!
//! A strategy decides what a side does between two failed polls of the
//! opposite cursor. Strategies are stateless and shared; the per-wait tick
//! counter lives in [`BusyWait`], which the ring creates (and resets) at the
//! start of every wait episode. No strategy parks the thread on a kernel
//! primitive.

use std::fmt;
use std::sync::Arc;
use std::thread;

use crate::constants::{ DEFAULT_SPIN_TICKS, DEFAULT_TICK_BUDGET };
use crate::error::{ Result, RingError, Side };

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spin {
    Continue,
    GiveUp,
}

/// Trait for spin policies invoked between unsuccessful poll attempts
pub trait BusyWaitStrategy: Send + Sync + fmt::Debug {
    /// Called after the `tick`-th failed poll of the current wait (starting at 1).
    fn tick(&self, tick: u64) -> Spin;
}

impl<S: BusyWaitStrategy + ?Sized> BusyWaitStrategy for Arc<S> {
    #[inline]
    fn tick(&self, tick: u64) -> Spin {
        (**self).tick(tick)
    }
}

/// One wait episode: a strategy plus the tick counter for this wait.
pub struct BusyWait<'a> {
    strategy: &'a dyn BusyWaitStrategy,
    side: Side,
    ticks: u64,
}

impl<'a> BusyWait<'a> {
    pub fn new(strategy: &'a dyn BusyWaitStrategy, side: Side) -> Self {
        Self { strategy, side, ticks: 0 }
    }

    pub fn reset(&mut self) {
        self.ticks = 0;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Record a failed poll. Fails once the strategy gives up.
    #[inline]
    pub fn tick(&mut self) -> Result<()> {
        self.ticks += 1;
        match self.strategy.tick(self.ticks) {
            Spin::Continue => Ok(()),
            Spin::GiveUp => Err(RingError::exhausted(self.side, self.ticks)),
        }
    }
}

// ============================================================================
// Spinning strategies
// ============================================================================

/// Spin with a CPU pause hint. The default for both sides.
#[derive(Debug, Clone, Copy, Default)]
pub struct HintBusyWaitStrategy;

impl BusyWaitStrategy for HintBusyWaitStrategy {
    #[inline]
    fn tick(&self, _tick: u64) -> Spin {
        std::hint::spin_loop();
        Spin::Continue
    }
}

/// Spin without any hint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBusyWaitStrategy;

impl BusyWaitStrategy for NoopBusyWaitStrategy {
    #[inline]
    fn tick(&self, _tick: u64) -> Spin {
        Spin::Continue
    }
}

/// Give the rest of the time slice back to the scheduler on every tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct YieldBusyWaitStrategy;

impl BusyWaitStrategy for YieldBusyWaitStrategy {
    #[inline]
    fn tick(&self, _tick: u64) -> Spin {
        thread::yield_now();
        Spin::Continue
    }
}

// ============================================================================
// Composed strategies
// ============================================================================

/// Spin for a number of ticks, then yield.
#[derive(Debug, Clone, Copy)]
pub struct TwoStepBusyWaitStrategy {
    spin_ticks: u64,
}

impl TwoStepBusyWaitStrategy {
    pub fn new(spin_ticks: u64) -> Self {
        Self { spin_ticks }
    }
}

impl Default for TwoStepBusyWaitStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_SPIN_TICKS)
    }
}

impl BusyWaitStrategy for TwoStepBusyWaitStrategy {
    #[inline]
    fn tick(&self, tick: u64) -> Spin {
        if tick <= self.spin_ticks {
            std::hint::spin_loop();
        } else {
            thread::yield_now();
        }
        Spin::Continue
    }
}

/// Runs a sequence of strategies, each for a fixed number of ticks, then a
/// final strategy for the rest of the wait.
///
/// ```
/// use spinring::wait::*;
///
/// // 100 hinted spins, then 10 yields, then give up
/// let strategy = MultiStepBusyWaitStrategy::end_with(FailBusyWaitStrategy::new(0))
///     .after(YieldBusyWaitStrategy, 10)
///     .after(HintBusyWaitStrategy, 100);
/// assert_eq!(strategy.tick(111), Spin::GiveUp);
/// ```
#[derive(Debug, Clone)]
pub struct MultiStepBusyWaitStrategy {
    /// Steps in execution order with the tick at which each one ends.
    steps: Vec<(Arc<dyn BusyWaitStrategy>, u64)>,
    last: Arc<dyn BusyWaitStrategy>,
}

impl MultiStepBusyWaitStrategy {
    pub fn end_with(last: impl BusyWaitStrategy + 'static) -> Self {
        Self {
            steps: Vec::new(),
            last: Arc::new(last),
        }
    }

    /// Run `step` for `ticks` ticks before everything added so far.
    pub fn after(mut self, step: impl BusyWaitStrategy + 'static, ticks: u64) -> Self {
        for (_, end) in self.steps.iter_mut() {
            *end += ticks;
        }
        self.steps.insert(0, (Arc::new(step), ticks));
        self
    }

    fn steps_total(&self) -> u64 {
        self.steps.last().map_or(0, |(_, end)| *end)
    }
}

impl BusyWaitStrategy for MultiStepBusyWaitStrategy {
    fn tick(&self, tick: u64) -> Spin {
        let mut start = 0;
        for (step, end) in &self.steps {
            if tick <= *end {
                return step.tick(tick - start);
            }
            start = *end;
        }
        self.last.tick(tick - self.steps_total())
    }
}

/// Spins with a hint and gives up after `max_ticks` failed polls.
#[derive(Debug, Clone, Copy)]
pub struct FailBusyWaitStrategy {
    max_ticks: u64,
}

impl FailBusyWaitStrategy {
    pub fn new(max_ticks: u64) -> Self {
        Self { max_ticks }
    }

    pub fn max_ticks(&self) -> u64 {
        self.max_ticks
    }
}

impl Default for FailBusyWaitStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_BUDGET)
    }
}

impl BusyWaitStrategy for FailBusyWaitStrategy {
    #[inline]
    fn tick(&self, tick: u64) -> Spin {
        if tick > self.max_ticks {
            return Spin::GiveUp;
        }
        std::hint::spin_loop();
        Spin::Continue
    }
}
