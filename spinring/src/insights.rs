//! Insights - Observability for spinring.
//!
//! Tracing hooks for the slow paths of the ring buffers: construction,
//! overwrites, discards and exhausted busy waits. Zero-cost when disabled;
//! the hot paths never call into this module.
//!
//! # Usage
//!
//! ## Basic tracing (console output)
//! ```toml
//! spinring = { version = "0.1", features = ["tracing"] }
//! ```
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! ## Tracy profiler (real-time visualization)
//! ```toml
//! spinring = { version = "0.1", features = ["tracy"] }
//! ```
//! ```rust,ignore
//! spinring::init_tracy();
//! ```

use crate::config::RingBufferConfig;
use crate::error::Side;

/// Initialize Tracy profiler (call once at startup).
///
/// Returns false if a global subscriber was already installed.
#[cfg(feature = "tracy")]
pub fn init_tracy() -> bool {
    use tracing_subscriber::layer::SubscriberExt;
    tracing::subscriber
        ::set_global_default(
            tracing_subscriber::registry().with(tracing_tracy::TracyLayer::default())
        )
        .is_ok()
}

#[cfg(not(feature = "tracy"))]
pub fn init_tracy() -> bool {
    false
}

/// Record construction of a ring
#[cfg(feature = "tracing")]
#[inline]
pub fn record_ring_created(kind: &'static str, config: &RingBufferConfig) {
    tracing::debug!(
        kind,
        capacity = config.capacity,
        writers = ?config.writers,
        readers = ?config.readers,
        policy = ?config.policy,
        order = ?config.memory_order,
        atomic_claim = config.atomic_claim,
        "ring buffer created"
    );
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_ring_created(_kind: &'static str, _config: &RingBufferConfig) {}

/// Record unread positions dropped to make room for a write
#[cfg(feature = "tracing")]
#[inline]
pub fn record_overwrite(dropped: u64) {
    let _span = tracing::debug_span!("overwrite", dropped).entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_overwrite(_dropped: u64) {}

/// Record an incoming write dropped because the ring was full
#[cfg(feature = "tracing")]
#[inline]
pub fn record_discard(requested: u64) {
    let _span = tracing::trace_span!("discard", requested).entered();
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_discard(_requested: u64) {}

/// Record a busy wait that ran out of ticks
#[cfg(feature = "tracing")]
#[inline]
pub fn record_busy_wait_exhausted(side: Side, ticks: u64) {
    tracing::warn!(%side, ticks, "busy wait exhausted");
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn record_busy_wait_exhausted(_side: Side, _ticks: u64) {}
