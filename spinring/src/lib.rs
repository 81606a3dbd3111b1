//! Spinring - Fixed-capacity ring buffers
//!
//! Every ring is chosen along four axes: one or many writers, one or many
//! readers, what happens when it is full (overwrite, block or discard) and
//! how slots are stored (owned objects, prefilled reusable elements, or a
//! byte region with typed accessors).
//!
//! ```
//! use spinring::{ object, RingBufferConfig };
//!
//! let config = RingBufferConfig::new(8)?.many_writers().one_reader();
//! let (mut writer, mut reader) = object::ring::<u64>(config)?;
//!
//! let mut second = writer.try_clone()?;
//! writer.put(1)?;
//! second.put(2)?;
//! assert_eq!(reader.take()? + reader.take()?, 3);
//! # Ok::<(), spinring::RingError>(())
//! ```

pub mod config;
pub mod constants;
pub mod cursor;
mod engine;
pub mod error;
pub mod insights;
pub mod local;
pub mod marshalling;
pub mod metrics;
pub mod object;
pub mod prefilled;
pub mod wait;

// Re-export main components
pub use config::{ Cardinality, FullPolicy, RingBufferConfig, StorageKind };
pub use cursor::MemoryOrder;
pub use error::{ Result, RingError, Side };
pub use insights::init_tracy;
pub use local::LocalRingBuffer;
pub use marshalling::{ ByteRegion, HeapRegion };
pub use metrics::{ Metrics, MetricsSnapshot };
pub use wait::{
    BusyWait,
    BusyWaitStrategy,
    FailBusyWaitStrategy,
    HintBusyWaitStrategy,
    MultiStepBusyWaitStrategy,
    NoopBusyWaitStrategy,
    Spin,
    TwoStepBusyWaitStrategy,
    YieldBusyWaitStrategy,
};
