//! Ring buffer configuration.
//!
//! A `RingBufferConfig` names every axis of a ring: capacity, writer and
//! reader cardinality, full-buffer policy, busy-wait strategies, cursor
//! ordering and claim mode. The storage kind is chosen by the constructor
//! the config is handed to (`object::ring`, `prefilled::ring`,
//! `marshalling::ring`), which validates the combination for that kind.

use std::fmt;
use std::sync::Arc;

use crate::constants::{ DEFAULT_CAPACITY, MIN_CAPACITY };
use crate::cursor::MemoryOrder;
use crate::error::{ Result, RingError };
use crate::wait::{ BusyWaitStrategy, HintBusyWaitStrategy };

/// How many threads may use one side of a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    pub fn is_many(self) -> bool {
        self == Cardinality::Many
    }
}

/// What a writer does when the ring has no room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FullPolicy {
    /// Drop the oldest unread data to make room.
    Overwriting,
    /// Spin with the write-side strategy until a reader frees room.
    #[default]
    Blocking,
    /// Drop the incoming data without touching any cursor.
    Discarding,
}

/// Slot storage a ring is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Owned elements moved in by `put` and out by `take`.
    Object,
    /// Elements created once by a filler and reused in place.
    Prefilled,
    /// A byte region written and read with typed accessors.
    Marshalling,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageKind::Object => "object",
            StorageKind::Prefilled => "prefilled",
            StorageKind::Marshalling => "marshalling",
        };
        f.write_str(name)
    }
}

/// Configuration for ring buffer behavior
#[derive(Clone)]
pub struct RingBufferConfig {
    /// Slot count (bytes for marshalling rings)
    pub capacity: usize,
    /// Writer cardinality, required
    pub writers: Option<Cardinality>,
    /// Reader cardinality, required
    pub readers: Option<Cardinality>,
    pub policy: FullPolicy,
    pub read_wait: Arc<dyn BusyWaitStrategy>,
    pub write_wait: Arc<dyn BusyWaitStrategy>,
    /// Ordering used to publish and observe the read and write cursors
    pub memory_order: MemoryOrder,
    /// Many writers claim with compare-and-swap and publish per slot instead
    /// of serializing on a write lock
    pub atomic_claim: bool,
    /// Empty skipped object slots right away instead of when they are reused
    pub gc_assist: bool,
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            writers: None,
            readers: None,
            policy: FullPolicy::default(),
            read_wait: Arc::new(HintBusyWaitStrategy),
            write_wait: Arc::new(HintBusyWaitStrategy),
            memory_order: MemoryOrder::default(),
            atomic_claim: false,
            gc_assist: true,
        }
    }
}

impl fmt::Debug for RingBufferConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBufferConfig")
            .field("capacity", &self.capacity)
            .field("writers", &self.writers)
            .field("readers", &self.readers)
            .field("policy", &self.policy)
            .field("read_wait", &self.read_wait)
            .field("write_wait", &self.write_wait)
            .field("memory_order", &self.memory_order)
            .field("atomic_claim", &self.atomic_claim)
            .field("gc_assist", &self.gc_assist)
            .finish()
    }
}

impl RingBufferConfig {
    /// Create a new configuration with the specified capacity
    pub fn new(capacity: usize) -> Result<Self> {
        check_capacity(capacity)?;
        Ok(Self {
            capacity,
            ..Default::default()
        })
    }

    pub fn with_writers(mut self, writers: Cardinality) -> Self {
        self.writers = Some(writers);
        self
    }

    pub fn with_readers(mut self, readers: Cardinality) -> Self {
        self.readers = Some(readers);
        self
    }

    pub fn one_writer(self) -> Self {
        self.with_writers(Cardinality::One)
    }

    pub fn many_writers(self) -> Self {
        self.with_writers(Cardinality::Many)
    }

    pub fn one_reader(self) -> Self {
        self.with_readers(Cardinality::One)
    }

    pub fn many_readers(self) -> Self {
        self.with_readers(Cardinality::Many)
    }

    pub fn with_policy(mut self, policy: FullPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn overwriting(self) -> Self {
        self.with_policy(FullPolicy::Overwriting)
    }

    pub fn blocking(self) -> Self {
        self.with_policy(FullPolicy::Blocking)
    }

    /// Blocking, with the given strategy on the write side.
    pub fn blocking_with(mut self, strategy: impl BusyWaitStrategy + 'static) -> Self {
        self.write_wait = Arc::new(strategy);
        self.with_policy(FullPolicy::Blocking)
    }

    pub fn discarding(self) -> Self {
        self.with_policy(FullPolicy::Discarding)
    }

    pub fn with_read_wait(mut self, strategy: impl BusyWaitStrategy + 'static) -> Self {
        self.read_wait = Arc::new(strategy);
        self
    }

    pub fn with_write_wait(mut self, strategy: impl BusyWaitStrategy + 'static) -> Self {
        self.write_wait = Arc::new(strategy);
        self
    }

    /// Set the publish ordering. `Plain` cannot publish across threads.
    pub fn with_memory_order(mut self, order: MemoryOrder) -> Result<Self> {
        check_order(order)?;
        self.memory_order = order;
        Ok(self)
    }

    pub fn with_atomic_claim(mut self, atomic_claim: bool) -> Self {
        self.atomic_claim = atomic_claim;
        self
    }

    pub fn with_gc_assist(mut self, gc_assist: bool) -> Self {
        self.gc_assist = gc_assist;
        self
    }

    /// Check the configuration for a ring over `kind` storage and return the
    /// resolved cardinalities.
    pub fn validate(&self, kind: StorageKind) -> Result<(Cardinality, Cardinality)> {
        check_capacity(self.capacity)?;
        check_order(self.memory_order)?;

        let writers = self.writers.ok_or_else(||
            RingError::config("writer cardinality must be set (one or many writers)")
        )?;
        let readers = self.readers.ok_or_else(||
            RingError::config("reader cardinality must be set (one or many readers)")
        )?;

        if writers.is_many() && readers.is_many() && self.policy != FullPolicy::Blocking {
            return Err(
                RingError::config(
                    format!(
                        "many writers with many readers requires the blocking policy, not {:?}",
                        self.policy
                    )
                )
            );
        }

        if kind == StorageKind::Marshalling {
            if !self.capacity.is_power_of_two() {
                return Err(
                    RingError::config(
                        format!(
                            "marshalling capacity must be a power of 2, but is {}",
                            self.capacity
                        )
                    )
                );
            }
            if self.policy == FullPolicy::Overwriting {
                return Err(
                    RingError::config("marshalling rings cannot overwrite variable-length records")
                );
            }
            if self.atomic_claim {
                return Err(RingError::config("marshalling rings claim byte ranges under a lock"));
            }
        }

        if self.atomic_claim {
            if !(writers.is_many() && readers == Cardinality::One) {
                return Err(RingError::config("atomic claim requires many writers and one reader"));
            }
            if self.policy != FullPolicy::Blocking {
                return Err(RingError::config("atomic claim requires the blocking policy"));
            }
            if !self.capacity.is_power_of_two() {
                return Err(
                    RingError::config(
                        format!(
                            "atomic claim capacity must be a power of 2, but is {}",
                            self.capacity
                        )
                    )
                );
            }
        }

        Ok((writers, readers))
    }
}

fn check_capacity(capacity: usize) -> Result<()> {
    if capacity < MIN_CAPACITY {
        return Err(
            RingError::config(
                format!("capacity must be at least {}, but is {}", MIN_CAPACITY, capacity)
            )
        );
    }
    Ok(())
}

fn check_order(order: MemoryOrder) -> Result<()> {
    if !order.publishes() {
        return Err(RingError::config("plain ordering cannot publish cursors across threads"));
    }
    Ok(())
}
