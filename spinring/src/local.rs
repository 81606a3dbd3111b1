//! Single-thread ring buffer.
//!
//! Same positions and full-buffer policies as the concurrent rings, without
//! cursors or locks: every operation takes `&mut self`. Blocking has no
//! meaning on one thread, so only overwriting and discarding are accepted.

use std::fmt;

use crate::config::FullPolicy;
use crate::constants::MIN_CAPACITY;
use crate::error::{ Result, RingError };

pub struct LocalRingBuffer<T> {
    slots: Box<[Option<T>]>,
    capacity: u64,
    policy: FullPolicy,
    read: u64,
    write: u64,
}

impl<T> LocalRingBuffer<T> {
    pub fn new(capacity: usize, policy: FullPolicy) -> Result<Self> {
        if capacity < MIN_CAPACITY {
            return Err(
                RingError::config(
                    format!("capacity must be at least {}, but is {}", MIN_CAPACITY, capacity)
                )
            );
        }
        if policy == FullPolicy::Blocking {
            return Err(RingError::config("a local ring cannot block, use overwriting or discarding"));
        }
        Ok(Self {
            slots: (0..capacity).map(|_| None).collect(),
            capacity: capacity as u64,
            policy,
            read: 0,
            write: 0,
        })
    }

    pub fn overwriting(capacity: usize) -> Result<Self> {
        Self::new(capacity, FullPolicy::Overwriting)
    }

    pub fn discarding(capacity: usize) -> Result<Self> {
        Self::new(capacity, FullPolicy::Discarding)
    }

    #[inline]
    fn index(&self, seq: u64) -> usize {
        (seq % self.capacity) as usize
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub fn policy(&self) -> FullPolicy {
        self.policy
    }

    /// Append `value`. Returns false if it was discarded.
    pub fn put(&mut self, value: T) -> bool {
        if self.write - self.read == self.capacity {
            if self.policy == FullPolicy::Discarding {
                return false;
            }
            self.read += 1;
        }
        let idx = self.index(self.write);
        self.slots[idx] = Some(value);
        self.write += 1;
        true
    }

    pub fn take(&mut self) -> Option<T> {
        if self.read == self.write {
            return None;
        }
        let idx = self.index(self.read);
        self.read += 1;
        self.slots[idx].take()
    }

    /// Move up to `dst.len()` oldest elements into `dst`, returning how many.
    pub fn fill(&mut self, dst: &mut [T]) -> usize {
        let mut filled = 0;
        for out in dst.iter_mut() {
            match self.take() {
                Some(value) => {
                    *out = value;
                    filled += 1;
                }
                None => {
                    break;
                }
            }
        }
        filled
    }

    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        for seq in self.read..self.write {
            if let Some(value) = &self.slots[self.index(seq)] {
                f(value);
            }
        }
    }

    pub fn contains(&self, value: &T) -> bool where T: PartialEq {
        (self.read..self.write).any(|seq| self.slots[self.index(seq)].as_ref() == Some(value))
    }

    pub fn size(&self) -> usize {
        (self.write - self.read) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    pub fn clear(&mut self) {
        while self.take().is_some() {}
    }
}

impl<T: fmt::Display> fmt::Display for LocalRingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        let mut first = true;
        let mut result = Ok(());
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

impl<T> fmt::Debug for LocalRingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRingBuffer")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("read", &self.read)
            .field("write", &self.write)
            .finish()
    }
}
