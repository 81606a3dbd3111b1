//! Marshalling rings: a byte region with typed put/get at offsets.
//!
//! Writers claim a byte range with `next(size)`, marshal primitive values
//! into it at absolute offsets and publish it with `put()`. Readers claim
//! `take(size)` bytes, read them back and release them with `advance()`.
//! Offsets are ring positions: they grow without bound and are masked into
//! the region, and a value that straddles the end of the region wraps to its
//! start.
//!
//! ```
//! use spinring::marshalling::{ self, offsets };
//! use spinring::RingBufferConfig;
//!
//! let config = RingBufferConfig::new(64)?.one_writer().one_reader();
//! let (mut writer, mut reader) = marshalling::ring(config)?;
//!
//! let mut claim = writer.next(offsets::INT + offsets::LONG)?;
//! let offset = claim.offset();
//! claim.write_i32(offset, 7);
//! claim.write_i64(offset + offsets::INT as u64, -1);
//! claim.put();
//!
//! let claim = reader.take(offsets::INT + offsets::LONG)?;
//! let offset = claim.offset();
//! assert_eq!(claim.read_i32(offset), 7);
//! assert_eq!(claim.read_i64(offset + offsets::INT as u64), -1);
//! claim.advance();
//! # Ok::<(), spinring::RingError>(())
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;

use bytemuck::Pod;

use crate::config::{ RingBufferConfig, StorageKind };
use crate::engine::{ self, Engine };
use crate::error::{ Result, RingError };
use crate::metrics::MetricsSnapshot;

/// Byte widths of the typed accessors
pub mod offsets {
    pub const BYTE: usize = 1;
    pub const BOOLEAN: usize = 1;
    pub const SHORT: usize = 2;
    pub const CHAR: usize = 4;
    pub const INT: usize = 4;
    pub const FLOAT: usize = 4;
    pub const LONG: usize = 8;
    pub const DOUBLE: usize = 8;
}

// ============================================================================
// Byte region
// ============================================================================

/// Raw memory a marshalling ring is laid over.
///
/// # Safety
///
/// `len` must be constant and both accessors must copy exactly the requested
/// bytes at `offset..offset + len` with no other side effects. The ring
/// guarantees the range is in bounds and that no other thread accesses it
/// concurrently.
pub unsafe trait ByteRegion: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Safety: `offset + src.len() <= len()`, no concurrent access to the range
    unsafe fn write_bytes(&self, offset: usize, src: &[u8]);

    /// # Safety: `offset + dst.len() <= len()`, no concurrent writes to the range
    unsafe fn read_bytes(&self, offset: usize, dst: &mut [u8]);
}

/// Heap-allocated byte region.
pub struct HeapRegion {
    bytes: Box<[UnsafeCell<u8>]>,
}

impl HeapRegion {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: (0..len).map(|_| UnsafeCell::new(0)).collect::<Vec<_>>().into_boxed_slice(),
        }
    }

    fn base(&self) -> *mut u8 {
        // UnsafeCell<u8> is repr(transparent)
        self.bytes.as_ptr() as *mut u8
    }
}

unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

unsafe impl ByteRegion for HeapRegion {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline(always)]
    unsafe fn write_bytes(&self, offset: usize, src: &[u8]) {
        debug_assert!(offset + src.len() <= self.bytes.len());
        std::ptr::copy_nonoverlapping(src.as_ptr(), self.base().add(offset), src.len());
    }

    #[inline(always)]
    unsafe fn read_bytes(&self, offset: usize, dst: &mut [u8]) {
        debug_assert!(offset + dst.len() <= self.bytes.len());
        std::ptr::copy_nonoverlapping(self.base().add(offset), dst.as_mut_ptr(), dst.len());
    }
}

impl fmt::Debug for HeapRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapRegion").field("len", &self.bytes.len()).finish()
    }
}

// ============================================================================
// Ring
// ============================================================================

struct MarshallingRing<R> {
    engine: Engine,
    region: R,
}

impl<R: ByteRegion> MarshallingRing<R> {
    /// # Safety: the caller's claim covers `pos..pos + src.len()`
    #[inline]
    unsafe fn write_at(&self, pos: u64, src: &[u8]) {
        let idx = self.engine.index(pos);
        let first = src.len().min(self.region.len() - idx);
        self.region.write_bytes(idx, &src[..first]);
        if first < src.len() {
            self.region.write_bytes(0, &src[first..]);
        }
    }

    /// # Safety: the caller's claim covers `pos..pos + dst.len()`
    #[inline]
    unsafe fn read_at(&self, pos: u64, dst: &mut [u8]) {
        let idx = self.engine.index(pos);
        let first = dst.len().min(self.region.len() - idx);
        self.region.read_bytes(idx, &mut dst[..first]);
        if first < dst.len() {
            self.region.read_bytes(0, &mut dst[first..]);
        }
    }
}

/// Whether `offset..offset + len` lies inside `start..end`.
#[inline]
fn within(start: u64, end: u64, offset: u64, len: usize) -> bool {
    offset >= start && offset.checked_add(len as u64).map_or(false, |last| last <= end)
}

/// Build a marshalling ring over a fresh heap region of `config.capacity` bytes.
pub fn ring(
    config: RingBufferConfig
) -> Result<(MarshallingWriter<HeapRegion>, MarshallingReader<HeapRegion>)> {
    let region = HeapRegion::new(config.capacity);
    ring_with_region(config, region)
}

/// Build a marshalling ring over a caller-supplied region.
pub fn ring_with_region<R: ByteRegion>(
    config: RingBufferConfig,
    region: R
) -> Result<(MarshallingWriter<R>, MarshallingReader<R>)> {
    if region.len() != config.capacity {
        return Err(
            RingError::config(
                format!(
                    "region length {} does not match capacity {}",
                    region.len(),
                    config.capacity
                )
            )
        );
    }
    let engine = Engine::new(&config, StorageKind::Marshalling)?;
    let ring = Arc::new(MarshallingRing { engine, region });
    Ok((MarshallingWriter { ring: ring.clone() }, MarshallingReader { ring }))
}

/// Typed accessors over `write_pod`/`read_pod`.
macro_rules! typed_access {
    (write: $($name:ident => $ty:ty),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(&mut self, offset: u64, value: $ty) {
                self.write_pod(offset, &value);
            }
        )*
    };
    (read: $($name:ident => $ty:ty),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(&self, offset: u64) -> $ty {
                self.read_pod(offset)
            }
        )*
    };
}

// ============================================================================
// Writer
// ============================================================================

pub struct MarshallingWriter<R: ByteRegion = HeapRegion> {
    ring: Arc<MarshallingRing<R>>,
}

impl<R: ByteRegion> MarshallingWriter<R> {
    /// Claim `size` bytes. On a full discarding ring the claim is discarded:
    /// writes into it are ignored and `put` publishes nothing.
    #[inline]
    pub fn next(&mut self, size: usize) -> Result<ByteWriteClaim<'_, R>> {
        let ring = &*self.ring;
        ring.engine.check_count(size as u64)?;
        let claim = ring.engine.claim_write(size as u64)?;
        Ok(ByteWriteClaim { ring, claim: Some(claim) })
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

    /// Published, unread bytes
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

impl<R: ByteRegion> fmt::Debug for MarshallingWriter<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshallingWriter").field("engine", &self.ring.engine).finish()
    }
}

/// A claimed byte range being written. Published by `put` or on drop.
pub struct ByteWriteClaim<'a, R: ByteRegion> {
    ring: &'a MarshallingRing<R>,
    claim: Option<engine::WriteClaim<'a>>,
}

impl<R: ByteRegion> fmt::Debug for ByteWriteClaim<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteWriteClaim").field("offset", &self.offset()).field("end", &self.end()).finish()
    }
}

impl<R: ByteRegion> ByteWriteClaim<'_, R> {
    fn bounds(&self) -> (u64, u64, bool) {
        match &self.claim {
            Some(claim) => (claim.seq, claim.seq + claim.count, claim.discarded),
            None => (0, 0, true),
        }
    }

    /// First offset of the claimed range
    pub fn offset(&self) -> u64 {
        self.bounds().0
    }

    /// One past the last claimed offset
    pub fn end(&self) -> u64 {
        self.bounds().1
    }

    pub fn is_discarded(&self) -> bool {
        self.bounds().2
    }

    /// Write raw bytes at `offset`.
    ///
    /// # Panics
    /// If the bytes fall outside the claimed range.
    pub fn write_bytes(&mut self, offset: u64, bytes: &[u8]) {
        let (start, end, discarded) = self.bounds();
        assert!(
            within(start, end, offset, bytes.len()),
            "write of {} bytes at {} outside claim {}..{}",
            bytes.len(),
            offset,
            start,
            end
        );
        if !discarded {
            // SAFETY: inside this writer's claim
            unsafe {
                self.ring.write_at(offset, bytes);
            }
        }
    }

    #[inline]
    pub fn write_pod<P: Pod>(&mut self, offset: u64, value: &P) {
        self.write_bytes(offset, bytemuck::bytes_of(value));
    }

    typed_access!(write:
        write_u8 => u8,
        write_i8 => i8,
        write_i16 => i16,
        write_u16 => u16,
        write_i32 => i32,
        write_u32 => u32,
        write_i64 => i64,
        write_u64 => u64,
        write_f32 => f32,
        write_f64 => f64,
    );

    #[inline]
    pub fn write_bool(&mut self, offset: u64, value: bool) {
        self.write_u8(offset, value as u8);
    }

    #[inline]
    pub fn write_char(&mut self, offset: u64, value: char) {
        self.write_u32(offset, value as u32);
    }

    /// Publish the range.
    pub fn put(self) {}
}

impl<R: ByteRegion> Drop for ByteWriteClaim<'_, R> {
    fn drop(&mut self) {
        if let Some(claim) = self.claim.take() {
            self.ring.engine.publish(claim);
        }
    }
}

// ============================================================================
// Reader
// ============================================================================

pub struct MarshallingReader<R: ByteRegion = HeapRegion> {
    ring: Arc<MarshallingRing<R>>,
}

impl<R: ByteRegion> MarshallingReader<R> {
    /// Wait until `size` bytes are published and claim them.
    #[inline]
    pub fn take(&mut self, size: usize) -> Result<ByteReadClaim<'_, R>> {
        let ring = &*self.ring;
        ring.engine.check_count(size as u64)?;
        let claim = ring.engine.claim_read(size as u64, ring.engine.read_wait())?;
        Ok(ByteReadClaim { ring, claim: Some(claim) })
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

impl<R: ByteRegion> fmt::Debug for MarshallingReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshallingReader").field("engine", &self.ring.engine).finish()
    }
}

/// A claimed byte range being read. Released by `advance` or on drop.
pub struct ByteReadClaim<'a, R: ByteRegion> {
    ring: &'a MarshallingRing<R>,
    claim: Option<engine::ReadClaim<'a>>,
}

impl<R: ByteRegion> ByteReadClaim<'_, R> {
    fn bounds(&self) -> (u64, u64) {
        self.claim.as_ref().map_or((0, 0), |claim| (claim.seq, claim.seq + claim.count))
    }

    pub fn offset(&self) -> u64 {
        self.bounds().0
    }

    pub fn end(&self) -> u64 {
        self.bounds().1
    }

    /// Copy bytes at `offset` into `dst`.
    ///
    /// # Panics
    /// If the bytes fall outside the claimed range.
    pub fn read_bytes(&self, offset: u64, dst: &mut [u8]) {
        let (start, end) = self.bounds();
        assert!(
            within(start, end, offset, dst.len()),
            "read of {} bytes at {} outside claim {}..{}",
            dst.len(),
            offset,
            start,
            end
        );
        // SAFETY: inside this reader's claim
        unsafe {
            self.ring.read_at(offset, dst);
        }
    }

    #[inline]
    pub fn read_pod<P: Pod>(&self, offset: u64) -> P {
        let mut value = P::zeroed();
        self.read_bytes(offset, bytemuck::bytes_of_mut(&mut value));
        value
    }

    typed_access!(read:
        read_u8 => u8,
        read_i8 => i8,
        read_i16 => i16,
        read_u16 => u16,
        read_i32 => i32,
        read_u32 => u32,
        read_i64 => i64,
        read_u64 => u64,
        read_f32 => f32,
        read_f64 => f64,
    );

    #[inline]
    pub fn read_bool(&self, offset: u64) -> bool {
        self.read_u8(offset) != 0
    }

    #[inline]
    pub fn read_char(&self, offset: u64) -> char {
        char::from_u32(self.read_u32(offset)).unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    /// Release the range to writers.
    pub fn advance(self) {}
}

impl<R: ByteRegion> Drop for ByteReadClaim<'_, R> {
    fn drop(&mut self) {
        if let Some(claim) = self.claim.take() {
            self.ring.engine.release(claim);
        }
    }
}
