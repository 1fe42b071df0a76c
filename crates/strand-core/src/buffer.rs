//! Size-tagged byte buffers and the pool that recycles them.
//!
//! A [`ByteBuffer`] owns a fixed-capacity allocation and records how many of
//! its leading bytes hold meaningful data. Buffers move from the
//! [`BufferPool`] to a caller and back, so the audio hot path reuses storage
//! instead of allocating per packet.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crate::{Error, Result};
use parking_lot::Mutex;
use tracing::trace;

/// Owned byte region with a used size distinct from its capacity.
#[derive(Debug, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Box<[u8]>,
    used: usize,
}

impl ByteBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes with nothing used.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            used: 0,
        }
    }

    /// Build a buffer whose capacity and used size match `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            data: bytes.into(),
            used: bytes.len(),
        }
    }

    /// Total storage in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of leading bytes holding data.
    pub const fn used_size(&self) -> usize {
        self.used
    }

    /// Check whether no bytes are in use.
    pub const fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Set the used size. Fails if it would exceed the capacity.
    pub fn set_used_size(&mut self, used: usize) -> Result<()> {
        if used > self.capacity() {
            return Err(Error::BufferTooSmall {
                needed: used,
                capacity: self.capacity(),
            });
        }
        self.used = used;
        Ok(())
    }

    /// The used part of the buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.used]
    }

    /// The used part of the buffer, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.used]
    }

    /// The whole storage, regardless of the used size.
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy `bytes` to the front of the buffer and mark exactly them as used.
    pub fn copy_from(&mut self, bytes: &[u8]) -> Result<()> {
        self.set_used_size(bytes.len())?;
        self.data[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// Thread-safe pool of reusable [`ByteBuffer`]s.
///
/// `get_buffer` hands out the smallest retained buffer that is large enough,
/// allocating only when none fits.
pub struct BufferPool {
    free: Mutex<Vec<ByteBuffer>>,
    max_pooled: usize,
}

impl BufferPool {
    /// Create an empty pool retaining at most `max_pooled` returned buffers.
    pub fn new(max_pooled: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_pooled)),
            max_pooled,
        }
    }

    /// Take a buffer of at least `size` bytes with its used size set to `size`.
    pub fn get_buffer(&self, size: usize) -> ByteBuffer {
        let recycled = {
            let mut free = self.free.lock();
            let best = free
                .iter()
                .enumerate()
                .filter(|(_, buf)| buf.capacity() >= size)
                .min_by_key(|(_, buf)| buf.capacity())
                .map(|(idx, _)| idx);
            best.map(|idx| free.swap_remove(idx))
        };

        let mut buffer = recycled.unwrap_or_else(|| {
            trace!("Buffer pool miss, allocating {size} bytes");
            ByteBuffer::with_capacity(size)
        });
        buffer.used = size;
        buffer
    }

    /// Return a buffer to the pool. Dropped if the pool is already full.
    pub fn free_buffer(&self, mut buffer: ByteBuffer) {
        buffer.used = 0;
        let mut free = self.free.lock();
        if free.len() < self.max_pooled {
            free.push(buffer);
        }
    }

    /// Return every buffer in `buffers` to the pool.
    pub fn free_all(&self, buffers: impl IntoIterator<Item = ByteBuffer>) {
        for buffer in buffers {
            self.free_buffer(buffer);
        }
    }

    /// Number of buffers currently retained.
    pub fn pooled(&self) -> usize {
        self.free.lock().len()
    }

    /// Maximum number of retained buffers.
    pub const fn max_pooled(&self) -> usize {
        self.max_pooled
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_used_size_bounds() {
        let mut buf = ByteBuffer::with_capacity(8);
        assert!(buf.is_empty());
        buf.set_used_size(8).unwrap();
        assert_eq!(buf.as_slice().len(), 8);
        assert!(matches!(
            buf.set_used_size(9),
            Err(Error::BufferTooSmall {
                needed: 9,
                capacity: 8
            })
        ));
        assert_eq!(buf.used_size(), 8);
    }

    #[test]
    fn test_copy_from() {
        let mut buf = ByteBuffer::with_capacity(6);
        buf.copy_from(&[1, 2, 3]).unwrap();
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
        assert_eq!(buf.capacity(), 6);
        assert!(buf.copy_from(&[0; 7]).is_err());
    }

    #[test]
    fn test_pool_best_fit() {
        let pool = BufferPool::new(4);
        pool.free_buffer(ByteBuffer::with_capacity(64));
        pool.free_buffer(ByteBuffer::with_capacity(16));
        pool.free_buffer(ByteBuffer::with_capacity(32));

        let buf = pool.get_buffer(20);
        assert_eq!(buf.capacity(), 32);
        assert_eq!(buf.used_size(), 20);
        assert_eq!(pool.pooled(), 2);
    }

    #[test]
    fn test_pool_allocates_on_miss() {
        let pool = BufferPool::new(2);
        pool.free_all([ByteBuffer::with_capacity(8), ByteBuffer::with_capacity(8)]);
        let buf = pool.get_buffer(100);
        assert_eq!(buf.capacity(), 100);
        assert_eq!(pool.pooled(), 2);
    }

    #[test]
    fn test_pool_bounded() {
        let pool = BufferPool::new(1);
        pool.free_all([ByteBuffer::with_capacity(4), ByteBuffer::with_capacity(4)]);
        assert_eq!(pool.pooled(), 1);
        assert_eq!(pool.max_pooled(), 1);
    }

    #[test]
    fn test_recycled_buffer_reports_requested_size() {
        let pool = BufferPool::new(2);
        let mut buf = pool.get_buffer(4);
        buf.as_mut_slice().copy_from_slice(&[9, 9, 9, 9]);
        pool.free_buffer(buf);

        let again = pool.get_buffer(2);
        assert_eq!(again.used_size(), 2);
        assert_eq!(again.capacity(), 4);
    }

    proptest! {
        #[test]
        fn prop_pool_buffers_fit_request(
            returned in prop::collection::vec(0usize..512, 0..16),
            requests in prop::collection::vec(0usize..512, 1..16),
            max_pooled in 0usize..8,
        ) {
            let pool = BufferPool::new(max_pooled);
            pool.free_all(returned.into_iter().map(ByteBuffer::with_capacity));
            prop_assert!(pool.pooled() <= max_pooled);

            for size in requests {
                let buf = pool.get_buffer(size);
                prop_assert!(buf.capacity() >= size);
                prop_assert_eq!(buf.used_size(), size);
                prop_assert_eq!(buf.as_slice().len(), size);
                pool.free_buffer(buf);
                prop_assert!(pool.pooled() <= max_pooled);
            }
        }
    }
}
