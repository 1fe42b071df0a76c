//! Ring buffer of raw PCM bytes between a producer and an audio callback.
//!
//! The producer queues decoded PCM; the output device's own thread pulls it
//! through [`PcmRing::fill`] or [`PcmRing::fill_i16`]. Every operation takes
//! the same short lock and none of them allocates.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

struct RingState {
    data: Box<[u8]>,
    /// Read cursor into `data`.
    read: usize,
    /// Queued bytes starting at `read`, never above `data.len()`.
    len: usize,
}

impl RingState {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn copy_out(&mut self, out: &mut [u8]) {
        let n = out.len();
        let first = n.min(self.capacity() - self.read);
        out[..first].copy_from_slice(&self.data[self.read..self.read + first]);
        out[first..].copy_from_slice(&self.data[..n - first]);
        self.consume(n);
    }

    fn consume(&mut self, n: usize) {
        self.read = (self.read + n) % self.capacity();
        self.len -= n;
    }
}

/// Fixed-capacity byte ring guarded by a single mutex.
pub struct PcmRing {
    state: Mutex<RingState>,
    /// Fills that found some data but not enough.
    underruns: AtomicUsize,
}

impl PcmRing {
    /// Create an empty ring holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RingState {
                data: vec![0u8; capacity].into_boxed_slice(),
                read: 0,
                len: 0,
            }),
            underruns: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }

    /// Bytes queued and not yet consumed.
    pub fn len(&self) -> usize {
        self.state.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes that can still be queued.
    pub fn free(&self) -> usize {
        let state = self.state.lock();
        state.capacity() - state.len
    }

    /// Append as much of `bytes` as fits, returning the count accepted.
    pub fn queue(&self, bytes: &[u8]) -> usize {
        let mut state = self.state.lock();
        let capacity = state.capacity();
        let n = bytes.len().min(capacity - state.len);
        if n == 0 {
            return 0;
        }

        let write = (state.read + state.len) % capacity;
        let first = n.min(capacity - write);
        state.data[write..write + first].copy_from_slice(&bytes[..first]);
        state.data[..n - first].copy_from_slice(&bytes[first..n]);
        state.len += n;
        n
    }

    /// Fill `out` from the front of the ring, zeroing whatever the ring
    /// cannot supply. Returns the number of real bytes copied.
    pub fn fill(&self, out: &mut [u8]) -> usize {
        let mut state = self.state.lock();
        let n = out.len().min(state.len);
        if n > 0 {
            state.copy_out(&mut out[..n]);
        }
        drop(state);

        self.note_shortfall(n, out.len());
        out[n..].fill(0);
        n
    }

    /// Like [`fill`](Self::fill) for a native-endian `i16` device buffer,
    /// reading queued bytes as little-endian samples. Returns the number of
    /// real samples copied.
    pub fn fill_i16(&self, out: &mut [i16]) -> usize {
        let mut state = self.state.lock();
        let n = out.len().min(state.len / 2);
        let capacity = state.capacity();
        for (i, sample) in out[..n].iter_mut().enumerate() {
            let at = (state.read + i * 2) % capacity;
            let lo = state.data[at];
            let hi = state.data[(at + 1) % capacity];
            *sample = i16::from_le_bytes([lo, hi]);
        }
        if n > 0 {
            state.consume(n * 2);
        }
        drop(state);

        self.note_shortfall(n, out.len());
        out[n..].fill(0);
        n
    }

    fn note_shortfall(&self, copied: usize, wanted: usize) {
        if copied > 0 && copied < wanted {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of fills that ran dry part way through.
    ///
    /// A fill on an empty ring is not counted; that is plain silence.
    pub fn underruns(&self) -> usize {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Discard everything queued.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        state.read = 0;
        state.len = 0;
    }
}

/// Ring shared between the producer and the output callback.
pub type SharedRing = Arc<PcmRing>;

/// Create a new shared ring.
pub fn shared_ring(capacity: usize) -> SharedRing {
    Arc::new(PcmRing::new(capacity))
}
