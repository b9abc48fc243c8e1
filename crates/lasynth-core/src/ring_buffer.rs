//! Circular 16-bit sample buffers for integer delay networks.
//!
//! [`RingBuffer`] is the storage behind every comb, allpass and tap delay of
//! the reverb. It is allocated once at its maximum capacity; the *active*
//! length can then be shortened or lengthened with [`RingBuffer::set_len`]
//! without touching the stored samples, so switching between delay-line
//! configurations never clears audio that is still circulating.
//!
//! # Addressing
//!
//! The write head sits at `index`. [`RingBuffer::advance`] moves it forward
//! one slot and returns the sample found there, which is the oldest sample in
//! the active window. [`RingBuffer::tap`] reads relative to the head:
//! `tap(0)` is the slot under the head, `tap(n)` is `n` slots behind it.

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

use alloc::vec;
use alloc::vec::Vec;

/// Fixed-capacity circular buffer of 16-bit samples.
///
/// # Example
///
/// ```rust
/// use lasynth_core::RingBuffer;
///
/// let mut ring = RingBuffer::new(4);
/// ring.store(7);
/// ring.advance();
/// ring.store(9);
/// assert_eq!(ring.tap(1), 7);
/// ```
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buffer: Vec<i16>,
    len: usize,
    index: usize,
}

impl RingBuffer {
    /// Create a buffer holding up to `capacity` samples, all zero.
    ///
    /// The active length starts at the full capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            buffer: vec![0; capacity],
            len: capacity,
            index: 0,
        }
    }

    /// Maximum number of samples the buffer can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Active length of the circular window.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: the active window holds at least one slot.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Change the active window length, clamped to `1..=capacity`.
    ///
    /// Stored samples are kept. The head is wrapped into the new window.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.clamp(1, self.buffer.len());
        if self.index >= self.len {
            self.index %= self.len;
        }
    }

    /// Sample under the write head.
    #[inline]
    pub fn current(&self) -> i16 {
        self.buffer[self.index]
    }

    /// Overwrite the sample under the write head.
    #[inline]
    pub fn store(&mut self, sample: i16) {
        self.buffer[self.index] = sample;
    }

    /// Move the head forward one slot and return the sample found there.
    #[inline]
    pub fn advance(&mut self) -> i16 {
        self.index += 1;
        if self.index >= self.len {
            self.index = 0;
        }
        self.buffer[self.index]
    }

    /// Read the sample `delay` slots behind the head (modulo the active length).
    #[inline]
    pub fn tap(&self, delay: usize) -> i16 {
        let delay = delay % self.len;
        let pos = if delay > self.index {
            self.index + self.len - delay
        } else {
            self.index - delay
        };
        self.buffer[pos]
    }

    /// Zero every slot, including those outside the active window.
    pub fn clear(&mut self) {
        self.buffer.fill(0);
        self.index = 0;
    }

    /// Largest absolute sample in the active window.
    pub fn peak(&self) -> u16 {
        self.buffer[..self.len]
            .iter()
            .map(|s| s.unsigned_abs())
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_tap() {
        let mut ring = RingBuffer::new(8);
        for i in 1..=5 {
            ring.store(i);
            ring.advance();
        }
        // Head is one past the last store.
        assert_eq!(ring.tap(1), 5);
        assert_eq!(ring.tap(3), 3);
        assert_eq!(ring.tap(5), 1);
    }

    #[test]
    fn test_advance_returns_oldest() {
        let mut ring = RingBuffer::new(3);
        ring.store(1);
        ring.advance();
        ring.store(2);
        ring.advance();
        ring.store(3);
        assert_eq!(ring.advance(), 1);
    }

    #[test]
    fn test_tap_wraps() {
        let mut ring = RingBuffer::new(4);
        for i in 0..6 {
            ring.store(i);
            ring.advance();
        }
        // Window holds 2, 3, 4, 5 with the head on the slot holding 2.
        assert_eq!(ring.tap(1), 5);
        assert_eq!(ring.tap(4), 2);
        assert_eq!(ring.tap(5), 5);
    }

    #[test]
    fn test_set_len_keeps_contents() {
        let mut ring = RingBuffer::new(16);
        for i in 0..10 {
            ring.store(i + 1);
            ring.advance();
        }
        ring.set_len(4);
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.capacity(), 16);
        ring.set_len(16);
        // Head wrapped from slot 10 to slot 2; slot 1 still holds its sample.
        assert_eq!(ring.tap(1), 2);
        assert_ne!(ring.peak(), 0);
    }

    #[test]
    fn test_set_len_clamps() {
        let mut ring = RingBuffer::new(8);
        ring.set_len(0);
        assert_eq!(ring.len(), 1);
        ring.set_len(100);
        assert_eq!(ring.len(), 8);
    }

    #[test]
    fn test_peak() {
        let mut ring = RingBuffer::new(8);
        assert_eq!(ring.peak(), 0);
        ring.store(-300);
        ring.advance();
        ring.store(200);
        assert_eq!(ring.peak(), 300);
        ring.store(i16::MIN);
        assert_eq!(ring.peak(), 32768);
    }

    #[test]
    fn test_clear() {
        let mut ring = RingBuffer::new(8);
        ring.store(123);
        ring.advance();
        assert_ne!(ring.peak(), 0);
        ring.clear();
        assert_eq!(ring.peak(), 0);
        assert_eq!(ring.current(), 0);
    }

    #[test]
    #[should_panic]
    fn test_zero_capacity_panics() {
        let _ = RingBuffer::new(0);
    }
}
