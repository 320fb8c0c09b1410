//! # Circular Buffer
//!
//! A fixed-length ring of audio samples. The multi-tap delay keeps one of
//! these for the dry input line and one more per tap for that tap's
//! feedback line.
//!
//! ## One write head, many read heads
//!
//! Picture a circular tape loop with a single record head and up to a
//! hundred playback heads trailing behind it. The record head is the
//! *write index*: it advances by exactly one slot per sample and wraps back
//! to 0 at the end of the ring. Each playback head is a tap's *read index*,
//! sitting `delay` slots behind the write index.
//!
//! Only the input ring moves its own write index. The feedback rings are
//! written at the input ring's write index, so every ring in the engine
//! shares one notion of "now":
//!
//! ```text
//! write index ─────────────────────────────┐
//!                                          ▼
//! input ring     [ .  .  .  r  .  .  .  .  w  . ]
//! feedback ring  [ .  .  .  r  .  .  .  .  w  . ]   (one per tap)
//!                           ▲
//!                 read index = w - delay (mod len)
//! ```
//!
//! ## Why no modulo?
//!
//! Indices only ever move forward by one, so wrapping is a compare and a
//! conditional subtract rather than a division. Deriving a read index from
//! a delay shorter than the ring likewise needs at most one add.

/// A ring of `len` samples with a write index that wraps at `len`.
///
/// The storage is allocated once in [`new()`](Self::new) and never resized.
pub struct CircularBuffer {
    /// The samples. All values start at 0.0 (silence).
    samples: Box<[f32]>,

    /// Slot holding the most recently written sample.
    write_index: usize,
}

impl CircularBuffer {
    /// Create a silent ring of `len` samples.
    ///
    /// `len` must be non-zero; [`EngineConfig::validate`] guarantees this
    /// for every ring the engine builds.
    ///
    /// [`EngineConfig::validate`]: crate::config::EngineConfig::validate
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![0.0; len].into_boxed_slice(),
            write_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Move the write index forward by one slot and return the new index.
    #[inline]
    pub fn advance(&mut self) -> usize {
        self.write_index = next_index(self.write_index, self.samples.len());
        self.write_index
    }

    /// Store a sample at the current write index.
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.samples[self.write_index] = sample;
    }

    /// Store a sample at an arbitrary slot.
    ///
    /// Feedback rings use this to write at the input ring's write index.
    #[inline]
    pub fn write_at(&mut self, index: usize, sample: f32) {
        self.samples[index] = sample;
    }

    /// Load the sample at an arbitrary slot.
    #[inline]
    pub fn read(&self, index: usize) -> f32 {
        self.samples[index]
    }

    /// Silence the whole ring. The write index keeps its position so that
    /// any read pointers derived from it stay coherent.
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }
}

/// `index + 1`, wrapped to `[0, len)`.
#[inline]
pub fn next_index(index: usize, len: usize) -> usize {
    let next = index + 1;
    if next >= len {
        next - len
    } else {
        next
    }
}

/// The slot `delay` samples behind `write_index` on a ring of `len`.
///
/// `delay` must be shorter than the ring (`delay < len`).
#[inline]
pub fn index_behind(write_index: usize, delay: usize, len: usize) -> usize {
    if delay > write_index {
        write_index + len - delay
    } else {
        write_index - delay
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// A write lands at the current write index and is readable there.
    #[test]
    fn test_write_and_read_at_write_index() {
        let mut ring = CircularBuffer::new(8);

        let w = ring.advance();
        ring.write(0.75);

        assert_eq!(w, 1);
        assert!((ring.read(w) - 0.75).abs() < 1e-6);
    }

    /// The write index wraps back to zero after `len` advances.
    #[test]
    fn test_write_index_wraps() {
        let mut ring = CircularBuffer::new(4);

        let visited: Vec<usize> = (0..6).map(|_| ring.advance()).collect();

        assert_eq!(visited, vec![1, 2, 3, 0, 1, 2]);
    }

    /// A one-slot ring always writes to slot zero.
    #[test]
    fn test_single_slot_ring() {
        let mut ring = CircularBuffer::new(1);
        for _ in 0..3 {
            assert_eq!(ring.advance(), 0);
        }
    }

    /// Deriving a read index must wrap through the start of the ring.
    #[test]
    fn test_index_behind_wraps() {
        assert_eq!(index_behind(5, 2, 10), 3);
        assert_eq!(index_behind(5, 5, 10), 0);
        assert_eq!(index_behind(2, 5, 10), 7);
        assert_eq!(index_behind(0, 9, 10), 1);
        assert_eq!(index_behind(3, 0, 10), 3);
    }

    /// Clearing silences every slot but leaves the write head in place.
    #[test]
    fn test_clear_keeps_write_index() {
        let mut ring = CircularBuffer::new(10);
        for i in 0..7 {
            ring.advance();
            ring.write(i as f32 + 1.0);
        }

        ring.clear();

        assert_eq!(ring.write_index(), 7);
        for i in 0..ring.len() {
            assert!(
                ring.read(i).abs() < 1e-6,
                "Expected silence at slot {i} after clear"
            );
        }
    }

    /// Reading `d` slots behind the write head returns what was written
    /// `d` samples ago (FIFO behavior).
    #[test]
    fn test_fifo_sequence() {
        let mut ring = CircularBuffer::new(10);

        for i in 1..=5 {
            ring.advance();
            ring.write(i as f32);
        }

        let w = ring.write_index();
        assert!((ring.read(index_behind(w, 0, 10)) - 5.0).abs() < 1e-6);
        assert!((ring.read(index_behind(w, 1, 10)) - 4.0).abs() < 1e-6);
        assert!((ring.read(index_behind(w, 4, 10)) - 1.0).abs() < 1e-6);
    }
}
