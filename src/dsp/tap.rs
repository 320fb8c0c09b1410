//! # Delay Taps
//!
//! A tap is one delayed copy of the input. It reads the shared input ring
//! a fixed number of samples behind the write head, adds its own feedback
//! history, and scales the result by its gain.
//!
//! ## Two halves
//!
//! A tap's state is touched by two threads, so it is split in two:
//!
//! - [`TapParams`]: the three tunables (delay, gain, feedback). Written by
//!   the control thread through atomics, so the audio thread can never
//!   observe a half-written float. All range checking happens here.
//! - [`DelayTap`]: the read pointer and the private feedback ring. Owned by
//!   the audio thread and only ever mutated there.
//!
//! ## Per-sample algorithm
//!
//! ```text
//! r      = r + 1 (wrap)
//! mixed  = input[r] + feedback_ring[r]
//! feedback_ring[w] = feedback * mixed
//! output = gain * mixed
//! ```
//!
//! Because the feedback ring is written at the shared write index `w` and
//! read `delay` slots behind it, a tap hears its own output again after
//! exactly one more delay period. With feedback 0.5 and an impulse input
//! the repeats come out as 1, 0.5, 0.25, ... spaced `delay` samples apart.

use std::sync::atomic::{AtomicUsize, Ordering};

use atomic_float::AtomicF32;

use super::ring::{index_behind, next_index, CircularBuffer};
use crate::notice::{Param, RangeWarning, TapSnapshot};

/// The tunables of one tap, shared between the control and audio threads.
///
/// Every field is an independent relaxed atomic. Changes are not
/// sample-accurate: the audio thread picks them up at its next block.
#[derive(Debug, Default)]
pub struct TapParams {
    /// Delay in whole samples, always `< buffer length`.
    delay_samples: AtomicUsize,
    gain: AtomicF32,
    feedback: AtomicF32,
}

impl TapParams {
    pub fn delay_samples(&self) -> usize {
        self.delay_samples.load(Ordering::Relaxed)
    }

    pub fn gain(&self) -> f32 {
        self.gain.load(Ordering::Relaxed)
    }

    pub fn feedback(&self) -> f32 {
        self.feedback.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TapSnapshot {
        TapSnapshot {
            delay_samples: self.delay_samples(),
            feedback: self.feedback(),
            gain: self.gain(),
        }
    }

    /// Set the delay from milliseconds.
    ///
    /// The conversion truncates: `samples = floor(ms * sample_rate / 1000)`.
    /// The result is clamped to `[0, max_delay_samples]`.
    ///
    /// The read pointer is *not* moved here; the caller must ask the audio
    /// thread to re-derive it (see [`DelayTap::retarget`]).
    pub fn set_delay_ms(
        &self,
        delay_ms: f32,
        sample_rate: f32,
        max_delay_samples: usize,
    ) -> Option<RangeWarning> {
        let (samples, warning) = delay_ms_to_samples(delay_ms, sample_rate, max_delay_samples);
        self.delay_samples.store(samples, Ordering::Relaxed);
        warning
    }

    /// Set the delay directly in samples, clamped to `max_delay_samples`.
    #[cfg(test)]
    pub(crate) fn set_delay_samples(&self, samples: usize, max_delay_samples: usize) {
        self.delay_samples
            .store(samples.min(max_delay_samples), Ordering::Relaxed);
    }

    /// Set the linear output gain. Negative values clamp to 0.
    pub fn set_gain(&self, gain: f32) -> Option<RangeWarning> {
        let (gain, warning) = non_negative(Param::TapGain, gain);
        self.gain.store(gain, Ordering::Relaxed);
        warning
    }

    /// Set the feedback coefficient, clamped to `[0, 1]`.
    pub fn set_feedback(&self, feedback: f32) -> Option<RangeWarning> {
        let (feedback, warning) = if feedback > 1.0 {
            (1.0, Some(RangeWarning::FeedbackTooHigh { requested: feedback }))
        } else {
            non_negative(Param::Feedback, feedback)
        };
        self.feedback.store(feedback, Ordering::Relaxed);
        warning
    }

    /// Zero all three tunables.
    pub fn clear(&self) {
        self.delay_samples.store(0, Ordering::Relaxed);
        self.gain.store(0.0, Ordering::Relaxed);
        self.feedback.store(0.0, Ordering::Relaxed);
    }
}

/// Convert a delay in ms to whole samples and clamp it to the ring.
pub fn delay_ms_to_samples(
    delay_ms: f32,
    sample_rate: f32,
    max_delay_samples: usize,
) -> (usize, Option<RangeWarning>) {
    if !delay_ms.is_finite() {
        // +inf is still just "too long"
        if delay_ms == f32::INFINITY {
            return (
                max_delay_samples,
                Some(too_long(delay_ms, sample_rate, max_delay_samples)),
            );
        }
        return (
            0,
            Some(RangeWarning::NotFinite {
                param: Param::Delay,
                requested: delay_ms,
            }),
        );
    }
    if delay_ms < 0.0 {
        return (
            0,
            Some(RangeWarning::Negative {
                param: Param::Delay,
                requested: delay_ms,
            }),
        );
    }

    // f64 so that e.g. 80 ms at 48 kHz truncates to exactly 3840.
    let requested = (f64::from(delay_ms) * f64::from(sample_rate) / 1000.0).floor();
    if requested > max_delay_samples as f64 {
        (
            max_delay_samples,
            Some(too_long(delay_ms, sample_rate, max_delay_samples)),
        )
    } else {
        (requested as usize, None)
    }
}

/// Whole samples back to ms, for re-deriving a delay from its stored form.
pub fn samples_to_ms(samples: usize, sample_rate: f32) -> f32 {
    (samples as f64 * 1000.0 / f64::from(sample_rate)) as f32
}

fn too_long(delay_ms: f32, sample_rate: f32, max_delay_samples: usize) -> RangeWarning {
    RangeWarning::DelayTooLong {
        requested_ms: delay_ms,
        max_ms: samples_to_ms(max_delay_samples, sample_rate) as u32,
        clamped_samples: max_delay_samples,
    }
}

/// Clamp a linear scalar to `[0, inf)`. NaN becomes 0.
pub(crate) fn non_negative(param: Param, value: f32) -> (f32, Option<RangeWarning>) {
    if value.is_nan() || value == f32::INFINITY {
        (
            0.0,
            Some(RangeWarning::NotFinite {
                param,
                requested: value,
            }),
        )
    } else if value < 0.0 {
        (
            0.0,
            Some(RangeWarning::Negative {
                param,
                requested: value,
            }),
        )
    } else {
        (value, None)
    }
}

/// The audio-thread half of a tap: read pointer and feedback ring.
pub struct DelayTap {
    /// Slot in the input ring this tap reads next, after advancing.
    /// Kept at `write_index - delay (mod len)` at every sample boundary.
    read_index: usize,

    /// This tap's own delayed output, scaled by its feedback coefficient.
    /// Indexed by the input ring's write index.
    feedback_ring: CircularBuffer,

    /// Block-rate copies of the shared tunables.
    gain: f32,
    feedback: f32,
}

impl DelayTap {
    /// Create a silent tap with a feedback ring of `buffer_len` samples.
    pub fn new(buffer_len: usize) -> Self {
        Self {
            read_index: 0,
            feedback_ring: CircularBuffer::new(buffer_len),
            gain: 0.0,
            feedback: 0.0,
        }
    }

    pub fn read_index(&self) -> usize {
        self.read_index
    }

    /// Pick up the latest gain and feedback from the control thread.
    #[inline]
    pub fn load_params(&mut self, params: &TapParams) {
        self.gain = params.gain();
        self.feedback = params.feedback();
    }

    /// Put the read pointer `delay` samples behind `write_index`.
    ///
    /// Called whenever the delay changes and when a silenced tap is brought
    /// back: while a tap is inactive the write index keeps moving but its
    /// read pointer does not.
    pub fn retarget(&mut self, write_index: usize, delay: usize) {
        let len = self.feedback_ring.len();
        self.read_index = index_behind(write_index, delay.min(len - 1), len);
    }

    /// Produce this tap's output for the sample just written at
    /// `write_index` of `input`.
    #[inline]
    pub fn process_sample(&mut self, input: &CircularBuffer, write_index: usize) -> f32 {
        self.read_index = next_index(self.read_index, self.feedback_ring.len());

        let mixed = input.read(self.read_index) + self.feedback_ring.read(self.read_index);
        self.feedback_ring
            .write_at(write_index, self.feedback * mixed);

        self.gain * mixed
    }

    /// Silence the feedback ring. The read pointer is left alone.
    pub fn clear(&mut self) {
        self.feedback_ring.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
