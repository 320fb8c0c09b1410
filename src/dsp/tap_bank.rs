//! # Tap Bank
//!
//! A fixed-size array of taps plus an *active count*. Only the first
//! `active` taps are summed into the output; the rest are silenced but keep
//! their tunables and feedback history.
//!
//! The bank is the audio-thread view. The matching tunables live in
//! [`SharedParams`](crate::control::SharedParams), one [`TapParams`] per tap,
//! in the same order.

use super::ring::CircularBuffer;
use super::tap::{DelayTap, TapParams};

pub struct TapBank {
    taps: Box<[DelayTap]>,
    active: usize,
}

impl TapBank {
    /// Allocate `max_taps` silent taps, each with a `buffer_len` feedback
    /// ring. This is the only allocation the bank ever makes.
    pub fn new(max_taps: usize, buffer_len: usize, active: usize) -> Self {
        Self {
            taps: (0..max_taps).map(|_| DelayTap::new(buffer_len)).collect(),
            active: active.min(max_taps),
        }
    }

    pub fn capacity(&self) -> usize {
        self.taps.len()
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn tap(&self, index: usize) -> Option<&DelayTap> {
        self.taps.get(index)
    }

    /// Change the number of summed taps, capped at the bank's capacity.
    ///
    /// Taps that become active are re-aligned with the current write index
    /// using their stored delay. Taps that were already active, or that are
    /// being silenced, are left untouched.
    pub fn set_active(&mut self, count: usize, params: &[TapParams], write_index: usize) {
        let count = count.min(self.taps.len());
        if count > self.active {
            for (tap, params) in self.taps[self.active..count]
                .iter_mut()
                .zip(&params[self.active..count])
            {
                tap.retarget(write_index, params.delay_samples());
            }
        }
        self.active = count;
    }

    /// Re-derive one tap's read pointer from its stored delay.
    pub fn retarget(&mut self, index: usize, params: &TapParams, write_index: usize) {
        if let Some(tap) = self.taps.get_mut(index) {
            tap.retarget(write_index, params.delay_samples());
        }
    }

    /// Re-derive every tap's read pointer, active or not.
    pub fn retarget_all(&mut self, params: &[TapParams], write_index: usize) {
        for (tap, params) in self.taps.iter_mut().zip(params) {
            tap.retarget(write_index, params.delay_samples());
        }
    }

    /// Copy the latest gain and feedback into the active taps.
    #[inline]
    pub fn load_params(&mut self, params: &[TapParams]) {
        for (tap, params) in self.taps[..self.active].iter_mut().zip(params) {
            tap.load_params(params);
        }
    }

    /// Sum the active taps for the sample just written at `write_index`.
    ///
    /// Summation runs in ascending tap order so identical input and
    /// parameter histories give bit-identical output.
    #[inline]
    pub fn process_sample(&mut self, input: &CircularBuffer, write_index: usize) -> f32 {
        let mut sum = 0.0;
        for tap in &mut self.taps[..self.active] {
            sum += tap.process_sample(input, write_index);
        }
        sum
    }

    /// Zero every feedback ring, including those of silenced taps.
    pub fn clear(&mut self) {
        for tap in self.taps.iter_mut() {
            tap.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(n: usize) -> Vec<TapParams> {
        (0..n).map(|_| TapParams::default()).collect()
    }

    #[test]
    fn test_active_count_is_capped() {
        let shared = params(3);
        let mut bank = TapBank::new(3, 8, 1);

        bank.set_active(10, &shared, 0);

        assert_eq!(bank.active(), 3);
        assert_eq!(bank.capacity(), 3);
    }

    #[test]
    fn test_silenced_taps_do_not_contribute() {
        let shared = params(2);
        for p in &shared {
            p.set_gain(1.0);
        }
        let mut bank = TapBank::new(2, 8, 2);
        bank.retarget_all(&shared, 0);
        bank.load_params(&shared);

        let mut input = CircularBuffer::new(8);
        let w = input.advance();
        input.write(1.0);
        assert_eq!(bank.process_sample(&input, w), 2.0);

        bank.set_active(1, &shared, w);
        let w = input.advance();
        input.write(1.0);
        assert_eq!(bank.process_sample(&input, w), 1.0);
    }

    /// A tap that sat out while the write index moved on must come back
    /// with its delay intact.
    #[test]
    fn test_reactivated_tap_is_realigned() {
        let shared = params(2);
        shared[1].set_delay_samples(5, 15);
        let mut bank = TapBank::new(2, 16, 1);

        bank.set_active(2, &shared, 11);

        assert_eq!(bank.tap(1).map(DelayTap::read_index), Some(6));
    }
}
