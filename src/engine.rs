//! The audio-rate half of the multi-tap delay.
//!
//! An [`Engine`] owns the input ring, the write index and every tap's read
//! pointer and feedback ring. It lives on the audio thread and never
//! allocates, blocks or logs. Everything it needs from the control thread
//! arrives either through the atomics in [`SharedParams`] or as an
//! [`EngineCommand`] drained at the start of each block.
//!
//! ## Per-sample loop
//!
//! ```text
//! w = w + 1 (wrap)
//! input[w] = in[i]
//! wet = tap[0] + tap[1] + ... + tap[active - 1]
//! out[i] = wet_gain * wet + dry_gain * in[i]
//! ```

use std::sync::Arc;

use crate::command::EngineCommand;
use crate::control::SharedParams;
use crate::dsp::ring::CircularBuffer;
use crate::dsp::tap::DelayTap;
use crate::dsp::tap_bank::TapBank;

/// Below this feedback a tap's repeats are treated as a single echo when
/// estimating the tail.
const TAIL_FEEDBACK_FLOOR: f32 = 0.001;

pub struct Engine {
    shared: Arc<SharedParams>,
    commands: rtrb::Consumer<EngineCommand>,

    /// The dry input line. Its write index is the engine's notion of "now".
    input: CircularBuffer,
    bank: TapBank,

    /// Block-rate copies of the mix gains.
    dry_gain: f32,
    wet_gain: f32,
}

impl Engine {
    pub(crate) fn new(
        shared: Arc<SharedParams>,
        commands: rtrb::Consumer<EngineCommand>,
        buffer_length: usize,
        active_taps: usize,
    ) -> Self {
        let bank = TapBank::new(shared.taps().len(), buffer_length, active_taps);
        Self {
            dry_gain: shared.dry_gain(),
            wet_gain: shared.wet_gain(),
            shared,
            commands,
            input: CircularBuffer::new(buffer_length),
            bank,
        }
    }

    pub fn buffer_length(&self) -> usize {
        self.input.len()
    }

    pub fn write_index(&self) -> usize {
        self.input.write_index()
    }

    pub fn active_taps(&self) -> usize {
        self.bank.active()
    }

    pub fn tap(&self, index: usize) -> Option<&DelayTap> {
        self.bank.tap(index)
    }

    /// Process one block from `input` into `output`.
    ///
    /// Pending control commands are applied first, then the latest gains are
    /// loaded, then samples are produced. If the slices differ in length
    /// only the common prefix is processed.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        self.begin_block();
        for (x, y) in input.iter().zip(output.iter_mut()) {
            *y = self.tick(*x);
        }
    }

    /// Process one block in place, as plugin hosts hand it over.
    pub fn process_in_place(&mut self, buffer: &mut [f32]) {
        self.begin_block();
        for sample in buffer.iter_mut() {
            *sample = self.tick(*sample);
        }
    }

    /// Zero the input ring and every feedback ring. Tunables, read
    /// pointers and the write index are left alone.
    pub fn stop(&mut self) {
        self.input.clear();
        self.bank.clear();
    }

    /// How long the output keeps ringing after the input goes silent, in
    /// samples. `None` means it never decays (some active tap has
    /// feedback 1).
    ///
    /// Each repeat is scaled by the feedback coefficient, so reaching
    /// -60 dB takes `log(0.001) / log(feedback)` repeats of the tap's delay.
    pub fn tail_samples(&self) -> Option<u32> {
        let mut longest = 0.0_f32;
        for params in &self.shared.taps()[..self.bank.active()] {
            if params.gain() == 0.0 {
                continue;
            }
            let delay = params.delay_samples() as f32;
            let feedback = params.feedback();
            let tail = if feedback >= 1.0 {
                return None;
            } else if feedback > TAIL_FEEDBACK_FLOOR {
                let repeats = -3.0 / feedback.log10(); // log10(0.001) = -3
                (repeats + 1.0) * delay
            } else {
                delay
            };
            longest = longest.max(tail);
        }
        Some(longest.min(u32::MAX as f32) as u32)
    }

    fn begin_block(&mut self) {
        while let Ok(command) = self.commands.pop() {
            self.apply(command);
        }
        self.bank.load_params(self.shared.taps());
        self.dry_gain = self.shared.dry_gain();
        self.wet_gain = self.shared.wet_gain();
    }

    fn apply(&mut self, command: EngineCommand) {
        let write_index = self.input.write_index();
        match command {
            EngineCommand::Retarget { tap } => {
                if let Some(params) = self.shared.taps().get(tap) {
                    self.bank.retarget(tap, params, write_index);
                }
            }
            EngineCommand::SetActiveTaps { count } => {
                // Changing the topology while old feedback is circulating can
                // leave taps self-oscillating, so the rings are cleared first.
                self.stop();
                self.bank.set_active(count, self.shared.taps(), write_index);
            }
            EngineCommand::Stop => self.stop(),
            EngineCommand::Reset { active_taps } => {
                self.stop();
                self.bank.retarget_all(self.shared.taps(), write_index);
                self.bank.set_active(active_taps, self.shared.taps(), write_index);
            }
        }
    }

    #[inline]
    fn tick(&mut self, x: f32) -> f32 {
        let w = self.input.advance();
        self.input.write(x);

        // Fresh accumulator per sample.
        let wet = self.bank.process_sample(&self.input, w);
        self.wet_gain * wet + self.dry_gain * x
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::control::{channel, Controller};
    use crate::notice::{Notice, RangeWarning, RecordingSink};

    fn config() -> EngineConfig {
        EngineConfig {
            max_taps: 16,
            default_sample_rate: 48_000.0,
            ..EngineConfig::default()
        }
    }

    fn setup() -> (Controller, Engine, RecordingSink) {
        let sink = RecordingSink::default();
        let (controller, engine) =
            channel(config(), Box::new(sink.clone())).expect("valid config");
        (controller, engine, sink)
    }

    fn impulse(len: usize) -> Vec<f32> {
        let mut block = vec![0.0; len];
        block[0] = 1.0;
        block
    }

    /// Deterministic white-ish noise in [-1, 1).
    fn noise(len: usize, mut state: u32) -> Vec<f32> {
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }

    fn run(engine: &mut Engine, input: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0; input.len()];
        engine.process(input, &mut output);
        output
    }

    /// Apply pending commands without producing any samples.
    fn sync(engine: &mut Engine) {
        engine.process(&[], &mut []);
    }

    fn nonzero(output: &[f32]) -> Vec<(usize, f32)> {
        output
            .iter()
            .enumerate()
            .filter(|(_, s)| **s != 0.0)
            .map(|(i, s)| (i, *s))
            .collect()
    }

    fn distance_behind(engine: &Engine, tap: usize) -> usize {
        let len = engine.buffer_length();
        let read = engine.tap(tap).map(DelayTap::read_index).unwrap_or(0);
        (engine.write_index() + len - read) % len
    }

    #[test]
    fn test_single_tap_delay() {
        let (mut controller, mut engine, _) = setup();
        controller.set_active_taps(1).unwrap();
        controller.set_tap_parameters(0, 10.0, 0.0, 1.0).unwrap();
        controller.set_dry_gain(0.0);
        controller.set_wet_gain(1.0);

        let output = run(&mut engine, &impulse(2000));

        assert_eq!(nonzero(&output), vec![(480, 1.0)]);
    }

    #[test]
    fn test_two_tap_echo() {
        let (mut controller, mut engine, _) = setup();
        controller.set_active_taps(2).unwrap();
        controller.set_tap_parameters(0, 100.0, 0.0, 0.5).unwrap();
        controller.set_tap_parameters(1, 200.0, 0.0, 0.25).unwrap();
        controller.set_dry_gain(0.0);
        controller.set_wet_gain(1.0);

        let output = run(&mut engine, &impulse(12_000));

        assert_eq!(nonzero(&output), vec![(4800, 0.5), (9600, 0.25)]);
    }

    #[test]
    fn test_feedback_decays_geometrically() {
        let (mut controller, mut engine, _) = setup();
        controller.set_active_taps(1).unwrap();
        controller.set_tap_parameters(0, 50.0, 0.5, 1.0).unwrap();
        controller.set_dry_gain(0.0);
        controller.set_wet_gain(1.0);

        let output = run(&mut engine, &impulse(2400 * 8 + 1));

        let echoes = nonzero(&output);
        assert_eq!(echoes.len(), 8);
        for (k, (i, value)) in echoes.iter().enumerate() {
            assert_eq!(*i, 2400 * (k + 1));
            assert_eq!(*value, 0.5_f32.powi(k as i32));
        }
    }

    /// Host blocks are small; the result must not depend on how the
    /// stream is chopped up.
    #[test]
    fn test_block_size_does_not_matter() {
        let (mut controller, mut engine, _) = setup();
        controller.set_active_taps(1).unwrap();
        controller.set_tap_parameters(0, 50.0, 0.5, 1.0).unwrap();
        controller.set_dry_gain(0.0);
        controller.set_wet_gain(1.0);

        let input = impulse(2400 * 3 + 1);
        let mut output = Vec::new();
        for chunk in input.chunks(64) {
            output.extend(run(&mut engine, chunk));
        }

        assert_eq!(nonzero(&output), vec![(2400, 1.0), (4800, 0.5), (7200, 0.25)]);
    }

    #[test]
    fn test_oversize_delay_is_clamped() {
        let (mut controller, mut engine, sink) = setup();

        controller.set_tap_parameters(0, 10_000.0, 0.0, 1.0).unwrap();
        sync(&mut engine);

        assert_eq!(controller.tap_snapshot(0).unwrap().delay_samples, 132_300);
        assert_eq!(distance_behind(&engine, 0), 132_300);
        assert!(sink.take().iter().any(|n| matches!(
            n,
            Notice::Clamped(RangeWarning::DelayTooLong {
                clamped_samples: 132_300,
                ..
            })
        )));
    }

    #[test]
    fn test_reactivated_tap_keeps_its_delay() {
        let (mut controller, mut engine, _) = setup();
        controller.set_tap_parameters(4, 80.0, 0.0, 1.0).unwrap();
        controller.set_active_taps(2).unwrap();
        controller.set_dry_gain(0.0);
        controller.set_wet_gain(1.0);

        run(&mut engine, &noise(10_000, 0x1234_5678));
        controller.set_active_taps(10).unwrap();
        sync(&mut engine);

        assert_eq!(distance_behind(&engine, 4), 3840);

        // Taps 1-4 and 6-10 have zero gain, so only tap 5 is audible.
        let output = run(&mut engine, &impulse(5000));
        assert_eq!(nonzero(&output), vec![(3840, 1.0)]);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let (mut controller, mut engine, sink) = setup();
        controller.set_active_taps(3).unwrap();
        controller.set_tap_parameters(0, 5.0, 0.9, 1.0).unwrap();
        controller.set_tap_parameters(2, 7.0, 0.3, 0.8).unwrap();
        controller.set_dry_gain(0.1);
        controller.set_wet_gain(0.9);
        run(&mut engine, &noise(4096, 42));

        controller.reset().unwrap();
        let input = impulse(1024);
        let output = run(&mut engine, &input);

        assert_eq!(engine.active_taps(), 4);
        for (x, y) in input.iter().zip(&output) {
            assert_eq!(*y, 0.5 * x);
        }
        assert_eq!(sink.take().last(), Some(&Notice::Boundary));
    }

    #[test]
    fn test_silence_in_silence_out() {
        let (mut controller, mut engine, _) = setup();
        controller.set_active_taps(16).unwrap();
        for tap in 0..16 {
            let ms = tap as f32 * 3.7;
            controller.set_tap_parameters(tap, ms, 0.99, 1.5).unwrap();
        }

        let output = run(&mut engine, &vec![0.0; 8192]);

        assert!(output.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_no_active_taps_passes_dry_only() {
        let (mut controller, mut engine, _) = setup();
        controller.set_tap_parameters(0, 1.0, 0.5, 1.0).unwrap();
        controller.set_active_taps(0).unwrap();
        controller.set_dry_gain(0.8);

        let input = noise(2048, 7);
        let output = run(&mut engine, &input);

        for (x, y) in input.iter().zip(&output) {
            assert_eq!(*y, 0.8 * x);
        }
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut controller, mut engine, _) = setup();
        controller.set_active_taps(1).unwrap();
        controller.set_tap_parameters(0, 20.0, 0.7, 1.0).unwrap();
        controller.set_dry_gain(0.0);
        run(&mut engine, &noise(4096, 99));

        controller.stop().unwrap();
        controller.stop().unwrap();
        let write_index = engine.write_index();
        let output = run(&mut engine, &vec![0.0; 4096]);

        assert!(output.iter().all(|s| *s == 0.0));
        assert_eq!(engine.write_index(), (write_index + 4096) % engine.buffer_length());
    }

    #[test]
    fn test_output_is_reproducible() {
        let input = noise(20_000, 0xdead_beef);
        let render = || {
            let (mut controller, mut engine, _) = setup();
            controller.set_active_taps(5).unwrap();
            for tap in 0..5 {
                let ms = 11.0 + tap as f32 * 13.0;
                controller
                    .set_tap_parameters(tap, ms, 0.3, 0.2 * (tap + 1) as f32)
                    .unwrap();
            }
            let mut output = Vec::new();
            for chunk in input.chunks(256) {
                output.extend(run(&mut engine, chunk));
            }
            output
        };

        let first = render();
        let second = render();

        assert!(first
            .iter()
            .zip(&second)
            .all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn test_indices_stay_in_range() {
        let (mut controller, mut engine, _) = setup();
        controller.set_active_taps(3).unwrap();
        controller.set_tap_parameters(0, 0.0, 0.0, 1.0).unwrap();
        controller.set_tap_parameters(1, 2756.0, 0.0, 1.0).unwrap();
        controller.set_tap_parameters(2, 1000.0, 0.5, 1.0).unwrap();

        let len = engine.buffer_length();
        for _ in 0..40 {
            run(&mut engine, &vec![0.0; 4096]);
            assert!(engine.write_index() < len);
            for tap in 0..3 {
                let read = engine.tap(tap).map(DelayTap::read_index).unwrap_or(len);
                assert!(read < len, "tap {tap} read index {read} out of range");
            }
        }
        assert_eq!(distance_behind(&engine, 1), 132_288);
    }

    /// Right after a delay change the read pointer sits exactly the
    /// converted number of samples behind the write pointer.
    #[test]
    fn test_delay_change_mid_stream() {
        let (mut controller, mut engine, _) = setup();
        run(&mut engine, &noise(777, 3));

        controller.set_tap_parameters(1, 33.3, 0.0, 1.0).unwrap();
        sync(&mut engine);

        // floor(33.3 * 48) = 1598
        assert_eq!(distance_behind(&engine, 1), 1598);
    }

    #[test]
    fn test_tail_estimate() {
        let (mut controller, mut engine, _) = setup();
        controller.set_active_taps(1).unwrap();
        controller.set_tap_parameters(0, 10.0, 0.0, 1.0).unwrap();
        sync(&mut engine);
        assert_eq!(engine.tail_samples(), Some(480));

        controller.set_tap_parameters(0, 10.0, 1.0, 1.0).unwrap();
        assert_eq!(engine.tail_samples(), None);
    }
}
