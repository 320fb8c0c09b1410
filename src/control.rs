//! The control surface of the multi-tap delay.
//!
//! A [`Controller`] runs on a non-realtime thread (the plugin's background
//! task, a UI, a test). It validates and clamps every request, publishes
//! scalar tunables through [`SharedParams`], sends structural changes to the
//! [`Engine`] as [`EngineCommand`]s and reports what happened to a
//! [`NoticeSink`].
//!
//! ```ignore
//! let (mut controller, mut engine) = channel(EngineConfig::default(), Box::new(LogSink))?;
//!
//! // control thread
//! controller.set_active_taps(2)?;
//! controller.set_tap_parameters(0, 250.0, 0.4, 0.8)?;
//!
//! // audio thread
//! engine.process(&input, &mut output);
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;

use atomic_float::AtomicF32;

use crate::command::{command_channel, EngineCommand};
use crate::config::EngineConfig;
use crate::dsp::tap::{non_negative, samples_to_ms, TapParams};
use crate::engine::Engine;
use crate::error::{ConfigError, ControlError, ControlResult};
use crate::notice::{Notice, NoticeSink, Param, RangeWarning, Rejection, TapSnapshot};

/// Tunables written by the control thread and read by the audio thread.
pub struct SharedParams {
    taps: Box<[TapParams]>,
    dry_gain: AtomicF32,
    wet_gain: AtomicF32,
}

impl SharedParams {
    fn new(config: &EngineConfig) -> Self {
        Self {
            taps: (0..config.max_taps).map(|_| TapParams::default()).collect(),
            dry_gain: AtomicF32::new(config.default_dry_gain),
            wet_gain: AtomicF32::new(config.default_wet_gain),
        }
    }

    pub fn taps(&self) -> &[TapParams] {
        &self.taps
    }

    pub fn dry_gain(&self) -> f32 {
        self.dry_gain.load(Ordering::Relaxed)
    }

    pub fn wet_gain(&self) -> f32 {
        self.wet_gain.load(Ordering::Relaxed)
    }
}

/// Build a connected controller/engine pair.
///
/// All rings and taps are allocated here, once. The engine goes to the
/// audio thread; the controller stays with whoever handles user input.
pub fn channel(
    config: EngineConfig,
    sink: Box<dyn NoticeSink>,
) -> Result<(Controller, Engine), ConfigError> {
    config.validate()?;

    let shared = Arc::new(SharedParams::new(&config));
    let (producer, consumer) = command_channel(config.command_queue_capacity);
    let engine = Engine::new(
        shared.clone(),
        consumer,
        config.buffer_length,
        config.default_active_taps,
    );
    let controller = Controller {
        shared,
        commands: producer,
        sink,
        sample_rate: config.default_sample_rate.trunc(),
        active_taps: config.default_active_taps,
        config,
    };

    Ok((controller, engine))
}

pub struct Controller {
    shared: Arc<SharedParams>,
    commands: rtrb::Producer<EngineCommand>,
    sink: Box<dyn NoticeSink>,
    config: EngineConfig,
    /// Whole samples per second, used for every ms to sample conversion.
    sample_rate: f32,
    /// The count most recently sent to the engine.
    active_taps: usize,
}

impl Controller {
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn active_taps(&self) -> usize {
        self.active_taps
    }

    pub fn dry_gain(&self) -> f32 {
        self.shared.dry_gain()
    }

    pub fn wet_gain(&self) -> f32 {
        self.shared.wet_gain()
    }

    pub fn tap_snapshot(&self, tap: usize) -> Option<TapSnapshot> {
        self.shared.taps.get(tap).map(TapParams::snapshot)
    }

    /// Longest delay the ring can hold at the current sample rate.
    pub fn max_delay_ms(&self) -> f32 {
        samples_to_ms(self.config.max_delay_samples(), self.sample_rate)
    }

    /// Store the sample rate reported by the host, truncated to whole Hz.
    ///
    /// Delays already stored in samples are kept as they are; only later
    /// ms conversions use the new rate.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate.is_finite() && sample_rate >= 1.0 {
            self.sample_rate = sample_rate.trunc();
        } else {
            self.notify(Notice::Rejected(Rejection::UnusableSampleRate(sample_rate)));
        }
    }

    /// Set delay, feedback and gain of one tap (zero-based index), in that
    /// order, then report the applied values.
    ///
    /// Parameters for taps beyond the active count are stored with a
    /// warning; they take effect once the tap count is raised.
    /// If the command queue is full the whole request is dropped and the
    /// tap keeps its previous settings.
    pub fn set_tap_parameters(
        &mut self,
        tap: usize,
        delay_ms: f32,
        feedback: f32,
        gain: f32,
    ) -> ControlResult<()> {
        let max = self.config.max_taps;
        if tap >= max {
            self.notify(Notice::Rejected(Rejection::NoSuchTap {
                tap_number: tap as i64 + 1,
                max,
            }));
            return Ok(());
        }

        // Nothing is published unless the engine can be told about it.
        let command = EngineCommand::Retarget { tap };
        self.ensure_room(command)?;

        let params = &self.shared.taps[tap];
        let delay_warning =
            params.set_delay_ms(delay_ms, self.sample_rate, self.config.max_delay_samples());
        let feedback_warning = params.set_feedback(feedback);
        let gain_warning = params.set_gain(gain);
        let snapshot = params.snapshot();

        if tap >= self.active_taps {
            self.notify(Notice::SilencedTap { tap });
        }
        for warning in [delay_warning, feedback_warning, gain_warning]
            .into_iter()
            .flatten()
        {
            self.notify(Notice::Clamped(warning));
        }

        // The delay is already published, so the engine reads the new value
        // when it handles this.
        self.send(command)?;
        self.notify(Notice::TapStatus { tap, snapshot });
        Ok(())
    }

    /// Change how many taps are summed into the output.
    ///
    /// Negative counts are ignored. Counts above the bank's capacity are
    /// clamped. Any accepted change first silences all rings, even when taps
    /// are only being added.
    pub fn set_active_taps(&mut self, count: i32) -> ControlResult<()> {
        let Ok(requested) = usize::try_from(count) else {
            self.notify(Notice::Rejected(Rejection::NegativeTapCount(count)));
            return Ok(());
        };

        let max = self.config.max_taps;
        let command = EngineCommand::SetActiveTaps {
            count: requested.min(max),
        };
        self.ensure_room(command)?;

        let count = if requested > max {
            self.notify(Notice::Clamped(RangeWarning::TooManyTaps { requested, max }));
            max
        } else {
            requested
        };

        self.send(command)?;

        for tap in self.active_taps..count {
            let snapshot = self.shared.taps[tap].snapshot();
            if snapshot.gain != 0.0 {
                self.notify(Notice::TapStatus { tap, snapshot });
            }
        }
        self.active_taps = count;
        Ok(())
    }

    /// Set the linear gain of the unprocessed input in the output mix.
    pub fn set_dry_gain(&mut self, gain: f32) {
        let (gain, warning) = non_negative(Param::DryGain, gain);
        self.shared.dry_gain.store(gain, Ordering::Relaxed);
        if let Some(warning) = warning {
            self.notify(Notice::Clamped(warning));
        }
    }

    /// Set the linear gain of the summed taps in the output mix.
    pub fn set_wet_gain(&mut self, gain: f32) {
        let (gain, warning) = non_negative(Param::WetGain, gain);
        self.shared.wet_gain.store(gain, Ordering::Relaxed);
        if let Some(warning) = warning {
            self.notify(Notice::Clamped(warning));
        }
    }

    /// Silence the input ring and every feedback ring. Tunables are kept.
    pub fn stop(&mut self) -> ControlResult<()> {
        self.send(EngineCommand::Stop)
    }

    /// Stop, zero every tap, restore the default gains and tap count, then
    /// emit [`Notice::Boundary`]. Nothing changes if the command queue is
    /// full.
    pub fn reset(&mut self) -> ControlResult<()> {
        let active_taps = self.config.default_active_taps;
        let command = EngineCommand::Reset { active_taps };
        self.ensure_room(command)?;

        for params in self.shared.taps.iter() {
            params.clear();
        }
        self.shared
            .dry_gain
            .store(self.config.default_dry_gain, Ordering::Relaxed);
        self.shared
            .wet_gain
            .store(self.config.default_wet_gain, Ordering::Relaxed);

        self.send(command)?;
        self.active_taps = active_taps;

        self.notify(Notice::Boundary);
        Ok(())
    }

    /// Dispatch one message from the control surface.
    pub fn handle(&mut self, message: ControlMessage) -> ControlResult<()> {
        match message {
            ControlMessage::ActiveTaps(count) => self.set_active_taps(count),
            ControlMessage::DryGain(gain) => {
                self.set_dry_gain(gain);
                Ok(())
            }
            ControlMessage::WetGain(gain) => {
                self.set_wet_gain(gain);
                Ok(())
            }
            ControlMessage::SetParameters {
                tap_number,
                delay_ms,
                feedback,
                gain,
            } => {
                let max = self.config.max_taps;
                match usize::try_from(tap_number) {
                    Ok(n) if (1..=max).contains(&n) => {
                        self.set_tap_parameters(n - 1, delay_ms, feedback, gain)
                    }
                    _ => {
                        self.notify(Notice::Rejected(Rejection::NoSuchTap { tap_number, max }));
                        Ok(())
                    }
                }
            }
            ControlMessage::Stop => self.stop(),
            ControlMessage::Reset => self.reset(),
        }
    }

    /// Fail with [`ControlError::QueueFull`] if `command` could not be
    /// queued right now. This is the only producer, so a free slot stays
    /// free until the next push.
    fn ensure_room(&self, command: EngineCommand) -> ControlResult<()> {
        if self.commands.is_full() {
            Err(ControlError::QueueFull(command.name()))
        } else {
            Ok(())
        }
    }

    fn send(&mut self, command: EngineCommand) -> ControlResult<()> {
        self.commands
            .push(command)
            .map_err(|rtrb::PushError::Full(command)| ControlError::QueueFull(command.name()))
    }

    fn notify(&mut self, notice: Notice) {
        self.sink.notify(notice);
    }
}

/// A message on the control surface.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    ActiveTaps(i32),
    DryGain(f32),
    WetGain(f32),
    /// `tap_number` is 1-based.
    SetParameters {
        tap_number: i64,
        delay_ms: f32,
        feedback: f32,
        gain: f32,
    },
    Stop,
    Reset,
}

impl ControlMessage {
    /// Build a message from a selector and its numeric payload.
    ///
    /// Payload values are plain linear numbers; integer payloads are just
    /// whole-valued floats. A tap number is truncated toward zero.
    pub fn parse(selector: &str, payload: &[f32]) -> ControlResult<Self> {
        let arity = |selector: &'static str, expected: usize| {
            if payload.len() == expected {
                Ok(())
            } else {
                Err(ControlError::WrongArity {
                    selector,
                    expected,
                    got: payload.len(),
                })
            }
        };

        match selector {
            "activeTaps" => {
                arity("activeTaps", 1)?;
                Ok(ControlMessage::ActiveTaps(payload[0] as i32))
            }
            "dryGain" => {
                arity("dryGain", 1)?;
                Ok(ControlMessage::DryGain(payload[0]))
            }
            "wetGain" => {
                arity("wetGain", 1)?;
                Ok(ControlMessage::WetGain(payload[0]))
            }
            "setParameters" => {
                arity("setParameters", 4)?;
                Ok(ControlMessage::SetParameters {
                    tap_number: payload[0] as i64,
                    delay_ms: payload[1],
                    feedback: payload[2],
                    gain: payload[3],
                })
            }
            "stop" => {
                arity("stop", 0)?;
                Ok(ControlMessage::Stop)
            }
            "reset" => {
                arity("reset", 0)?;
                Ok(ControlMessage::Reset)
            }
            other => Err(ControlError::UnknownSelector(other.to_owned())),
        }
    }
}
