//! # Plugin Parameters
//!
//! The host-facing parameter set. Each parameter has:
//!
//! - A **unique string ID** (`#[id = "..."]`) that the host uses to
//!   save and recall presets. Once published, never change these IDs
//!   or existing presets will break.
//! - A **human-readable name** shown in the DAW's UI.
//! - A **range** and a **default value**.
//!
//! ## No smoothing
//!
//! Unlike most delay plugins, nothing here is smoothed. A tap's delay is a
//! whole number of samples and a change re-positions its read pointer in
//! one step, exactly like the message-driven control surface does.
//!
//! ## Getting changes off the audio thread
//!
//! Host automation can change a parameter from any thread, including the
//! audio thread. Applying a change means clamping, logging and possibly
//! sending engine commands, none of which belongs in `process()`. So each
//! parameter only gets a callback that raises a flag in [`ParamChanges`].
//! `process()` checks one atomic per block and, if something changed, asks
//! nih-plug to run a background task that calls [`PluginParams::apply_changes`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nih_plug::prelude::*;

use crate::config::MAX_TAPS;
use crate::control::Controller;

/// Upper end of the host's delay knob. The engine clamps (and logs) delays
/// that do not fit the ring at the current sample rate.
const MAX_DELAY_KNOB_MS: f32 = 2_750.0;

/// Which parameters changed since the last background apply.
pub struct ParamChanges {
    pending: AtomicBool,
    active_taps: AtomicBool,
    mix: AtomicBool,
    taps: Box<[AtomicBool]>,
}

impl ParamChanges {
    fn new(num_taps: usize) -> Self {
        Self {
            pending: AtomicBool::new(false),
            active_taps: AtomicBool::new(false),
            mix: AtomicBool::new(false),
            taps: (0..num_taps).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Returns true once after any number of changes. Safe to call from
    /// the audio thread.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    // The flag is stored before `pending` is raised, so whoever sees
    // `pending` also sees the flag.
    fn mark(&self, flag: &AtomicBool) {
        flag.store(true, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
    }

    fn mark_tap(&self, tap: usize) {
        if let Some(flag) = self.taps.get(tap) {
            self.mark(flag);
        }
    }
}

/// All user-facing parameters for the multi-tap delay.
///
/// `#[derive(Params)]` registers every field tagged with `#[id]` or
/// `#[nested]` with the host and handles preset (de)serialisation. The
/// untagged `changes` field is invisible to the host.
#[derive(Params)]
pub struct PluginParams {
    /// **Active Taps**: How many taps are summed into the output.
    ///
    /// Taps above this count keep their settings but are silent. Any change
    /// clears the delay lines first, so raising the count never lets stale
    /// feedback leak into the newly added taps.
    ///
    /// Range: 0 to 100. 0 leaves only the dry signal.
    /// Default: 4.
    #[id = "taps"]
    pub active_taps: IntParam,

    /// **Dry**: Level of the unprocessed input in the output.
    ///
    /// Dry and wet are independent linear gains, not a crossfade. Used as
    /// a send effect the dry level would normally be 0.
    #[id = "dry"]
    pub dry_gain: FloatParam,

    /// **Wet**: Level of the summed taps in the output.
    ///
    /// Applied after the taps are summed, so with many loud taps this is
    /// the knob that keeps the output from clipping.
    #[id = "wet"]
    pub wet_gain: FloatParam,

    /// One group per tap. IDs are suffixed with the tap number
    /// (`dly_1`, `fb_1`, `gain_1`, ...).
    #[nested(array, group = "Tap")]
    pub taps: Vec<HostTapParams>,

    pub changes: Arc<ParamChanges>,
}

/// Delay, feedback and gain of one tap.
///
/// A tap's defaults are all zero, so an untouched tap is silent even when
/// it is active.
#[derive(Params)]
pub struct HostTapParams {
    /// Converted to whole samples at the current sample rate; the fraction
    /// is dropped.
    #[id = "dly"]
    pub delay_ms: FloatParam,

    /// 0 = a single echo, 1 = repeats that never decay.
    ///
    /// Each tap feeds back only into itself. Values above 1 would make the
    /// loop grow on every pass, so the knob stops at 1.
    #[id = "fb"]
    pub feedback: FloatParam,

    /// Linear. Up to 2 so a single tap can sit above the dry signal.
    #[id = "gain"]
    pub gain: FloatParam,
}

impl HostTapParams {
    fn new(index: usize, changes: &Arc<ParamChanges>) -> Self {
        // The three knobs of a tap share one flag: the controller applies
        // delay, feedback and gain together anyway.
        let callback = {
            let changes = changes.clone();
            Arc::new(move |_: f32| changes.mark_tap(index))
        };

        Self {
            delay_ms: FloatParam::new(
                "Delay",
                0.0,
                FloatRange::Skewed {
                    min: 0.0,
                    max: MAX_DELAY_KNOB_MS,
                    // More knob travel for short delays, where a few ms
                    // are clearly audible.
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_unit(" ms")
            .with_step_size(0.1)
            .with_callback(callback.clone()),

            feedback: FloatParam::new("Feedback", 0.0, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage())
                .with_callback(callback.clone()),

            gain: FloatParam::new("Gain", 0.0, FloatRange::Linear { min: 0.0, max: 2.0 })
                .with_value_to_string(formatters::v2s_f32_rounded(3))
                .with_callback(callback),
        }
    }

    fn is_default(&self) -> bool {
        self.delay_ms.value() == 0.0 && self.feedback.value() == 0.0 && self.gain.value() == 0.0
    }
}

impl Default for PluginParams {
    fn default() -> Self {
        let changes = Arc::new(ParamChanges::new(MAX_TAPS));

        let active_taps_changed = {
            let changes = changes.clone();
            Arc::new(move |_: i32| changes.mark(&changes.active_taps))
        };
        let mix_changed = {
            let changes = changes.clone();
            Arc::new(move |_: f32| changes.mark(&changes.mix))
        };

        Self {
            active_taps: IntParam::new(
                "Active Taps",
                crate::config::DEFAULT_ACTIVE_TAPS as i32,
                IntRange::Linear {
                    min: 0,
                    max: MAX_TAPS as i32,
                },
            )
            .with_callback(active_taps_changed),

            dry_gain: FloatParam::new(
                "Dry",
                crate::config::DEFAULT_DRY_GAIN,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_value_to_string(formatters::v2s_f32_rounded(3))
            .with_callback(mix_changed.clone()),

            wet_gain: FloatParam::new(
                "Wet",
                crate::config::DEFAULT_WET_GAIN,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_value_to_string(formatters::v2s_f32_rounded(3))
            .with_callback(mix_changed),

            taps: (0..MAX_TAPS)
                .map(|index| HostTapParams::new(index, &changes))
                .collect(),

            changes,
        }
    }
}

impl PluginParams {
    /// Push every flagged change through the controller. Runs on nih-plug's
    /// background thread.
    pub fn apply_changes(&self, controller: &mut Controller) {
        if self.changes.active_taps.swap(false, Ordering::Relaxed) {
            report(controller.set_active_taps(self.active_taps.value()));
        }
        if self.changes.mix.swap(false, Ordering::Relaxed) {
            controller.set_dry_gain(self.dry_gain.value());
            controller.set_wet_gain(self.wet_gain.value());
        }
        for (index, (tap, flag)) in self.taps.iter().zip(self.changes.taps.iter()).enumerate() {
            if flag.swap(false, Ordering::Relaxed) {
                report(controller.set_tap_parameters(
                    index,
                    tap.delay_ms.value(),
                    tap.feedback.value(),
                    tap.gain.value(),
                ));
            }
        }
    }

    /// Push the whole parameter state through the controller, e.g. after the
    /// host restored a preset or changed the sample rate. Taps still at
    /// their defaults are skipped.
    pub fn apply_all(&self, controller: &mut Controller) {
        for flag in self.changes.taps.iter() {
            flag.store(false, Ordering::Relaxed);
        }
        self.changes.active_taps.store(false, Ordering::Relaxed);
        self.changes.mix.store(false, Ordering::Relaxed);

        report(controller.set_active_taps(self.active_taps.value()));
        controller.set_dry_gain(self.dry_gain.value());
        controller.set_wet_gain(self.wet_gain.value());
        for (index, tap) in self.taps.iter().enumerate() {
            if !tap.is_default() {
                report(controller.set_tap_parameters(
                    index,
                    tap.delay_ms.value(),
                    tap.feedback.value(),
                    tap.gain.value(),
                ));
            }
        }
    }
}

fn report(result: crate::error::ControlResult<()>) {
    if let Err(err) = result {
        nih_error!("{err}");
    }
}
