//! # Multi-Tap Delay — An AU/VST3/CLAP Delay Plugin
//!
//! A mono multi-tap delay built with [nih-plug](https://github.com/robbert-vdh/nih-plug).
//! The input is written into one shared circular buffer; up to 100 taps
//! read it back at independent delays, each with its own gain and its own
//! feedback loop. The summed taps are mixed with the dry input.
//!
//! ## Signal Flow
//!
//! ```text
//! Input ──┬───────────────────────────────────────────── × dry ──────┐
//!         │                                                          │
//!         ▼                                                          │
//!   [ Input Ring ]──► tap 1: (+)──┬── × gain ──┐                      │
//!         │              ▲       │            │                      │
//!         │              └─ [fb ring] ◄─ × fb ┘│                      │
//!         │                                   ▼                      │
//!         ├────────► tap 2: ...  ────────────(+)                     │
//!         │                                   │                      │
//!         └────────► tap N: ...  ────────────(+)── × wet ──────────►(+)──► Output
//! ```
//!
//! ## Threads
//!
//! - The **audio thread** owns the [`Engine`]: the rings, the write index
//!   and every tap's read pointer.
//! - The **control thread** owns the [`Controller`]: it clamps and logs
//!   parameter changes, publishes scalars through atomics and sends
//!   structural changes through a lock-free queue that the engine drains
//!   at block boundaries.
//!
//! Inside the plugin the control thread is nih-plug's background task
//! thread. The engine types work just as well on their own:
//!
//! ```ignore
//! use multitap_delay::{channel, EngineConfig, LogSink};
//!
//! let (mut controller, mut engine) = channel(EngineConfig::default(), Box::new(LogSink))?;
//! controller.set_active_taps(1)?;
//! controller.set_tap_parameters(0, 10.0, 0.0, 1.0)?;
//! engine.process(&input, &mut output);
//! ```

pub mod command;
pub mod config;
pub mod control;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod notice;
mod params;

use std::num::NonZeroU32;
use std::sync::Arc;

use nih_plug::prelude::*;
use parking_lot::Mutex;

pub use config::EngineConfig;
pub use control::{channel, ControlMessage, Controller};
pub use engine::Engine;
pub use error::{ConfigError, ControlError};
pub use notice::{LogSink, Notice, NoticeSink};

use params::PluginParams;

/// Work the audio thread hands to nih-plug's background thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTask {
    /// Apply host parameter changes flagged since the last run.
    ApplyParamChanges,
}

/// The plugin struct.
///
/// The engine is touched only by `process()` and `reset()`. The controller
/// sits behind a mutex because both `initialize()` and the background task
/// executor need it; the audio thread never locks it.
struct MultiTapDelay {
    params: Arc<PluginParams>,
    controller: Arc<Mutex<Controller>>,
    engine: Engine,
}

impl Default for MultiTapDelay {
    fn default() -> Self {
        // All rings and taps are allocated here, once. The sample rate is a
        // placeholder until initialize() reports the real one.
        let (controller, engine) = channel(EngineConfig::default(), Box::new(LogSink))
            .expect("default engine config is valid");

        Self {
            params: Arc::new(PluginParams::default()),
            controller: Arc::new(Mutex::new(controller)),
            engine,
        }
    }
}

impl Plugin for MultiTapDelay {
    const NAME: &'static str = "Multi-Tap Delay";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "steve.loveless@gmail.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // One input, one output. The taps share a single input history, so
    // there is no per-channel state to duplicate.
    //
    // A stereo track can still host the plugin: most DAWs either sum to
    // mono in front of a mono effect or run one instance per side.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[AudioIOLayout {
        main_input_channels: NonZeroU32::new(1),
        main_output_channels: NonZeroU32::new(1),
        aux_input_ports: &[],
        aux_output_ports: &[],
        names: PortNames::const_default(),
    }];

    // Nothing here responds to notes.
    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // Sample-accurate automation would make nih-plug split the buffer at
    // every automation point. There is no point in that here: parameter
    // changes are applied by a background task and the engine only picks
    // them up at the start of a block, so sub-block timing is lost anyway.
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();

    // The one job the audio thread delegates. See `task_executor()`.
    type BackgroundTask = ControlTask;

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Runs `ControlTask`s on nih-plug's background thread.
    ///
    /// Applying a parameter change can clamp values, format log lines and
    /// push engine commands. None of that may happen inside `process()`,
    /// so the audio thread only schedules the work and this closure does
    /// it. The closure owns clones of the params and the controller; it
    /// never sees the engine.
    fn task_executor(&mut self) -> TaskExecutor<Self> {
        let params = self.params.clone();
        let controller = self.controller.clone();
        Box::new(move |task| match task {
            ControlTask::ApplyParamChanges => params.apply_changes(&mut controller.lock()),
        })
    }

    /// Called off the audio thread whenever the audio configuration
    /// changes. This is where the host tells us its sample rate.
    ///
    /// Every non-default tap is re-applied so that host-side millisecond
    /// values are converted at the new rate.
    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        let mut controller = self.controller.lock();
        controller.set_sample_rate(buffer_config.sample_rate);
        self.params.apply_all(&mut controller);

        true
    }

    /// Called when playback stops or the plugin is bypassed. Silence every
    /// ring so stale echoes don't bleed into the next playback; tap
    /// settings are kept.
    fn reset(&mut self) {
        self.engine.stop();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        // One atomic swap per block. If the host moved any knob since the
        // last block, let the background thread apply it. The engine sees
        // the result at the start of a later block.
        if self.params.changes.take_pending() {
            context.execute_background(ControlTask::ApplyParamChanges);
        }

        // The layout is mono, so there is exactly one channel. The engine
        // drains its command queue, loads the block's gains and then runs
        // the per-sample loop over it.
        if let Some(samples) = buffer.as_slice().first_mut() {
            self.engine.process_in_place(samples);
        }

        // Tell the host how long the effect keeps ringing after the input
        // goes silent, so it keeps calling process() and the last echoes
        // are not cut off. Each tap's repeats shrink by its feedback
        // factor, so the tail is the slowest tap's time to -60 dB. With
        // feedback at 1 the repeats never shrink and the host has to keep
        // us alive indefinitely.
        match self.engine.tail_samples() {
            Some(tail) => ProcessStatus::Tail(tail),
            None => ProcessStatus::KeepAlive,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Plugin format trait implementations
// ─────────────────────────────────────────────────────────────────────
//
// Metadata nih-plug needs to package the plugin as CLAP and VST3.

impl ClapPlugin for MultiTapDelay {
    // Reverse-domain ID. Hosts key saved sessions on it, so it never
    // changes once released.
    const CLAP_ID: &'static str = "com.loveless-audio.multitap-delay";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A mono delay with up to 100 independent taps, each with its own feedback");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    // Mono because the plugin only offers the 1 in / 1 out layout.
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Mono,
        ClapFeature::Delay,
    ];
}

impl Vst3Plugin for MultiTapDelay {
    // Must be unique among all VST3 plugins. Sixteen ASCII bytes, one per
    // character, which is enough as long as the vendor prefix is ours.
    const VST3_CLASS_ID: [u8; 16] = *b"LvlssMultiTapDly";

    // Where the plugin shows up in the host's browser.

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] = &[
        Vst3SubCategory::Fx,
        Vst3SubCategory::Delay,
        Vst3SubCategory::Mono,
    ];
}

// ─────────────────────────────────────────────────────────────────────
// Export macros
// ─────────────────────────────────────────────────────────────────────
//
// Entry points the host looks for when it scans the library:
// `clap_entry` for CLAP and `GetPluginFactory` for VST3.

nih_export_clap!(MultiTapDelay);
nih_export_vst3!(MultiTapDelay);

// Logic Pro only loads Audio Units. clap-wrapper re-exports the CLAP
// entry point as `GetPluginFactoryAUV2`. Audio Units only exist on macOS,
// which is also the only target that pulls in the crate.
#[cfg(target_os = "macos")]
clap_wrapper::export_auv2!();
