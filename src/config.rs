//! Static engine configuration.
//!
//! Everything here is fixed for the lifetime of an engine: the ring length
//! and the number of taps decide how much memory is allocated up front, and
//! nothing on the audio path may allocate afterwards.

use crate::error::ConfigError;

/// Ring length in samples. Roughly 1.38 seconds at 96 kHz; longer delays
/// need a larger ring.
pub const DEFAULT_BUFFER_LENGTH: usize = 132_301;

/// Hard ceiling on the number of taps.
pub const MAX_TAPS: usize = 100;

/// Taps summed into the output after construction and after a reset.
pub const DEFAULT_ACTIVE_TAPS: usize = 4;

/// Used for ms to sample conversions until the host reports its rate.
pub const DEFAULT_SAMPLE_RATE: f32 = 96_000.0;

pub const DEFAULT_DRY_GAIN: f32 = 0.5;
pub const DEFAULT_WET_GAIN: f32 = 0.5;

/// Capacity of the control to audio command queue.
///
/// The largest burst is raising the tap count from 0 to [`MAX_TAPS`] right
/// after a reset, which is a handful of commands, while a fast automation
/// sweep over many taps can queue one command per tap change.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Construction-time settings for an [`Engine`](crate::engine::Engine) and
/// its [`Controller`](crate::control::Controller).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Length of the input ring and of every feedback ring, in samples.
    pub buffer_length: usize,
    /// Number of taps allocated in the tap bank.
    pub max_taps: usize,
    pub default_active_taps: usize,
    pub default_sample_rate: f32,
    pub default_dry_gain: f32,
    pub default_wet_gain: f32,
    pub command_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_length: DEFAULT_BUFFER_LENGTH,
            max_taps: MAX_TAPS,
            default_active_taps: DEFAULT_ACTIVE_TAPS,
            default_sample_rate: DEFAULT_SAMPLE_RATE,
            default_dry_gain: DEFAULT_DRY_GAIN,
            default_wet_gain: DEFAULT_WET_GAIN,
            command_queue_capacity: COMMAND_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Check that the configuration describes an engine that can run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_length == 0 {
            return Err(ConfigError::ZeroBufferLength);
        }
        if self.max_taps == 0 {
            return Err(ConfigError::ZeroMaxTaps);
        }
        if self.default_active_taps > self.max_taps {
            return Err(ConfigError::TooManyDefaultTaps {
                active: self.default_active_taps,
                max: self.max_taps,
            });
        }
        if !(self.default_sample_rate.is_finite() && self.default_sample_rate >= 1.0) {
            return Err(ConfigError::InvalidSampleRate(self.default_sample_rate));
        }
        for (name, value) in [
            ("dry", self.default_dry_gain),
            ("wet", self.default_wet_gain),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidGain { name, value });
            }
        }
        if self.command_queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        Ok(())
    }

    /// Longest delay the ring can hold, in samples.
    pub fn max_delay_samples(&self) -> usize {
        self.buffer_length - 1
    }
}
