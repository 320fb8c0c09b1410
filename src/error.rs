//! Error types for engine construction and the control surface.
//!
//! Out-of-range parameter values are deliberately *not* errors: they are
//! clamped and reported as [`Notice`](crate::notice::Notice)s so audio keeps
//! running. The errors here are the cases where a request is dropped as a
//! whole.

use thiserror::Error;

/// Invalid static engine configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Buffer length must be at least one sample")]
    ZeroBufferLength,

    #[error("The tap bank must hold at least one tap")]
    ZeroMaxTaps,

    #[error("Default active taps ({active}) exceeds the tap bank capacity ({max})")]
    TooManyDefaultTaps { active: usize, max: usize },

    #[error("Sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f32),

    #[error("Default {name} gain must be non-negative and finite, got {value}")]
    InvalidGain { name: &'static str, value: f32 },

    #[error("Command queue capacity must be at least one")]
    ZeroQueueCapacity,
}

/// A control request that was dropped without changing any state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    /// The payload had the wrong number of values for its selector.
    #[error("'{selector}' expects {expected} value(s), got {got}")]
    WrongArity {
        selector: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Unknown control message '{0}'")]
    UnknownSelector(String),

    /// The audio thread has not drained the command queue fast enough.
    /// Scalar parameters are still published; only the structural change
    /// named here was lost.
    #[error("Command queue is full, dropped {0}")]
    QueueFull(&'static str),
}

/// Result type for control operations
pub type ControlResult<T> = Result<T, ControlError>;
