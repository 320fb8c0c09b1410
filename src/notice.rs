//! User-facing notices: clamp warnings, rejected requests, per-tap status
//! lines and the boundary signal emitted after a reset.
//!
//! The engine never formats or prints anything itself. Control operations
//! hand typed [`Notice`]s to a [`NoticeSink`]; the plugin uses [`LogSink`],
//! which forwards them to nih-plug's logger. Nothing here is ever touched
//! from the audio thread.

use std::fmt;

use nih_plug::prelude::{nih_log, nih_warn};
use thiserror::Error;

/// A tunable scalar, named in warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Delay,
    TapGain,
    Feedback,
    DryGain,
    WetGain,
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Param::Delay => "Delay",
            Param::TapGain => "Tap gain",
            Param::Feedback => "Feedback",
            Param::DryGain => "Dry gain",
            Param::WetGain => "Wet gain",
        })
    }
}

/// A parameter was outside its legal range and has been clamped.
///
/// Carries which parameter it was, what was requested and what was applied.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RangeWarning {
    #[error("Delay of {requested_ms} ms exceeds the maximum of {max_ms} ms, clamped to {clamped_samples} samples")]
    DelayTooLong {
        requested_ms: f32,
        max_ms: u32,
        clamped_samples: usize,
    },

    #[error("{param} must not be negative, got {requested}, clamped to 0")]
    Negative { param: Param, requested: f32 },

    #[error("Feedback above 1 makes the loop grow without bound, got {requested}, clamped to 1")]
    FeedbackTooHigh { requested: f32 },

    #[error("{param} must be a finite number, got {requested}, set to 0")]
    NotFinite { param: Param, requested: f32 },

    #[error("At most {max} taps are available, requested {requested}, clamped to {max}")]
    TooManyTaps { requested: usize, max: usize },
}

/// A request that was ignored. Prior state is preserved.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("A negative number of taps ({0}) makes no sense, ignored")]
    NegativeTapCount(i32),

    #[error("Tap number {tap_number} does not exist, taps are numbered 1 to {max}")]
    NoSuchTap { tap_number: i64, max: usize },

    #[error("Sample rate {0} reported by the host is unusable, keeping the previous rate")]
    UnusableSampleRate(f32),
}

/// Current tunables of one tap, as read back by the control thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapSnapshot {
    pub delay_samples: usize,
    pub feedback: f32,
    pub gain: f32,
}

/// Everything the control surface reports back to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Clamped(RangeWarning),
    Rejected(Rejection),
    /// Parameters were stored for a tap beyond the active count.
    /// `tap` is zero-based.
    SilencedTap { tap: usize },
    /// Three-line status report for one tap. `tap` is zero-based.
    TapStatus { tap: usize, snapshot: TapSnapshot },
    /// Emitted on the secondary outlet once a reset has completed.
    Boundary,
}

impl Notice {
    /// Warnings are things the user asked for but did not get.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Notice::Clamped(_) | Notice::Rejected(_) | Notice::SilencedTap { .. }
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Clamped(warning) => write!(f, "{warning}"),
            Notice::Rejected(rejection) => write!(f, "{rejection}"),
            Notice::SilencedTap { tap } => write!(
                f,
                "Tap number {} parameters are set, but you won't hear it, because the number of taps is set too low",
                tap + 1
            ),
            Notice::TapStatus { tap, snapshot } => {
                let n = tap + 1;
                writeln!(f, "Tap_{n}_dly: {} samples", snapshot.delay_samples)?;
                writeln!(f, "Tap_{n}_fb: {}", snapshot.feedback)?;
                write!(f, "Tap_{n}_gain: {}", snapshot.gain)
            }
            Notice::Boundary => f.write_str("reset"),
        }
    }
}

/// The seam to the external log / outlet channel.
pub trait NoticeSink: Send {
    fn notify(&mut self, notice: Notice);
}

/// Forwards notices to the host log through nih-plug's logging macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NoticeSink for LogSink {
    fn notify(&mut self, notice: Notice) {
        if notice.is_warning() {
            nih_warn!("{notice}");
        } else {
            for line in notice.to_string().lines() {
                nih_log!("{line}");
            }
        }
    }
}

/// Collects notices in memory. Used by tests to assert on warnings.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub notices: std::sync::Arc<parking_lot::Mutex<Vec<Notice>>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock())
    }
}

#[cfg(test)]
impl NoticeSink for RecordingSink {
    fn notify(&mut self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}
