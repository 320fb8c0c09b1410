//! # DSP (Digital Signal Processing) Primitives
//!
//! The building blocks of the multi-tap delay, leaves first:
//!
//! - **`ring`**: a fixed-length circular buffer with a wrapping write
//!   index. One holds the dry input line; every tap owns another for its
//!   feedback line.
//!
//! - **`tap`**: a single delay tap. Its tunables are shared atomics
//!   written by the control thread; its read pointer and feedback ring
//!   belong to the audio thread.
//!
//! - **`tap_bank`**: the fixed array of taps and the count of how many of
//!   them are currently summed into the output.

pub mod ring;
pub mod tap;
pub mod tap_bank;
