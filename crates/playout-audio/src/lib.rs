//! # playout-audio
//!
//! Streams decoded audio from a file to a live output device.
//!
//! Features:
//! - Lock-free ring buffer of fixed-size frame blocks between the file
//!   reader thread and the real-time device callback
//! - Symphonia-based decoding into the output's exact PCM layout
//! - Fixed-block cpal output

pub mod buffer;
pub mod callback;
pub mod clock;
pub mod decode;
pub mod engine;
pub mod format;
pub mod output;
pub mod reader;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::PlaybackTime;
pub use engine::{AudioContext, Output, SessionState};
pub use playout_core::{Error, OutputConfig, Result, SampleFormat, SourceInfo};
