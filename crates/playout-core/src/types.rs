//! Core domain types for Playout.

pub mod config;
pub mod format;
pub mod source;

pub use config::{OutputConfig, BLOCK_FRAMES, MAX_CHANNELS, RING_BLOCKS};
pub use format::{SampleFormat, MAX_SAMPLE_WIDTH};
pub use source::SourceInfo;
