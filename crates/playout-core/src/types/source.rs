//! Decoded source description.

use crate::{OutputConfig, SampleFormat};
use serde::{Deserialize, Serialize};

/// What a decoder reports about an opened file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Total length in frames, when the container knows it.
    pub total_frames: Option<u64>,
    /// Closest PCM variant to the file's stored samples, or
    /// [`SampleFormat::Custom`] for compressed or exotic encodings.
    pub native_format: SampleFormat,
}

impl SourceInfo {
    /// Whether this source can be played on `config` without resampling
    /// or remixing.
    pub const fn matches(&self, config: &OutputConfig) -> bool {
        self.sample_rate == config.sample_rate && self.channels == config.channels
    }

    /// Length in seconds, when known.
    pub fn duration_secs(&self) -> Option<f64> {
        self.total_frames
            .map(|frames| frames as f64 / f64::from(self.sample_rate))
    }
}
