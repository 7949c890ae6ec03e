//! Output configuration.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use crate::{Error, Result, SampleFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Frames in one block. Every device callback cycle moves exactly one block.
pub const BLOCK_FRAMES: usize = 256;

/// Maximum number of interleaved channels an output supports.
pub const MAX_CHANNELS: u16 = 2;

/// Number of blocks queued between the file reader and the device callback.
/// Must be a power of two.
pub const RING_BLOCKS: usize = 32;

const _: () = assert!(RING_BLOCKS.is_power_of_two());

/// Configuration of one audio output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Sample representation of the device stream.
    pub format: SampleFormat,
    /// Sample rate in Hz. Sources must match it exactly.
    pub sample_rate: u32,
    /// Interleaved channel count. Sources must match it exactly.
    pub channels: u16,
    /// How long `stop` waits for the file reader to exit, in milliseconds.
    pub stop_timeout_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: SampleFormat::F32,
            sample_rate: 48000,
            channels: 2,
            stop_timeout_ms: 2000,
        }
    }
}

impl OutputConfig {
    pub fn new(format: SampleFormat, sample_rate: u32, channels: u16) -> Self {
        Self {
            format,
            sample_rate,
            channels,
            ..Self::default()
        }
    }

    /// Check that an output can be opened with this configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.format.is_pcm() {
            return Err(Error::UnsupportedFormat(self.format.to_string()));
        }
        if self.sample_rate == 0 {
            return Err(Error::Configuration(
                "sample rate must be at least 1 Hz".to_string(),
            ));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(Error::Configuration(format!(
                "{} channels requested, 1 to {MAX_CHANNELS} supported",
                self.channels
            )));
        }
        if self.stop_timeout_ms == 0 {
            return Err(Error::Configuration(
                "stop timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Bytes in one interleaved frame, or `None` for a custom format.
    pub fn frame_bytes(&self) -> Option<usize> {
        self.format
            .sample_width()
            .map(|width| width * usize::from(self.channels))
    }

    /// Bytes of audio carried by one block at this configuration.
    pub fn block_bytes(&self) -> Option<usize> {
        self.frame_bytes().map(|bytes| bytes * BLOCK_FRAMES)
    }

    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
