//! Sample format types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Widest sample representation an output can use, in bytes.
pub const MAX_SAMPLE_WIDTH: usize = 4;

/// PCM sample representation used by an output and its device stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 32-bit IEEE float.
    #[default]
    F32,
    /// Signed 32-bit integer.
    I32,
    /// Signed 24-bit integer, packed into three bytes.
    I24,
    /// Signed 16-bit integer.
    I16,
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Anything else. Never playable.
    Custom,
}

impl SampleFormat {
    /// All formats with a known width.
    pub const PCM: [Self; 6] = [Self::F32, Self::I32, Self::I24, Self::I16, Self::I8, Self::U8];

    /// Width of one sample in bytes, or `None` for [`SampleFormat::Custom`].
    pub const fn sample_width(self) -> Option<usize> {
        match self {
            Self::F32 | Self::I32 => Some(4),
            Self::I24 => Some(3),
            Self::I16 => Some(2),
            Self::I8 | Self::U8 => Some(1),
            Self::Custom => None,
        }
    }

    /// Whether this is one of the enumerated PCM variants.
    pub const fn is_pcm(self) -> bool {
        self.sample_width().is_some()
    }

    /// Short lowercase name, as used in logs and configuration files.
    pub const fn name(self) -> &'static str {
        match self {
            Self::F32 => "float32",
            Self::I32 => "int32",
            Self::I24 => "int24",
            Self::I16 => "int16",
            Self::I8 => "int8",
            Self::U8 => "uint8",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_widths() {
        assert_eq!(SampleFormat::F32.sample_width(), Some(4));
        assert_eq!(SampleFormat::I24.sample_width(), Some(3));
        assert_eq!(SampleFormat::U8.sample_width(), Some(1));
        assert_eq!(SampleFormat::Custom.sample_width(), None);
    }

    #[test]
    fn test_no_pcm_format_exceeds_max_width() {
        for format in SampleFormat::PCM {
            let width = format.sample_width();
            assert!(width.is_some_and(|w| w <= MAX_SAMPLE_WIDTH), "{format}");
        }
        assert!(!SampleFormat::Custom.is_pcm());
    }
}
