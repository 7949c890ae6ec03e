//! Sample-format dispatch.
//!
//! Maps an output's [`SampleFormat`] to the decode call that produces samples
//! in exactly that in-memory layout, and checks at compile time that every
//! call's output width agrees with the format and fits a [`FrameBlock`].
//!
//! [`FrameBlock`]: crate::buffer::FrameBlock

use std::mem::size_of;

use playout_core::{Error, OutputConfig, Result, SampleFormat, BLOCK_FRAMES, MAX_CHANNELS};

use crate::buffer::BLOCK_BYTES;

/// Sample representation a decoder is asked to produce, in native byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeCall {
    Float32,
    Int32,
    /// Signed 24-bit, packed into three bytes.
    Int24,
    Int16,
    Int8,
    UInt8,
}

impl DecodeCall {
    /// Bytes written per sample.
    pub const fn width(self) -> usize {
        match self {
            Self::Float32 => size_of::<f32>(),
            Self::Int32 => size_of::<i32>(),
            Self::Int24 => size_of::<Packed24>(),
            Self::Int16 => size_of::<i16>(),
            Self::Int8 => size_of::<i8>(),
            Self::UInt8 => size_of::<u8>(),
        }
    }

    /// The decode call wired for `format`, if any.
    pub const fn for_format(format: SampleFormat) -> Option<Self> {
        match format {
            SampleFormat::F32 => Some(Self::Float32),
            SampleFormat::I32 => Some(Self::Int32),
            SampleFormat::I24 => Some(Self::Int24),
            SampleFormat::I16 => Some(Self::Int16),
            SampleFormat::I8 => Some(Self::Int8),
            SampleFormat::U8 => Some(Self::UInt8),
            SampleFormat::Custom => None,
        }
    }

    /// Byte value of a silent sample in this representation.
    pub const fn silence(self) -> u8 {
        match self {
            Self::UInt8 => 0x80,
            _ => 0,
        }
    }
}

/// Every wired format must decode to exactly its own width, and a full block
/// at the widest width must fit the block storage.
const fn layout_is_consistent() -> bool {
    let mut i = 0;
    while i < SampleFormat::PCM.len() {
        let format = SampleFormat::PCM[i];
        let (Some(call), Some(width)) = (DecodeCall::for_format(format), format.sample_width())
        else {
            return false;
        };
        if call.width() != width {
            return false;
        }
        if BLOCK_FRAMES * MAX_CHANNELS as usize * width > BLOCK_BYTES {
            return false;
        }
        i += 1;
    }
    true
}

const _: () = assert!(layout_is_consistent());

/// How one output's blocks are laid out and filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub call: DecodeCall,
    pub channels: u16,
    /// Bytes per interleaved frame.
    pub frame_bytes: usize,
    /// Bytes of audio in one block; always `<= BLOCK_BYTES`.
    pub block_bytes: usize,
}

impl BlockLayout {
    /// Resolve the layout for an output configuration.
    pub fn for_config(config: &OutputConfig) -> Result<Self> {
        config.validate()?;
        let unsupported = || Error::UnsupportedFormat(config.format.to_string());
        let call = DecodeCall::for_format(config.format).ok_or_else(unsupported)?;
        // Same widths as `call`, checked by `layout_is_consistent`.
        let frame_bytes = config.frame_bytes().ok_or_else(unsupported)?;
        let block_bytes = config.block_bytes().ok_or_else(unsupported)?;
        Ok(Self {
            call,
            channels: config.channels,
            frame_bytes,
            block_bytes,
        })
    }

    pub const fn silence(&self) -> u8 {
        self.call.silence()
    }
}

/// A signed 24-bit sample stored as three native-order bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packed24([u8; 3]);

impl Packed24 {
    /// Keep the top 24 bits of a full-scale 32-bit sample.
    pub const fn from_i32(sample: i32) -> Self {
        let bytes = (sample >> 8).to_ne_bytes();
        if cfg!(target_endian = "little") {
            Self([bytes[0], bytes[1], bytes[2]])
        } else {
            Self([bytes[1], bytes[2], bytes[3]])
        }
    }

    pub const fn from_ne_bytes(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    pub const fn to_i32(self) -> i32 {
        let [a, b, c] = self.0;
        let wide = if cfg!(target_endian = "little") {
            [0, a, b, c]
        } else {
            [a, b, c, 0]
        };
        i32::from_ne_bytes(wide) >> 8
    }
}

/// A sample type a decode call writes, in native byte order.
pub trait PcmSample: Copy {
    const CALL: DecodeCall;

    fn extend_bytes(self, out: &mut Vec<u8>);
}

macro_rules! impl_pcm_sample {
    ($ty:ty, $call:expr) => {
        impl PcmSample for $ty {
            const CALL: DecodeCall = $call;

            fn extend_bytes(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_ne_bytes());
            }
        }

        const _: () = assert!(size_of::<$ty>() == <$ty as PcmSample>::CALL.width());
    };
}

impl_pcm_sample!(f32, DecodeCall::Float32);
impl_pcm_sample!(i32, DecodeCall::Int32);
impl_pcm_sample!(i16, DecodeCall::Int16);
impl_pcm_sample!(i8, DecodeCall::Int8);
impl_pcm_sample!(u8, DecodeCall::UInt8);

impl PcmSample for Packed24 {
    const CALL: DecodeCall = DecodeCall::Int24;

    fn extend_bytes(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
}

const _: () = assert!(size_of::<Packed24>() == DecodeCall::Int24.width());

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;

    #[test]
    fn test_every_pcm_format_is_wired() {
        for format in SampleFormat::PCM {
            let call = DecodeCall::for_format(format).unwrap();
            assert_eq!(Some(call.width()), format.sample_width());
        }
        assert_eq!(DecodeCall::for_format(SampleFormat::Custom), None);
    }

    #[test]
    fn test_layout_for_config() {
        let layout =
            BlockLayout::for_config(&OutputConfig::new(SampleFormat::I16, 44100, 2)).unwrap();
        assert_eq!(layout.call, DecodeCall::Int16);
        assert_eq!(layout.frame_bytes, 4);
        assert_eq!(layout.block_bytes, 1024);

        let mono_u8 =
            BlockLayout::for_config(&OutputConfig::new(SampleFormat::U8, 8000, 1)).unwrap();
        assert_eq!(mono_u8.silence(), 0x80);

        let err = BlockLayout::for_config(&OutputConfig::new(SampleFormat::Custom, 44100, 2));
        assert!(matches!(err, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_packed24_keeps_top_bits() {
        for sample in [0, 1 << 8, -(1 << 8), i32::MAX, i32::MIN, 0x1234_5600] {
            assert_eq!(Packed24::from_i32(sample).to_i32(), sample >> 8);
        }
        let mut out = Vec::new();
        Packed24::from_i32(i32::MIN).extend_bytes(&mut out);
        assert_eq!(out.len(), 3);
    }
}
