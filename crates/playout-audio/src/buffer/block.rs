//! Fixed-size frame blocks passed from the file reader to the device callback.

use playout_core::{BLOCK_FRAMES, MAX_CHANNELS, MAX_SAMPLE_WIDTH};

/// Bytes in a block: room for the widest sample at the most channels.
pub const BLOCK_BYTES: usize = BLOCK_FRAMES * MAX_CHANNELS as usize * MAX_SAMPLE_WIDTH;

/// What the callback should do with a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockState {
    /// Output the samples.
    #[default]
    Playing,
    /// End of file. Output the (silent) samples, then complete the stream.
    Stopped,
}

/// One device cycle's worth of interleaved samples plus sync information.
#[derive(Clone)]
pub struct FrameBlock {
    pub state: BlockState,
    /// Absolute frame position of the first sample in the file.
    pub position: u64,
    data: [u8; BLOCK_BYTES],
}

impl FrameBlock {
    pub const fn data(&self) -> &[u8; BLOCK_BYTES] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8; BLOCK_BYTES] {
        &mut self.data
    }
}

impl Default for FrameBlock {
    fn default() -> Self {
        Self {
            state: BlockState::Playing,
            position: 0,
            data: [0; BLOCK_BYTES],
        }
    }
}

impl std::fmt::Debug for FrameBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBlock")
            .field("state", &self.state)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}
