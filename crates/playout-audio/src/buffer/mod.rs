//! Lock-free buffer implementations for real-time audio.

pub mod block;
pub mod ring;

pub use block::{BlockState, FrameBlock, BLOCK_BYTES};
pub use ring::{Consumer, Producer, RingBuffer};
