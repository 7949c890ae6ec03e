//! Render callback run on the device's real-time thread.
//!
//! Nothing here allocates, logs, or waits: the only lock taken unconditionally
//! is the clock's, once, on the first block of a session.

use std::sync::Arc;

use parking_lot::Mutex;
use playout_core::BLOCK_FRAMES;

use crate::buffer::{BlockState, Consumer, FrameBlock};
use crate::clock::PlaybackClock;
use crate::format::BlockLayout;
use crate::output::CallbackFlow;
use crate::reader::ReaderWake;

/// Consumer side of one playback session.
pub struct PlaybackCallback {
    blocks: Consumer<FrameBlock>,
    wake: ReaderWake,
    clock: Arc<PlaybackClock>,
    sample_rate: f64,
    block_bytes: usize,
    silence: u8,
    started: bool,
}

impl PlaybackCallback {
    pub fn new(
        blocks: Consumer<FrameBlock>,
        wake: ReaderWake,
        clock: Arc<PlaybackClock>,
        layout: &BlockLayout,
        sample_rate: u32,
    ) -> Self {
        Self {
            blocks,
            wake,
            clock,
            sample_rate: f64::from(sample_rate),
            block_bytes: layout.block_bytes,
            silence: layout.silence(),
            started: false,
        }
    }

    /// Play one block into `out`, which must hold exactly one block.
    pub fn render(&mut self, out: &mut [u8], frames: usize) -> CallbackFlow {
        let flow = self.play_block(out, frames);
        // Posted after the slot is released so the reader sees it free.
        self.wake.post();
        flow
    }

    fn play_block(&mut self, out: &mut [u8], frames: usize) -> CallbackFlow {
        if frames != BLOCK_FRAMES || out.len() != self.block_bytes {
            return self.halt(out);
        }

        let (filled, _) = self.blocks.read_regions(1);
        let Some(block) = filled.first() else {
            // Underrun.
            return self.halt(out);
        };

        if self.started {
            // Precision loss only past 2^52 frames.
            #[allow(clippy::cast_precision_loss)]
            let now = block.position as f64 / self.sample_rate;
            self.clock.try_advance(now);
        } else {
            self.clock.start();
            self.started = true;
        }

        out.copy_from_slice(&block.data()[..self.block_bytes]);
        let state = block.state;
        self.blocks.advance_read(1);

        match state {
            BlockState::Playing => CallbackFlow::Continue,
            BlockState::Stopped => {
                self.clock.mark_not_playing();
                CallbackFlow::Complete
            }
        }
    }

    fn halt(&self, out: &mut [u8]) -> CallbackFlow {
        self.clock.mark_not_playing();
        out.fill(self.silence);
        CallbackFlow::Complete
    }

    /// Blocks queued and not yet played.
    pub fn buffered(&self) -> usize {
        self.blocks.read_available()
    }

    /// Drop every queued block. Only valid once the reader has stopped.
    pub fn flush(&mut self) -> usize {
        self.blocks.flush()
    }
}

/// What the device closure runs.
pub enum CallbackMode {
    /// No session: output silence and complete.
    Idle,
    Playing(PlaybackCallback),
}

/// The callback installed in an output's device stream.
///
/// The device closure dispatches through it with a non-blocking lock. Owners
/// swap the mode with a blocking lock, which also guarantees no render is in
/// flight once the swap returns.
pub struct CallbackSlot {
    mode: Mutex<CallbackMode>,
    silence: u8,
}

impl CallbackSlot {
    pub fn new(silence: u8) -> Self {
        Self {
            mode: Mutex::new(CallbackMode::Idle),
            silence,
        }
    }

    pub fn render(&self, out: &mut [u8], frames: usize) -> CallbackFlow {
        let Some(mut mode) = self.mode.try_lock() else {
            // Being swapped by the owner; skip this cycle.
            out.fill(self.silence);
            return CallbackFlow::Continue;
        };
        match &mut *mode {
            CallbackMode::Idle => {
                out.fill(self.silence);
                CallbackFlow::Complete
            }
            CallbackMode::Playing(callback) => callback.render(out, frames),
        }
    }

    pub fn install(&self, callback: PlaybackCallback) {
        *self.mode.lock() = CallbackMode::Playing(callback);
    }

    /// Swap in [`CallbackMode::Idle`], returning what was installed.
    pub fn clear(&self) -> CallbackMode {
        std::mem::replace(&mut *self.mode.lock(), CallbackMode::Idle)
    }

    /// Blocks queued for the device, or `None` if a render holds the slot.
    pub fn buffered_blocks(&self) -> Option<usize> {
        self.mode.try_lock().map(|mode| match &*mode {
            CallbackMode::Idle => 0,
            CallbackMode::Playing(callback) => callback.buffered(),
        })
    }
}
