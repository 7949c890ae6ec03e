//! File reader worker.
//!
//! A dedicated thread decodes blocks into every free ring-buffer slot each
//! time it is woken. The device callback wakes it after consuming a block;
//! the owner wakes it with the exit flag set to shut it down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use playout_core::{Error, Result, BLOCK_FRAMES, RING_BLOCKS};
use tracing::{debug, error, info, warn};

use crate::buffer::{BlockState, FrameBlock, Producer};
use crate::decode::SampleSource;
use crate::format::BlockLayout;

/// Non-blocking wake handle for the reader (the "post" side of its semaphore).
#[derive(Clone)]
pub struct ReaderWake {
    tx: Sender<()>,
}

impl ReaderWake {
    /// Add one wake-up. Never blocks: when the count is already saturated the
    /// reader has wake-ups pending and will see the free slots anyway.
    pub fn post(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Counting semaphore with an initial count, as a bounded channel of tokens.
pub(crate) fn semaphore(initial: usize) -> Result<(ReaderWake, Receiver<()>)> {
    let (tx, rx) = bounded(RING_BLOCKS);
    for _ in 0..initial {
        tx.try_send(())
            .map_err(|e| Error::Resource(format!("Failed to initialize reader semaphore: {e}")))?;
    }
    Ok((ReaderWake { tx }, rx))
}

/// Where the reader is in its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderStatus {
    /// Decoding.
    Running,
    /// The end-of-file block has been queued.
    Drained,
    /// Decoding failed; no more blocks will be queued.
    Failed(String),
}

/// Reader state shared with the owning output.
#[derive(Debug)]
pub struct ReaderShared {
    exit: AtomicBool,
    status: Mutex<ReaderStatus>,
}

impl ReaderShared {
    fn new() -> Self {
        Self {
            exit: AtomicBool::new(false),
            status: Mutex::new(ReaderStatus::Running),
        }
    }

    pub fn status(&self) -> ReaderStatus {
        self.status.lock().clone()
    }

    fn set_status(&self, status: ReaderStatus) {
        *self.status.lock() = status;
    }

    fn should_exit(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }
}

/// The worker. Owns the producer half of the ring, the source, and the frame
/// cursor.
struct FileReader {
    source: Box<dyn SampleSource>,
    blocks: Producer<FrameBlock>,
    layout: BlockLayout,
    wake: Receiver<()>,
    shared: Arc<ReaderShared>,
    /// Signalled after the first fill pass; dropped when the thread ends.
    ready: Option<Sender<()>>,
    /// Frames read from the source so far.
    position: u64,
    drained: bool,
}

impl FileReader {
    fn run(mut self) {
        debug!("File reader started");

        while self.wake.recv().is_ok() {
            if self.shared.should_exit() {
                break;
            }
            if self.drained {
                continue;
            }
            if let Err(e) = self.fill_free_slots() {
                error!("File reader stopped: {e}");
                self.shared.set_status(ReaderStatus::Failed(e.to_string()));
                return;
            }
            if let Some(ready) = self.ready.take() {
                let _ = ready.try_send(());
            }
        }

        debug!("File reader exiting after {} frames", self.position);
    }

    /// Decode one block into every free slot, publishing each as it's done.
    fn fill_free_slots(&mut self) -> Result<()> {
        let free = self.blocks.write_available();

        for _ in 0..free {
            if self.shared.should_exit() || self.drained {
                break;
            }

            let (slots, _) = self.blocks.write_regions(1);
            let Some(block) = slots.first_mut() else {
                break;
            };

            let frames = self.source.read_frames(
                self.layout.call,
                &mut block.data_mut()[..self.layout.block_bytes],
                BLOCK_FRAMES,
            )?;
            if frames != 0 && frames != BLOCK_FRAMES {
                return Err(Error::ShortRead {
                    expected: BLOCK_FRAMES,
                    actual: frames,
                });
            }

            block.position = self.position;
            self.position += frames as u64;

            if frames == 0 {
                // The callback copies the block out before completing.
                block.data_mut()[..self.layout.block_bytes].fill(self.layout.silence());
                block.state = BlockState::Stopped;
                self.drained = true;
            } else {
                block.state = BlockState::Playing;
            }

            self.blocks.advance_write(1);
        }

        if self.drained {
            debug!("Reached end of file at frame {}", self.position);
            self.shared.set_status(ReaderStatus::Drained);
        }
        Ok(())
    }
}

/// Owner's handle on a running reader thread.
///
/// Dropping the handle shuts the thread down.
pub struct ReaderHandle {
    thread: Option<JoinHandle<()>>,
    wake: ReaderWake,
    shared: Arc<ReaderShared>,
    /// Disconnects when the thread ends, however it ends.
    finished: Receiver<()>,
    ready: Receiver<()>,
    stop_timeout: Duration,
    detached: bool,
}

impl ReaderHandle {
    /// Start a reader filling `blocks` from `source`.
    ///
    /// Returns the handle and a wake handle for the consumer side.
    pub fn spawn(
        source: Box<dyn SampleSource>,
        blocks: Producer<FrameBlock>,
        layout: BlockLayout,
        stop_timeout: Duration,
    ) -> Result<(Self, ReaderWake)> {
        // Initial count 1 so the reader fills the buffer straight away.
        let (wake, wake_rx) = semaphore(1)?;
        let shared = Arc::new(ReaderShared::new());
        let (finished_tx, finished) = bounded::<()>(0);
        let (ready_tx, ready) = bounded::<()>(1);

        let reader = FileReader {
            source,
            blocks,
            layout,
            wake: wake_rx,
            shared: Arc::clone(&shared),
            ready: Some(ready_tx),
            position: 0,
            drained: false,
        };

        let thread = std::thread::Builder::new()
            .name("playout-reader".to_string())
            .spawn(move || {
                let _finished = finished_tx;
                reader.run();
            })
            .map_err(|e| Error::Resource(format!("Failed to spawn reader thread: {e}")))?;

        Ok((
            Self {
                thread: Some(thread),
                wake: wake.clone(),
                shared,
                finished,
                ready,
                stop_timeout,
                detached: false,
            },
            wake,
        ))
    }

    pub fn status(&self) -> ReaderStatus {
        self.shared.status()
    }

    /// Wait until the ring has been filled once, or the reader has stopped.
    ///
    /// Returns `false` if `timeout` passed first.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        !matches!(
            self.ready.recv_timeout(timeout),
            Err(RecvTimeoutError::Timeout)
        )
    }

    /// Ask the thread to exit and wait for it, up to the stop timeout.
    ///
    /// A thread that doesn't exit in time (stuck in decoder I/O) is detached;
    /// it only holds reference-counted state and exits on its next wake-up.
    /// Returns `true` if the thread was joined, so its producer is halted.
    pub fn shutdown(&mut self) -> bool {
        let Some(thread) = self.thread.take() else {
            return !self.detached;
        };

        self.shared.exit.store(true, Ordering::Release);
        self.wake.post();

        match self.finished.recv_timeout(self.stop_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "File reader did not exit within {:?}, detaching it",
                    self.stop_timeout
                );
                self.detached = true;
                false
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    error!("File reader thread panicked");
                }
                info!("File reader stopped");
                true
            }
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
