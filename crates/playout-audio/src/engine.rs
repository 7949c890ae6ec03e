//! Output lifecycle: opening device streams and running playback sessions.
//!
//! An [`AudioContext`] owns the device and decoder backends. Each [`Output`]
//! it opens owns one device stream and at most one session; a session ties
//! together the reader thread, the ring buffer, the decoder, and the clock,
//! which are established together by [`Output::play`] and released together
//! by [`Output::stop`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use playout_core::{
    Error, OutputConfig, Result, SampleFormat, SourceInfo, BLOCK_FRAMES, RING_BLOCKS,
};
use tracing::{debug, info, warn};

use crate::buffer::RingBuffer;
use crate::callback::{CallbackMode, CallbackSlot, PlaybackCallback};
use crate::clock::{PlaybackClock, PlaybackTime};
use crate::decode::{self, SourceBackend, SymphoniaBackend};
use crate::format::BlockLayout;
use crate::output::{CpalBackend, DeviceBackend, OutputStream, StreamParams};
use crate::reader::{ReaderHandle, ReaderStatus};

/// How long state queries wait for the clock lock.
const QUERY_WAIT: Duration = Duration::from_millis(10);

/// Where an output's session is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No session.
    Idle,
    /// Blocks are being played, or are about to be.
    Playing,
    /// The stream completed: end of file, underrun, or a device buffer of the
    /// wrong size. `stop` releases the session.
    Finished,
    /// The reader hit a decode error. Queued blocks still play out.
    Failed(String),
}

/// Entry point: the device and decoder backends outputs are created from.
pub struct AudioContext {
    device: Arc<dyn DeviceBackend>,
    sources: Arc<dyn SourceBackend>,
}

impl AudioContext {
    pub fn new(device: Arc<dyn DeviceBackend>, sources: Arc<dyn SourceBackend>) -> Self {
        Self { device, sources }
    }

    /// The default output device through cpal, and symphonia for decoding.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(CpalBackend::default()), Arc::new(SymphoniaBackend))
    }

    /// Open an output with the default stop timeout.
    ///
    /// Every PCM format is accepted here, but a device backend may still
    /// refuse one: cpal has no packed 24-bit stream, so [`CpalBackend`]
    /// fails [`SampleFormat::I24`] with [`Error::UnsupportedFormat`].
    pub fn open_output(
        &self,
        format: SampleFormat,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Output> {
        self.open_output_with(OutputConfig::new(format, sample_rate, channels))
    }

    /// Open a device stream for `config`. The stream starts idle.
    pub fn open_output_with(&self, config: OutputConfig) -> Result<Output> {
        let layout = BlockLayout::for_config(&config)?;
        let slot = Arc::new(CallbackSlot::new(layout.silence()));

        let params = StreamParams {
            format: config.format,
            sample_rate: config.sample_rate,
            channels: config.channels,
            block_frames: BLOCK_FRAMES,
        };
        let render_slot = Arc::clone(&slot);
        let stream = self.device.open(
            &params,
            Box::new(move |out: &mut [u8], frames| render_slot.render(out, frames)),
        )?;

        info!(
            "Opened output on {}: {}Hz, {} channels, {}",
            stream.device_name(),
            config.sample_rate,
            config.channels,
            config.format
        );

        Ok(Output {
            config,
            layout,
            stream,
            slot,
            sources: Arc::clone(&self.sources),
            session: None,
        })
    }

    /// Report a file's format without playing it.
    pub fn inspect_file(&self, path: impl AsRef<Path>) -> Result<SourceInfo> {
        decode::inspect(self.sources.as_ref(), path.as_ref())
    }
}

/// State that exists only while a file is playing.
struct Session {
    reader: ReaderHandle,
    clock: Arc<PlaybackClock>,
    path: PathBuf,
}

/// One device stream and the file playing on it, if any.
///
/// Dropping an output stops it and closes the stream.
pub struct Output {
    config: OutputConfig,
    layout: BlockLayout,
    stream: Box<dyn OutputStream>,
    slot: Arc<CallbackSlot>,
    sources: Arc<dyn SourceBackend>,
    session: Option<Session>,
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("config", &self.config)
            .field("layout", &self.layout)
            .field("device_name", &self.stream.device_name())
            .field("playing", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl Output {
    pub const fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn device_name(&self) -> &str {
        self.stream.device_name()
    }

    /// Checks that must pass before any session resource is acquired.
    fn preflight(&self) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyPlaying);
        }
        Ok(())
    }

    /// Start playing `path`.
    ///
    /// The file must match the output's sample rate and channel count
    /// exactly. On any error nothing of the session is left behind.
    pub fn play(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.preflight()?;

        if let Err(e) = self.stream.stop() {
            warn!("Failed to stop stream before playing: {e}");
        }

        let source = self.sources.open(path)?;
        let info = source.info();
        if !info.matches(&self.config) {
            return Err(Error::FormatMismatch(format!(
                "{} is {}Hz with {} channels, output is {}Hz with {} channels",
                path.display(),
                info.sample_rate,
                info.channels,
                self.config.sample_rate,
                self.config.channels
            )));
        }
        if !source.supports(self.layout.call) {
            return Err(Error::UnsupportedFormat(format!(
                "{} cannot be decoded as {}",
                path.display(),
                self.config.format
            )));
        }
        debug!(
            "Opened {}: {}Hz, {} channels, native {}, {:?}s long",
            path.display(),
            info.sample_rate,
            info.channels,
            info.native_format,
            info.duration_secs()
        );

        let (producer, consumer) = RingBuffer::with_capacity(RING_BLOCKS)?.split();
        let clock = Arc::new(PlaybackClock::new());
        let (reader, wake) =
            ReaderHandle::spawn(source, producer, self.layout, self.config.stop_timeout())?;

        self.slot.install(PlaybackCallback::new(
            consumer,
            wake,
            Arc::clone(&clock),
            &self.layout,
            self.config.sample_rate,
        ));
        if !reader.wait_ready(self.config.stop_timeout()) {
            warn!("Starting playback before the buffer filled");
        }

        if let Err(e) = self.stream.start() {
            // Dropping the reader joins it and closes the source.
            self.slot.clear();
            drop(reader);
            return Err(e);
        }

        self.session = Some(Session {
            reader,
            clock,
            path: path.to_path_buf(),
        });
        std::thread::yield_now();

        info!("Playing {}", path.display());
        Ok(())
    }

    /// End the session, if any. Always succeeds and may be called repeatedly.
    pub fn stop(&mut self) {
        if let Err(e) = self.stream.stop() {
            warn!("Failed to stop output stream: {e}");
        }
        // Once the slot is idle no render is running, even if the device
        // ignored the stop.
        let mode = self.slot.clear();

        let Some(mut session) = self.session.take() else {
            return;
        };
        let joined = session.reader.shutdown();

        if let CallbackMode::Playing(mut callback) = mode {
            // A detached reader may still publish; its queue is dropped
            // with the callback instead.
            if joined {
                let discarded = callback.flush();
                debug!("Discarded {discarded} queued blocks");
            }
        }
        info!("Stopped {}", session.path.display());
    }

    /// Stop and close the output.
    pub fn delete(mut self) {
        self.stop();
    }

    /// Whether audio from the session is being played right now.
    pub fn is_playing(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.clock.is_playing(QUERY_WAIT))
    }

    /// Seconds of the session played so far.
    pub fn time_in_playback(&self) -> PlaybackTime {
        self.session
            .as_ref()
            .map_or(PlaybackTime::NotStarted, |session| {
                session.clock.time_in_playback(QUERY_WAIT)
            })
    }

    /// Why the reader stopped decoding, if it failed.
    pub fn reader_failure(&self) -> Option<String> {
        match self.session.as_ref()?.reader.status() {
            ReaderStatus::Failed(reason) => Some(reason),
            ReaderStatus::Running | ReaderStatus::Drained => None,
        }
    }

    pub fn session_state(&self) -> SessionState {
        let Some(session) = &self.session else {
            return SessionState::Idle;
        };
        if let ReaderStatus::Failed(reason) = session.reader.status() {
            return SessionState::Failed(reason);
        }
        if session.clock.has_halted() {
            SessionState::Finished
        } else {
            SessionState::Playing
        }
    }

    /// Blocks decoded and waiting for the device, or `None` if the device
    /// callback is running.
    pub fn buffered_blocks(&self) -> Option<usize> {
        self.slot.buffered_blocks()
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        self.stop();
        debug!("Closing output on {}", self.stream.device_name());
    }
}
