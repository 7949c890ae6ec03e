//! Test doubles: a device whose callback the test drives by hand, and an
//! in-memory source backend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use playout_core::{Error, Result, SampleFormat, SourceInfo, BLOCK_FRAMES};

use crate::decode::{SampleSource, SourceBackend};
use crate::format::DecodeCall;
use crate::output::{CallbackFlow, DeviceBackend, OutputStream, RenderFn, StreamParams};

/// Poll `cond` until it holds or a few seconds pass.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Source producing `total_frames` frames, each block filled with
/// [`ScriptedSource::fill_byte`] of its index.
pub struct ScriptedSource {
    info: SourceInfo,
    total_frames: usize,
    position: usize,
    unsupported: Option<DecodeCall>,
    gate: Option<(usize, Receiver<()>)>,
    closed: Arc<AtomicBool>,
}

impl ScriptedSource {
    pub fn new(sample_rate: u32, channels: u16, total_frames: usize) -> Self {
        Self {
            info: SourceInfo {
                sample_rate,
                channels,
                total_frames: Some(total_frames as u64),
                native_format: SampleFormat::I16,
            },
            total_frames,
            position: 0,
            unsupported: None,
            gate: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Byte every sample of block `index` is filled with. Never zero, so
    /// audio is distinguishable from silence.
    pub const fn fill_byte(index: u64) -> u8 {
        (index % 250) as u8 + 1
    }

    /// Block reads starting at or past `at_frame` until every sender of
    /// `gate` is dropped.
    pub fn gated(mut self, at_frame: usize, gate: Receiver<()>) -> Self {
        self.gate = Some((at_frame, gate));
        self
    }

    /// Set once the source has been dropped.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl SampleSource for ScriptedSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn supports(&self, call: DecodeCall) -> bool {
        self.unsupported != Some(call)
    }

    fn read_frames(&mut self, call: DecodeCall, dst: &mut [u8], frames: usize) -> Result<usize> {
        if let Some((at_frame, gate)) = &self.gate {
            if self.position >= *at_frame {
                let _ = gate.recv();
            }
        }
        let frame_bytes = call.width() * usize::from(self.info.channels);
        let count = frames.min(self.total_frames - self.position);
        if dst.len() < count * frame_bytes {
            return Err(Error::Decode("destination too small".to_string()));
        }
        for (i, frame) in dst.chunks_exact_mut(frame_bytes).take(count).enumerate() {
            let block = (self.position + i) / BLOCK_FRAMES;
            frame.fill(Self::fill_byte(block as u64));
        }
        self.position += count;
        Ok(count)
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Description of a file the [`ScriptedBackend`] can open.
#[derive(Debug, Clone)]
pub struct Script {
    pub sample_rate: u32,
    pub channels: u16,
    pub total_frames: usize,
    pub unsupported: Option<DecodeCall>,
    /// Frame at which reads stall, and the gate releasing them.
    pub gate: Option<(usize, Receiver<()>)>,
}

impl Script {
    pub fn new(sample_rate: u32, channels: u16, total_frames: usize) -> Self {
        Self {
            sample_rate,
            channels,
            total_frames,
            unsupported: None,
            gate: None,
        }
    }
}

/// Source backend serving [`ScriptedSource`]s by path. Unknown paths fail to
/// open.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: HashMap<PathBuf, Script>,
    opened: Mutex<Vec<Arc<AtomicBool>>>,
}

impl ScriptedBackend {
    pub fn with(mut self, path: &str, script: Script) -> Self {
        self.scripts.insert(PathBuf::from(path), script);
        self
    }

    /// Sources opened so far.
    pub fn opened(&self) -> usize {
        self.opened.lock().len()
    }

    /// Sources opened and not yet dropped.
    pub fn live_sources(&self) -> usize {
        self.opened
            .lock()
            .iter()
            .filter(|closed| !closed.load(Ordering::Acquire))
            .count()
    }
}

impl SourceBackend for ScriptedBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn SampleSource>> {
        let script = self
            .scripts
            .get(path)
            .ok_or_else(|| Error::Decode(format!("Failed to open {}", path.display())))?;
        let mut source =
            ScriptedSource::new(script.sample_rate, script.channels, script.total_frames);
        source.unsupported = script.unsupported;
        source.gate = script.gate.clone();
        self.opened.lock().push(source.closed_flag());
        Ok(Box::new(source))
    }
}

#[derive(Default)]
struct DeviceState {
    render: Option<RenderFn>,
    params: Option<StreamParams>,
    open_streams: usize,
    started: bool,
    completed: bool,
    fail_start: bool,
}

/// Device backend whose callback runs only when the test calls
/// [`ManualDevice::pump`]. Holds one stream at a time.
#[derive(Default)]
pub struct ManualDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl ManualDevice {
    pub fn open_streams(&self) -> usize {
        self.state.lock().open_streams
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Make the next stream starts fail.
    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    /// Run one device cycle of `frames` frames.
    ///
    /// Returns `None` when the stream is stopped or has completed, like a
    /// real device that no longer calls back.
    pub fn pump(&self, frames: usize) -> Option<(CallbackFlow, Vec<u8>)> {
        let mut state = self.state.lock();
        if !state.started || state.completed {
            return None;
        }
        let params = state.params?;
        let width = params.format.sample_width()?;
        let mut out = vec![0xEE; frames * usize::from(params.channels) * width];
        let render = state.render.as_mut()?;
        let flow = render(&mut out, frames);
        if flow == CallbackFlow::Complete {
            state.completed = true;
        }
        Some((flow, out))
    }
}

impl DeviceBackend for ManualDevice {
    fn open(&self, params: &StreamParams, render: RenderFn) -> Result<Box<dyn OutputStream>> {
        let mut state = self.state.lock();
        state.render = Some(render);
        state.params = Some(*params);
        state.open_streams += 1;
        state.started = false;
        Ok(Box::new(ManualStream {
            state: Arc::clone(&self.state),
        }))
    }
}

struct ManualStream {
    state: Arc<Mutex<DeviceState>>,
}

impl OutputStream for ManualStream {
    fn start(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_start {
            return Err(Error::Device("start refused".to_string()));
        }
        state.started = true;
        state.completed = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.lock().started = false;
        Ok(())
    }

    fn device_name(&self) -> &str {
        "manual"
    }
}

impl Drop for ManualStream {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.open_streams -= 1;
        state.started = false;
        state.render = None;
    }
}
