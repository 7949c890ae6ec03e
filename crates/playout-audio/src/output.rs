//! Audio output devices.
//!
//! [`DeviceBackend`] opens an [`OutputStream`] that invokes a render callback
//! once per buffer on the device's own thread. The production backend uses
//! cpal with a fixed buffer size and raw byte buffers in the stream's sample
//! format.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, Device, SampleRate, Stream, StreamConfig,
};
use playout_core::{Error, Result, SampleFormat};
use tracing::{debug, error, info};

use crate::format::DecodeCall;

/// What the device should do after a render callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackFlow {
    /// Keep calling back.
    Continue,
    /// The stream is finished; output silence until it is restarted.
    Complete,
}

/// Render callback: fills an interleaved byte buffer holding `frames` frames.
pub type RenderFn = Box<dyn FnMut(&mut [u8], usize) -> CallbackFlow + Send + 'static>;

/// Parameters of an output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames the device asks for per callback.
    pub block_frames: usize,
}

/// Opens output streams.
pub trait DeviceBackend: Send + Sync {
    fn open(&self, params: &StreamParams, render: RenderFn) -> Result<Box<dyn OutputStream>>;
}

/// An open output stream. Dropping it closes the stream.
pub trait OutputStream {
    /// Start (or restart) calling the render callback.
    fn start(&mut self) -> Result<()>;

    /// Stop calling the render callback.
    fn stop(&mut self) -> Result<()>;

    /// Human-readable device name.
    fn device_name(&self) -> &str;
}

/// cpal-backed [`DeviceBackend`] using the default host.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    /// Output device to use; the default output device when `None`.
    pub device_name: Option<String>,
}

impl CpalBackend {
    /// Use a specific output device by name.
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    fn find_device(&self) -> Result<Device> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_output_device()
                .ok_or_else(|| Error::Device("No output device found".to_string())),
            Some(wanted) => host
                .output_devices()
                .map_err(|e| Error::Device(format!("Failed to list devices: {e}")))?
                .find(|d| d.name().is_ok_and(|name| &name == wanted))
                .ok_or_else(|| Error::Device(format!("Output device not found: {wanted}"))),
        }
    }
}

impl DeviceBackend for CpalBackend {
    fn open(&self, params: &StreamParams, mut render: RenderFn) -> Result<Box<dyn OutputStream>> {
        let device = self.find_device()?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio output device: {device_name}");

        let sample_format = cpal_format(params.format)?;
        let silence = DecodeCall::for_format(params.format).map_or(0, DecodeCall::silence);
        let config = StreamConfig {
            channels: params.channels,
            sample_rate: SampleRate(params.sample_rate),
            buffer_size: BufferSize::Fixed(params.block_frames as u32),
        };

        debug!(
            "Output config: {}Hz, {} channels, {} ({} frames per buffer)",
            params.sample_rate, params.channels, params.format, params.block_frames
        );

        let completed = Arc::new(AtomicBool::new(false));
        let completed_cb = Arc::clone(&completed);
        let channels = usize::from(params.channels);

        let err_fn = |err| {
            error!("Audio stream error: {err}");
        };

        let stream = device
            .build_output_stream_raw(
                &config,
                sample_format,
                move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    let bytes = data.bytes_mut();
                    if completed_cb.load(Ordering::Acquire) {
                        bytes.fill(silence);
                        return;
                    }
                    if render(bytes, frames) == CallbackFlow::Complete {
                        completed_cb.store(true, Ordering::Release);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::Device(format!("Failed to build stream: {e}")))?;

        // Some hosts start streams as soon as they are built.
        stream
            .pause()
            .map_err(|e| Error::Device(format!("Failed to pause new stream: {e}")))?;

        Ok(Box::new(CpalStream {
            stream,
            completed,
            device_name,
        }))
    }
}

/// Map a sample format to cpal's. cpal has no packed 24-bit format.
fn cpal_format(format: SampleFormat) -> Result<cpal::SampleFormat> {
    match format {
        SampleFormat::F32 => Ok(cpal::SampleFormat::F32),
        SampleFormat::I32 => Ok(cpal::SampleFormat::I32),
        SampleFormat::I16 => Ok(cpal::SampleFormat::I16),
        SampleFormat::I8 => Ok(cpal::SampleFormat::I8),
        SampleFormat::U8 => Ok(cpal::SampleFormat::U8),
        SampleFormat::I24 | SampleFormat::Custom => Err(Error::UnsupportedFormat(format!(
            "{format} is not supported by the audio device"
        ))),
    }
}

/// Audio output stream wrapper.
struct CpalStream {
    stream: Stream,
    completed: Arc<AtomicBool>,
    device_name: String,
}

impl OutputStream for CpalStream {
    fn start(&mut self) -> Result<()> {
        self.completed.store(false, Ordering::Release);
        self.stream
            .play()
            .map_err(|e| Error::Device(format!("Failed to start stream: {e}")))
    }

    fn stop(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| Error::Device(format!("Failed to stop stream: {e}")))
    }

    fn device_name(&self) -> &str {
        &self.device_name
    }
}

/// List available output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::Device(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok(devices)
}

/// Get the default output device name.
pub fn default_device_name() -> Option<String> {
    let host = cpal::default_host();
    host.default_output_device().and_then(|d| d.name().ok())
}
