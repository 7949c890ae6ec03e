//! Audio file decoding.
//!
//! [`SourceBackend`] opens files and [`SampleSource`] reads whole frames from
//! them in a requested [`DecodeCall`] representation. The production backend
//! wraps symphonia.

use std::fs::File;
use std::path::Path;

use playout_core::{Error, Result, SampleFormat, SourceInfo};
use symphonia::core::{
    audio::{AudioBufferRef, SampleBuffer},
    codecs::{
        CodecType, Decoder, DecoderOptions, CODEC_TYPE_NULL, CODEC_TYPE_PCM_F32BE,
        CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_S16BE, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_S24BE,
        CODEC_TYPE_PCM_S24LE, CODEC_TYPE_PCM_S32BE, CODEC_TYPE_PCM_S32LE, CODEC_TYPE_PCM_S8,
        CODEC_TYPE_PCM_U8, CODEC_TYPE_VORBIS,
    },
    conv::ConvertibleSample,
    formats::{FormatOptions, FormatReader},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
    sample::{Sample, SampleFormat as SymphoniaSampleFormat},
};
use tracing::{debug, error, trace};

use crate::format::{DecodeCall, Packed24, PcmSample};

/// Opens audio files for reading.
pub trait SourceBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn SampleSource>>;
}

/// An opened audio file. Dropping it closes the file.
pub trait SampleSource: Send {
    fn info(&self) -> SourceInfo;

    /// Whether `read_frames` can produce this representation.
    fn supports(&self, call: DecodeCall) -> bool {
        let _ = call;
        true
    }

    /// Read up to `frames` interleaved frames into `dst` as `call` samples.
    ///
    /// Returns the number of frames written; 0 means end of file. Fewer than
    /// `frames` is only returned when the file ends mid-request.
    fn read_frames(&mut self, call: DecodeCall, dst: &mut [u8], frames: usize) -> Result<usize>;
}

/// Symphonia-backed [`SourceBackend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaBackend;

impl SourceBackend for SymphoniaBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn SampleSource>> {
        Ok(Box::new(AudioDecoder::open(path)?))
    }
}

/// Audio decoder wrapping symphonia.
pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: SourceInfo,
    /// Converted bytes not yet handed out.
    pending: Vec<u8>,
    /// Read offset into `pending`.
    cursor: usize,
    /// Representation `pending` is encoded in.
    pending_call: Option<DecodeCall>,
    finished: bool,
}

impl AudioDecoder {
    /// Open a file and detect its container format.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::Decode(format!("Failed to open {}: {e}", path.display())))?;
        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let metadata_opts = MetadataOptions::default();

        let detected = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|e| Error::Decode(format!("Failed to detect format: {e}")))?;

        let format = detected.format;

        // Find the first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio tracks found".to_string()))?;

        let params = &track.codec_params;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::Decode("Track has no sample rate".to_string()))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Track has no channel layout".to_string()))?;
        let native_format = params
            .sample_format
            .map_or_else(|| format_for_codec(params.codec), map_sample_format);

        let info = SourceInfo {
            sample_rate,
            channels,
            total_frames: params.n_frames,
            native_format,
        };
        let track_id = track.id;

        debug!(
            "Audio track: id={}, sample_rate={}, channels={}, native={}",
            track_id, sample_rate, channels, native_format
        );

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {e}")))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            info,
            pending: Vec::new(),
            cursor: 0,
            pending_call: None,
            finished: false,
        })
    }

    /// Decode the next packet of this track into `pending`.
    ///
    /// Returns `false` at end of stream.
    fn decode_next(&mut self, call: DecodeCall) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false); // End of stream
                }
                Err(symphonia::core::errors::Error::ResetRequired) => return Ok(false),
                Err(e) => {
                    return Err(Error::Decode(format!("Failed to read packet: {e}")));
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    append_samples(decoded, call, &mut self.pending);
                    return Ok(true);
                }
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    // Log and skip corrupt frames
                    error!("Decode error (skipping): {e}");
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Decode failed: {e}")));
                }
            }
        }
    }

    fn buffered(&self) -> usize {
        self.pending.len() - self.cursor
    }
}

impl SampleSource for AudioDecoder {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn read_frames(&mut self, call: DecodeCall, dst: &mut [u8], frames: usize) -> Result<usize> {
        if self.pending_call != Some(call) {
            // Bytes converted for another representation can't be reused.
            self.pending.clear();
            self.cursor = 0;
            self.pending_call = Some(call);
        }

        let frame_bytes = call.width() * usize::from(self.info.channels);
        if frame_bytes == 0 {
            return Err(Error::Decode("Source reports zero channels".to_string()));
        }
        let frames = frames.min(dst.len() / frame_bytes);
        let wanted = frames * frame_bytes;

        while self.buffered() < wanted && !self.finished {
            if !self.decode_next(call)? {
                self.finished = true;
            }
        }

        let available = self.buffered().min(wanted);
        let available = available - available % frame_bytes;
        dst[..available].copy_from_slice(&self.pending[self.cursor..self.cursor + available]);
        self.cursor += available;

        if self.cursor > self.pending.len() / 2 {
            self.pending.drain(..self.cursor);
            self.cursor = 0;
        }

        trace!("Read {} frames", available / frame_bytes);
        Ok(available / frame_bytes)
    }
}

/// Convert a decoded buffer to interleaved `call` samples appended to `out`.
fn append_samples(decoded: AudioBufferRef<'_>, call: DecodeCall, out: &mut Vec<u8>) {
    match call {
        DecodeCall::Float32 => append_interleaved::<f32, f32>(decoded, out, |s| s),
        DecodeCall::Int32 => append_interleaved::<i32, i32>(decoded, out, |s| s),
        DecodeCall::Int24 => append_interleaved::<i32, Packed24>(decoded, out, Packed24::from_i32),
        DecodeCall::Int16 => append_interleaved::<i16, i16>(decoded, out, |s| s),
        DecodeCall::Int8 => append_interleaved::<i8, i8>(decoded, out, |s| s),
        DecodeCall::UInt8 => append_interleaved::<u8, u8>(decoded, out, |s| s),
    }
}

fn append_interleaved<S, P>(decoded: AudioBufferRef<'_>, out: &mut Vec<u8>, convert: fn(S) -> P)
where
    S: Sample + ConvertibleSample,
    P: PcmSample,
{
    let spec = *decoded.spec();
    let mut samples = SampleBuffer::<S>::new(decoded.frames() as u64, spec);
    samples.copy_interleaved_ref(decoded);
    out.reserve(samples.samples().len() * P::CALL.width());
    for &sample in samples.samples() {
        convert(sample).extend_bytes(out);
    }
}

const fn map_sample_format(format: SymphoniaSampleFormat) -> SampleFormat {
    match format {
        SymphoniaSampleFormat::F32 => SampleFormat::F32,
        SymphoniaSampleFormat::S32 => SampleFormat::I32,
        SymphoniaSampleFormat::S24 => SampleFormat::I24,
        SymphoniaSampleFormat::S16 => SampleFormat::I16,
        SymphoniaSampleFormat::S8 => SampleFormat::I8,
        SymphoniaSampleFormat::U8 => SampleFormat::U8,
        _ => SampleFormat::Custom,
    }
}

fn format_for_codec(codec: CodecType) -> SampleFormat {
    let is = |codecs: &[CodecType]| codecs.contains(&codec);
    if is(&[CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_F32BE, CODEC_TYPE_VORBIS]) {
        // Vorbis decodes to float internally.
        SampleFormat::F32
    } else if is(&[CODEC_TYPE_PCM_S32LE, CODEC_TYPE_PCM_S32BE]) {
        SampleFormat::I32
    } else if is(&[CODEC_TYPE_PCM_S24LE, CODEC_TYPE_PCM_S24BE]) {
        SampleFormat::I24
    } else if is(&[CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_S16BE]) {
        SampleFormat::I16
    } else if is(&[CODEC_TYPE_PCM_S8]) {
        SampleFormat::I8
    } else if is(&[CODEC_TYPE_PCM_U8]) {
        SampleFormat::U8
    } else {
        SampleFormat::Custom
    }
}

/// Probe a file for its rate, channel count, native format, and length.
pub fn inspect(backend: &dyn SourceBackend, path: &Path) -> Result<SourceInfo> {
    let source = backend.open(path)?;
    Ok(source.info())
}
