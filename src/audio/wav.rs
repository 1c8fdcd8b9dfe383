//! WAV container handling
//!
//! Decoding yields the stream format and the interleaved PCM payload as
//! little-endian bytes. Recording writes incoming PCM bytes into a WAV file
//! whose header is finalized when the recording is finished.

use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::error::AudioError;
use super::format::StreamFormat;
use crate::network::ChunkSink;

/// A decoded WAV file
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub format: StreamFormat,
    /// Interleaved little-endian PCM
    pub pcm: Vec<u8>,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        let byte_rate = self.format.byte_rate();
        if byte_rate == 0 {
            return 0.0;
        }
        self.pcm.len() as f64 / byte_rate as f64
    }
}

/// Any failure while parsing in-memory bytes is a malformed container
fn malformed(err: hound::Error) -> AudioError {
    AudioError::Decode(err.to_string())
}

/// Decode an in-memory WAV file
pub fn decode_wav(data: &[u8]) -> Result<DecodedAudio, AudioError> {
    let mut reader = WavReader::new(Cursor::new(data)).map_err(malformed)?;
    let spec = reader.spec();

    if spec.sample_format != SampleFormat::Int {
        return Err(AudioError::Decode("floating-point WAV is not supported".into()));
    }

    let format = StreamFormat::new(spec.channels, spec.sample_rate).with_bits(spec.bits_per_sample);
    format
        .validate()
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let width = format.bytes_per_sample();
    let mut pcm = Vec::with_capacity(reader.len() as usize * width);
    for sample in reader.samples::<i32>() {
        let bytes = sample.map_err(malformed)?.to_le_bytes();
        pcm.extend_from_slice(&bytes[..width]);
    }

    debug!(
        "Decoded WAV: {} ch, {} Hz, {} bit, {} bytes",
        format.channels,
        format.rate,
        format.bits_per_sample,
        pcm.len()
    );
    Ok(DecodedAudio { format, pcm })
}

/// Read and decode a WAV file from disk.
///
/// Filesystem failures come back as [`AudioError::Io`]; anything wrong with
/// the bytes themselves is [`AudioError::Decode`].
pub fn read_wav_file<P: AsRef<Path>>(path: P) -> Result<DecodedAudio, AudioError> {
    let data = std::fs::read(path.as_ref())?;
    decode_wav(&data)
}

/// Append `.wav` unless the name already ends with it
pub fn wav_path<P: AsRef<Path>>(name: P) -> PathBuf {
    let path = name.as_ref();
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("wav") => path.to_path_buf(),
        _ => {
            let mut os = path.as_os_str().to_os_string();
            os.push(".wav");
            PathBuf::from(os)
        }
    }
}

/// Information about a finished recording
#[derive(Debug, Clone)]
pub struct RecordingInfo {
    pub path: PathBuf,
    pub bytes: u64,
    pub duration_secs: f64,
}

struct SinkState {
    writer: Option<WavWriter<BufWriter<File>>>,
    /// Trailing bytes of a sample split across chunks
    pending: Vec<u8>,
}

/// WAV file that accepts raw PCM chunks
pub struct WavFileSink {
    path: PathBuf,
    format: StreamFormat,
    state: Mutex<SinkState>,
    bytes_written: AtomicU64,
}

impl WavFileSink {
    /// Create the file (adding `.wav` if missing) and write a provisional header
    pub fn create<P: AsRef<Path>>(name: P, format: StreamFormat) -> Result<Self, AudioError> {
        format.validate()?;
        let path = wav_path(name);
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.rate,
            bits_per_sample: format.bits_per_sample,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(&path, spec)
            .map_err(|e| AudioError::RecordingError(format!("Failed to create {}: {}", path.display(), e)))?;

        info!("Recording to {}", path.display());
        Ok(Self {
            path,
            format,
            state: Mutex::new(SinkState {
                writer: Some(writer),
                pending: Vec::new(),
            }),
            bytes_written: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().writer.is_none()
    }

    /// Write whole samples from `chunk`, keeping a split trailing sample for later
    pub fn write_pcm(&self, chunk: &[u8]) -> Result<(), AudioError> {
        let width = self.format.bytes_per_sample();
        let mut state = self.state.lock();
        let SinkState { writer, pending } = &mut *state;
        let writer = writer
            .as_mut()
            .ok_or_else(|| AudioError::RecordingError("recording already finished".into()))?;

        pending.extend_from_slice(chunk);
        let whole = pending.len() - pending.len() % width;
        for sample in pending[..whole].chunks_exact(width) {
            match width {
                1 => writer.write_sample(sample[0] as i8)?,
                2 => writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?,
                3 => {
                    // Sign-extend 24-bit little-endian
                    let value = i32::from_le_bytes([0, sample[0], sample[1], sample[2]]) >> 8;
                    writer.write_sample(value)?
                }
                _ => writer.write_sample(i32::from_le_bytes([
                    sample[0], sample[1], sample[2], sample[3],
                ]))?,
            }
        }
        pending.drain(..whole);

        self.bytes_written.fetch_add(whole as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Finalize the header. Later writes fail; a second call is an error.
    pub fn finish(&self) -> Result<RecordingInfo, AudioError> {
        let writer = self
            .state
            .lock()
            .writer
            .take()
            .ok_or_else(|| AudioError::RecordingError("Not recording".into()))?;
        writer.finalize()?;

        let bytes = self.bytes_written.load(Ordering::Relaxed);
        let byte_rate = self.format.byte_rate().max(1);
        let info = RecordingInfo {
            path: self.path.clone(),
            bytes,
            duration_secs: bytes as f64 / byte_rate as f64,
        };
        info!(
            "Recording finished: {} ({:.2}s)",
            info.path.display(),
            info.duration_secs
        );
        Ok(info)
    }
}

impl ChunkSink for WavFileSink {
    fn write_chunk(&self, chunk: &[u8]) -> std::io::Result<()> {
        self.write_pcm(chunk).map_err(|e| match e {
            AudioError::Io(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        })
    }
}
