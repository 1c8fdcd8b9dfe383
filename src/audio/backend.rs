//! Device sessions: playback from a buffer, capture into a channel
//!
//! A cpal stream is not `Send`, so each session owns a dedicated thread that
//! opens the stream, reports the outcome, then parks until cancelled. Dropping
//! the stream on that thread releases the device.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::device::{find_input_device, find_output_device};
use super::error::AudioError;
use super::format::StreamFormat;
use crate::storage::Buffer;

/// Output side of the audio hardware
#[async_trait]
pub trait PlaybackDevice: Send + Sync {
    /// Open `device` and keep playing chunks from `source` until `token` is
    /// cancelled. Returns once the device is open; silence is emitted while
    /// the source is empty.
    async fn play(
        &self,
        device: &str,
        format: StreamFormat,
        source: Arc<Buffer>,
        token: CancellationToken,
    ) -> Result<(), AudioError>;
}

/// Input side of the audio hardware
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Open `device` and deliver captured PCM as little-endian chunks until
    /// `token` is cancelled, after which the channel closes.
    async fn capture(
        &self,
        device: &str,
        format: StreamFormat,
        token: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, AudioError>;
}

/// Hardware backend on the host's default cpal host; 16-bit streams only
#[derive(Debug, Clone, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

fn stream_config(format: StreamFormat) -> Result<StreamConfig, AudioError> {
    format.validate()?;
    if format.bits_per_sample != 16 {
        return Err(AudioError::UnsupportedConfig(format!(
            "{}-bit device streams",
            format.bits_per_sample
        )));
    }
    Ok(StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.rate),
        buffer_size: cpal::BufferSize::Default,
    })
}

/// Run `open` on a dedicated thread and hold the stream there until cancelled
async fn run_session<F>(label: String, token: CancellationToken, open: F) -> Result<(), AudioError>
where
    F: FnOnce() -> Result<Stream, AudioError> + Send + 'static,
{
    let handle = tokio::runtime::Handle::current();
    let (ready_tx, ready_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name(label.clone())
        .spawn(move || {
            let stream = match open().and_then(|stream| {
                stream
                    .play()
                    .map_err(|e| AudioError::StreamError(e.to_string()))?;
                Ok(stream)
            }) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            handle.block_on(token.cancelled());
            drop(stream);
            debug!("{} closed", label);
        })?;

    ready_rx
        .await
        .map_err(|_| AudioError::StreamError("device thread exited".into()))?
}

/// Feeds the output callback from a buffer, carrying partial chunks over
struct BufferReader {
    source: Arc<Buffer>,
    pending: VecDeque<u8>,
}

impl BufferReader {
    fn fill(&mut self, data: &mut [i16]) {
        for sample in data.iter_mut() {
            while self.pending.len() < 2 {
                match self.source.read() {
                    Some(chunk) => self.pending.extend(chunk),
                    None => break,
                }
            }
            *sample = match (self.pending.pop_front(), self.pending.pop_front()) {
                (Some(lo), Some(hi)) => i16::from_le_bytes([lo, hi]),
                (Some(lo), None) => {
                    self.pending.push_front(lo);
                    0
                }
                _ => 0,
            };
        }
    }
}

#[async_trait]
impl PlaybackDevice for CpalBackend {
    async fn play(
        &self,
        device: &str,
        format: StreamFormat,
        source: Arc<Buffer>,
        token: CancellationToken,
    ) -> Result<(), AudioError> {
        let config = stream_config(format)?;
        let name = device.to_string();

        run_session(format!("playback-{}", name), token, move || {
            let device = find_output_device(&name)?;
            info!("Starting playback on device: {}", name);

            let mut reader = BufferReader {
                source,
                pending: VecDeque::new(),
            };
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| reader.fill(data),
                    |err| error!("Playback stream error: {:?}", err),
                    None,
                )
                .map_err(|e| AudioError::DeviceOpenFailed(e.to_string()))
        })
        .await
    }
}

#[async_trait]
impl CaptureDevice for CpalBackend {
    async fn capture(
        &self,
        device: &str,
        format: StreamFormat,
        token: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, AudioError> {
        let config = stream_config(format)?;
        let name = device.to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        run_session(format!("capture-{}", name), token, move || {
            let device = find_input_device(&name)?;
            info!("Starting capture on device: {}", name);

            device
                .build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let bytes = data.iter().flat_map(|s| s.to_le_bytes()).collect();
                        let _ = tx.send(bytes);
                    },
                    |err| error!("Capture stream error: {:?}", err),
                    None,
                )
                .map_err(|e| AudioError::DeviceOpenFailed(e.to_string()))
        })
        .await?;

        Ok(rx)
    }
}
