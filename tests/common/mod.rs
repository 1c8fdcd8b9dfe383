//! Fakes shared by the integration tests
//!
//! An in-process transport, a transport that always fails, and scripted
//! playback/capture devices.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use audiorelay::audio::{AudioError, CaptureDevice, PlaybackDevice, StreamFormat};
use audiorelay::network::{listen_addr, ChunkSink, ChunkSource, NetworkError, Transport};
use audiorelay::storage::Buffer;

fn refused(addr: &str) -> NetworkError {
    NetworkError::ConnectFailed {
        addr: addr.to_string(),
        source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
    }
}

struct Listener {
    sink: Arc<dyn ChunkSink>,
    token: CancellationToken,
}

/// Transport that routes sends to receivers in the same process, by port
#[derive(Clone, Default)]
pub struct MemoryTransport {
    listeners: Arc<Mutex<HashMap<u16, Listener>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ports with a live (not cancelled) receiver
    pub fn listening(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, l)| !l.token.is_cancelled())
            .map(|(port, _)| *port)
            .collect();
        ports.sort_unstable();
        ports
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn receive(
        &self,
        port: &str,
        sink: Arc<dyn ChunkSink>,
        token: CancellationToken,
    ) -> Result<(), NetworkError> {
        let addr = listen_addr(port)?;
        let mut listeners = self.listeners.lock();
        if let Some(existing) = listeners.get(&addr.port()) {
            if !existing.token.is_cancelled() {
                return Err(NetworkError::BindFailed {
                    addr: addr.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
                });
            }
        }
        listeners.insert(addr.port(), Listener { sink, token });
        Ok(())
    }

    async fn send(
        &self,
        addr: &str,
        mut source: Box<dyn ChunkSource>,
        token: CancellationToken,
    ) -> Result<(), NetworkError> {
        let port: u16 = addr
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| NetworkError::InvalidAddress(addr.to_string()))?;

        let (sink, receiver_token) = {
            let listeners = self.listeners.lock();
            match listeners.get(&port) {
                Some(l) if !l.token.is_cancelled() => (l.sink.clone(), l.token.clone()),
                _ => return Err(refused(addr)),
            }
        };

        tokio::spawn(async move {
            loop {
                let chunk = tokio::select! {
                    _ = token.cancelled() => break,
                    _ = receiver_token.cancelled() => break,
                    chunk = source.next_chunk() => chunk,
                };
                match chunk {
                    Some(chunk) => {
                        if sink.write_chunk(&chunk).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        });
        Ok(())
    }
}

/// Transport whose every call fails
#[derive(Clone, Default)]
pub struct FailingTransport;

#[async_trait]
impl Transport for FailingTransport {
    async fn receive(
        &self,
        port: &str,
        _sink: Arc<dyn ChunkSink>,
        _token: CancellationToken,
    ) -> Result<(), NetworkError> {
        Err(NetworkError::BindFailed {
            addr: port.to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        })
    }

    async fn send(
        &self,
        addr: &str,
        _source: Box<dyn ChunkSource>,
        _token: CancellationToken,
    ) -> Result<(), NetworkError> {
        Err(refused(addr))
    }
}

/// Playback device that drains buffers into memory
#[derive(Clone, Default)]
pub struct FakePlaybackDevice {
    played: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    missing: Arc<Mutex<HashSet<String>>>,
}

impl FakePlaybackDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `device` fail to open
    pub fn remove_device(&self, device: &str) {
        self.missing.lock().insert(device.to_string());
    }

    /// Everything played on `device` so far
    pub fn played(&self, device: &str) -> Vec<u8> {
        self.played.lock().get(device).cloned().unwrap_or_default()
    }

    /// Wait until `device` has played at least `len` bytes
    pub async fn wait_for(&self, device: &str, len: usize) -> Vec<u8> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let played = self.played(device);
            if played.len() >= len || tokio::time::Instant::now() > deadline {
                return played;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl PlaybackDevice for FakePlaybackDevice {
    async fn play(
        &self,
        device: &str,
        _format: StreamFormat,
        source: Arc<Buffer>,
        token: CancellationToken,
    ) -> Result<(), AudioError> {
        if self.missing.lock().contains(device) {
            return Err(AudioError::DeviceNotFound(device.to_string()));
        }

        let played = self.played.clone();
        let device = device.to_string();
        tokio::spawn(async move {
            loop {
                let chunk = tokio::select! {
                    _ = token.cancelled() => break,
                    chunk = source.next() => chunk,
                };
                let Some(chunk) = chunk else { break };
                played
                    .lock()
                    .entry(device.clone())
                    .or_default()
                    .extend_from_slice(&chunk);
            }
        });
        Ok(())
    }
}

/// Capture device that emits a fixed chunk every few milliseconds
#[derive(Clone)]
pub struct FakeCaptureDevice {
    chunk: Vec<u8>,
    missing: Arc<Mutex<HashSet<String>>>,
}

impl FakeCaptureDevice {
    pub fn new(chunk: Vec<u8>) -> Self {
        Self {
            chunk,
            missing: Arc::default(),
        }
    }

    pub fn remove_device(&self, device: &str) {
        self.missing.lock().insert(device.to_string());
    }
}

impl Default for FakeCaptureDevice {
    fn default() -> Self {
        // 4 frames of 16-bit stereo
        Self::new(vec![1, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6, 0, 7, 0, 8, 0])
    }
}

#[async_trait]
impl CaptureDevice for FakeCaptureDevice {
    async fn capture(
        &self,
        device: &str,
        _format: StreamFormat,
        token: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, AudioError> {
        if self.missing.lock().contains(device) {
            return Err(AudioError::DeviceNotFound(device.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let chunk = self.chunk.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(2));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(chunk.clone()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(rx)
    }
}

/// Write a 16-bit WAV file with `frames` frames of a ramp
pub fn write_test_wav(channels: u16, rate: u32, frames: usize) -> PathBuf {
    let path = temp_path("input.wav");
    let spec = hound::WavSpec {
        channels,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("Failed to create test WAV");
    for i in 0..frames * channels as usize {
        writer
            .write_sample((i % 1000) as i16 - 500)
            .expect("Failed to write sample");
    }
    writer.finalize().expect("Failed to finalize test WAV");
    path
}

/// Unique path in the temp directory
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("audiorelay-{}-{}", uuid::Uuid::new_v4(), name))
}

/// A port that was free a moment ago
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("Failed to find a free port")
}
