//! PCM stream metadata passed to play and record calls

use serde::{Deserialize, Serialize};

use super::error::AudioError;

/// Default bit depth when a caller does not specify one
pub const DEFAULT_BITS_PER_SAMPLE: u16 = 16;

/// Interleaved little-endian PCM layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    /// Number of interleaved channels
    pub channels: u16,
    /// Sample rate in Hz
    pub rate: u32,
    /// Bits per sample (8, 16, 24 or 32)
    #[serde(default = "default_bits_per_sample")]
    pub bits_per_sample: u16,
}

fn default_bits_per_sample() -> u16 {
    DEFAULT_BITS_PER_SAMPLE
}

impl StreamFormat {
    /// 16-bit format with the given channel count and rate
    pub fn new(channels: u16, rate: u32) -> Self {
        Self {
            channels,
            rate,
            bits_per_sample: DEFAULT_BITS_PER_SAMPLE,
        }
    }

    pub fn with_bits(mut self, bits_per_sample: u16) -> Self {
        self.bits_per_sample = bits_per_sample;
        self
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Bytes for one sample on every channel
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Bytes per second of audio
    pub fn byte_rate(&self) -> u64 {
        self.bytes_per_frame() as u64 * self.rate as u64
    }

    pub fn validate(&self) -> Result<(), AudioError> {
        if self.channels == 0 {
            return Err(AudioError::UnsupportedConfig("zero channels".into()));
        }
        if self.rate == 0 {
            return Err(AudioError::UnsupportedConfig("zero sample rate".into()));
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(AudioError::UnsupportedConfig(format!(
                "{} bits per sample",
                self.bits_per_sample
            )));
        }
        Ok(())
    }
}
