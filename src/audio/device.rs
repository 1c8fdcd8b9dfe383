//! Audio device enumeration and lookup

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use super::error::AudioError;

/// Device name that selects the host's default device
pub const DEFAULT_DEVICE: &str = "default";

/// Information about an audio device
#[derive(Debug, Clone, Serialize)]
pub struct AudioDevice {
    /// Display name, also used to select the device
    pub name: String,
    /// Supported sample rates (Hz)
    pub supported_sample_rates: Vec<u32>,
    /// Supported channel counts
    pub supported_channels: Vec<u16>,
    /// Whether this is the default device
    pub is_default: bool,
}

/// List available input (capture) devices
pub fn list_input_devices() -> Vec<AudioDevice> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    host.input_devices()
        .map(|devices| describe(devices, default_name.as_deref()))
        .unwrap_or_default()
}

/// List available output (playback) devices
pub fn list_output_devices() -> Vec<AudioDevice> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    host.output_devices()
        .map(|devices| describe(devices, default_name.as_deref()))
        .unwrap_or_default()
}

fn describe(devices: impl Iterator<Item = cpal::Device>, default_name: Option<&str>) -> Vec<AudioDevice> {
    devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            let (supported_sample_rates, supported_channels) = get_device_capabilities(&device);
            Some(AudioDevice {
                is_default: default_name == Some(name.as_str()),
                name,
                supported_sample_rates,
                supported_channels,
            })
        })
        .collect()
}

/// Find an output device by name, or the default one for `"default"`
pub fn find_output_device(name: &str) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    if name == DEFAULT_DEVICE {
        return host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".into()));
    }
    host.output_devices()
        .map_err(|e| AudioError::DeviceOpenFailed(e.to_string()))?
        .find(|d| d.name().ok().as_deref() == Some(name))
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

/// Find an input device by name, or the default one for `"default"`
pub fn find_input_device(name: &str) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    if name == DEFAULT_DEVICE {
        return host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default input device".into()));
    }
    host.input_devices()
        .map_err(|e| AudioError::DeviceOpenFailed(e.to_string()))?
        .find(|d| d.name().ok().as_deref() == Some(name))
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

/// Get supported sample rates and channel counts for a device
fn get_device_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    let configs = device
        .supported_input_configs()
        .into_iter()
        .flatten()
        .chain(device.supported_output_configs().into_iter().flatten());

    for config in configs {
        for rate in [8000u32, 16000, 22050, 44100, 48000, 96000] {
            if (config.min_sample_rate().0..=config.max_sample_rate().0).contains(&rate)
                && !sample_rates.contains(&rate)
            {
                sample_rates.push(rate);
            }
        }
        let ch = config.channels();
        if !channels.contains(&ch) {
            channels.push(ch);
        }
    }

    sample_rates.sort_unstable();
    channels.sort_unstable();
    (sample_rates, channels)
}
