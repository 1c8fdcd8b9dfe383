//! Audio module
//!
//! Device enumeration, playback and capture sessions, PCM formats, and WAV
//! decoding and recording.

mod backend;
mod device;
mod error;
mod format;
mod wav;

pub use backend::{CaptureDevice, CpalBackend, PlaybackDevice};
pub use device::{
    find_input_device, find_output_device, list_input_devices, list_output_devices, AudioDevice,
    DEFAULT_DEVICE,
};
pub use error::AudioError;
pub use format::{StreamFormat, DEFAULT_BITS_PER_SAMPLE};
pub use wav::{decode_wav, read_wav_file, wav_path, DecodedAudio, RecordingInfo, WavFileSink};
