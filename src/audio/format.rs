//! Linear PCM format shared by the capture queue and the output file.

use super::{TARGET_CHANNELS, TARGET_RATE};
use serde::Serialize;

/// Bit depth of every sample written by the pipeline.
pub const TARGET_BITS_PER_SAMPLE: u16 = 16;

/// Packed signed-integer PCM description.
///
/// `bytes_per_packet` is carried separately from the sample layout because a
/// device may report 0 for variable bit-rate formats, in which case buffer
/// sizing has to ask the device for its maximum packet size instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub bytes_per_packet: u32,
}

impl CaptureFormat {
    /// 16 kHz, mono, 16-bit signed little-endian.
    pub const fn speech() -> Self {
        Self {
            sample_rate: TARGET_RATE,
            channels: TARGET_CHANNELS as u16,
            bits_per_sample: TARGET_BITS_PER_SAMPLE,
            bytes_per_packet: (TARGET_CHANNELS * TARGET_BITS_PER_SAMPLE as u32) / 8,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// One packet holds exactly one frame for linear PCM.
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    /// True for the only layout the file sink knows how to persist.
    pub fn is_pcm16(&self) -> bool {
        self.bits_per_sample == TARGET_BITS_PER_SAMPLE && self.channels >= 1
    }

    pub fn to_wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self::speech()
    }
}
