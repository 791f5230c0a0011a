use super::AudioCategoryKind;
use crate::audio::{
    DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SECONDS, DEFAULT_FANOUT_CAPACITY,
    DEFAULT_SILENCE_THRESHOLD_DB, MAX_BUFFER_BYTES,
};

pub const DEFAULT_OUTPUT_FILE: &str = "gatekeep.wav";
pub const DEFAULT_GATE_THRESHOLD_DB: f64 = DEFAULT_SILENCE_THRESHOLD_DB;
pub const DEFAULT_POOL_BUFFER_SECONDS: f64 = DEFAULT_BUFFER_SECONDS;
pub const DEFAULT_POOL_BUFFER_COUNT: usize = DEFAULT_BUFFER_COUNT;
pub const DEFAULT_MAX_BUFFER_BYTES: usize = MAX_BUFFER_BYTES;
pub const DEFAULT_MAX_SECONDS: u64 = 30;
pub const DEFAULT_SAMPLE_FANOUT_CAPACITY: usize = DEFAULT_FANOUT_CAPACITY;

pub(super) const MIN_GATE_THRESHOLD_DB: f64 = -120.0;
pub(super) const MIN_BUFFER_SECONDS: f64 = 0.02;
pub(super) const MAX_BUFFER_SECONDS: f64 = 5.0;
pub(super) const MIN_BUFFER_COUNT: usize = 2;
pub(super) const MAX_BUFFER_COUNT: usize = 32;
// Smallest buffer that still holds one 20 ms frame of 16 kHz PCM16.
pub(super) const MIN_MAX_BUFFER_BYTES: usize = 640;
pub(super) const MAX_RECORD_SECONDS: u64 = 3_600;
pub(super) const MAX_FANOUT_CAPACITY: usize = 1_024;
pub(super) const MAX_DEVICE_NAME_LEN: usize = 256;

pub const fn default_audio_category() -> AudioCategoryKind {
    AudioCategoryKind::PlayAndRecord
}
