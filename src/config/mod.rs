//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use crate::audio::{AudioCategory, CaptureFormat, PoolConfig, SessionConfig};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub use defaults::{
    default_audio_category, DEFAULT_GATE_THRESHOLD_DB, DEFAULT_MAX_BUFFER_BYTES,
    DEFAULT_MAX_SECONDS, DEFAULT_OUTPUT_FILE, DEFAULT_POOL_BUFFER_COUNT,
    DEFAULT_POOL_BUFFER_SECONDS, DEFAULT_SAMPLE_FANOUT_CAPACITY,
};

/// CLI options for the gatekeep recorder.
#[derive(Debug, Parser, Clone)]
#[command(
    about = "Record a microphone take that starts on speech and ends on the first pause",
    author,
    version
)]
pub struct AppConfig {
    /// WAV file to write (truncated at every start)
    #[arg(long, short = 'o', default_value = DEFAULT_OUTPUT_FILE)]
    pub output: PathBuf,

    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Level (dBFS) a buffer must exceed to count as speech
    #[arg(
        long = "gate-threshold-db",
        default_value_t = DEFAULT_GATE_THRESHOLD_DB,
        allow_negative_numbers = true
    )]
    pub gate_threshold_db: f64,

    /// Audio held by each capture buffer (seconds)
    #[arg(long = "buffer-seconds", default_value_t = DEFAULT_POOL_BUFFER_SECONDS)]
    pub buffer_seconds: f64,

    /// Number of capture buffers cycled through the device queue
    #[arg(long = "buffer-count", default_value_t = DEFAULT_POOL_BUFFER_COUNT)]
    pub buffer_count: usize,

    /// Upper bound on a single capture buffer (bytes)
    #[arg(long = "max-buffer-bytes", default_value_t = DEFAULT_MAX_BUFFER_BYTES)]
    pub max_buffer_bytes: usize,

    /// Stop after this long even if the gate never closes (seconds)
    #[arg(long = "max-seconds", default_value_t = DEFAULT_MAX_SECONDS)]
    pub max_seconds: u64,

    /// Decoded blocks queued for the level display before new ones are dropped
    #[arg(long = "fanout-capacity", default_value_t = DEFAULT_SAMPLE_FANOUT_CAPACITY)]
    pub fanout_capacity: usize,

    /// Audio mode requested before capture starts
    #[arg(
        long = "audio-category",
        value_enum,
        default_value_t = default_audio_category()
    )]
    pub audio_category: AudioCategoryKind,

    /// Print the session report as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "GATEKEEP_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "GATEKEEP_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Log per-buffer capture time and handling latency (implies --logs)
    #[arg(long)]
    pub log_timings: bool,
}

/// Audio modes selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AudioCategoryKind {
    PlayAndRecord,
    Record,
}

impl AudioCategoryKind {
    pub fn category(self) -> AudioCategory {
        match self {
            AudioCategoryKind::PlayAndRecord => AudioCategory::PlayAndRecord,
            AudioCategoryKind::Record => AudioCategory::Record,
        }
    }
}

impl AppConfig {
    /// Whether `log_debug` and tracing output are switched on.
    pub fn logging_enabled(&self) -> bool {
        (self.logs || self.log_timings) && !self.no_logs
    }
}

impl From<&AppConfig> for SessionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            format: CaptureFormat::speech(),
            threshold_db: config.gate_threshold_db,
            pool: PoolConfig {
                buffer_count: config.buffer_count,
                buffer_seconds: config.buffer_seconds,
                max_buffer_bytes: config.max_buffer_bytes,
            },
            fanout_capacity: config.fanout_capacity,
            category: config.audio_category.category(),
            log_timings: config.log_timings && config.logging_enabled(),
        }
    }
}
