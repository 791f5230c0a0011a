//! Level-gated audio capture pipeline.
//!
//! A capture device fills a small pool of fixed-size buffers and hands each one
//! back to the session. The session meters it, lets the silence gate decide
//! whether it belongs to the take, appends accepted audio to a WAV file, and
//! returns the buffer to the device. Decoded samples are forwarded to a
//! visualization consumer regardless of the gate.

/// Sample rate of every take.
pub const TARGET_RATE: u32 = 16_000;

/// Channel count of every take.
pub const TARGET_CHANNELS: u32 = 1;

mod cpal_device;
mod device;
mod dispatch;
mod error;
mod fanout;
mod format;
mod gate;
mod meter;
mod pool;
mod resample;
mod session;
mod sink;
#[cfg(test)]
mod tests;

pub use cpal_device::CpalDevice;
pub use device::{AudioCategory, BufferCallback, BufferQueue, CaptureDevice, QueueHandle};
pub use error::CaptureError;
pub use fanout::{FanoutWorker, SampleCallback, SampleFanout};
pub use format::{CaptureFormat, TARGET_BITS_PER_SAMPLE};
pub use gate::{transition, Gate, GateDecision, GateState, DEFAULT_SILENCE_THRESHOLD_DB};
pub use meter::{measure, rms_db, LiveMeter, PowerDb};
pub use pool::{
    derive_buffer_size, BufferPool, CaptureBuffer, PoolConfig, DEFAULT_BUFFER_COUNT,
    DEFAULT_BUFFER_SECONDS, MAX_BUFFER_BYTES,
};
pub use session::{
    CaptureSession, EndedCallback, SessionConfig, SessionObservers, SessionReport,
    DEFAULT_FANOUT_CAPACITY,
};
pub use sink::{FileSink, WavFileSink};
