//! Capability boundary between the capture session and the platform audio
//! stack.
//!
//! A device owns a queue of free buffers. It fills them from hardware and hands
//! each filled buffer, by value, to the callback registered at `open`. The
//! callback returns the buffer through the `QueueHandle` it is given.

use super::error::CaptureError;
use super::fanout::SampleFanout;
use super::format::CaptureFormat;
use super::pool::CaptureBuffer;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Process-wide audio mode requested before capture starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCategory {
    PlayAndRecord,
    Record,
}

impl AudioCategory {
    pub fn label(self) -> &'static str {
        match self {
            AudioCategory::PlayAndRecord => "play_and_record",
            AudioCategory::Record => "record",
        }
    }
}

/// What a delivery callback may do with the queue it was invoked from.
pub trait QueueHandle {
    /// Give a consumed buffer back to the device for refilling.
    fn enqueue_buffer(&self, buffer: CaptureBuffer) -> Result<(), CaptureError>;

    /// Average power the device metered for `buffer`, if metering works.
    fn average_power_db(&self, buffer: &CaptureBuffer) -> Option<f64>;
}

/// Invoked on the device's delivery thread once per filled buffer, with the
/// capture timestamp relative to stream start.
pub type BufferCallback = Box<dyn FnMut(&dyn QueueHandle, CaptureBuffer, Duration) + Send>;

pub trait CaptureDevice {
    fn name(&self) -> String;

    /// Request the audio category; failure is a permission problem.
    fn activate_category(&mut self, category: AudioCategory) -> Result<(), CaptureError>;

    /// Create the input queue, bind `callback`, and return the format the
    /// device actually negotiated.
    fn open(
        &mut self,
        format: CaptureFormat,
        callback: BufferCallback,
    ) -> Result<CaptureFormat, CaptureError>;

    /// Largest packet the open queue can produce; used for variable bit-rate formats.
    fn max_packet_size(&self) -> Result<u32, CaptureError>;

    fn allocate_buffer(&mut self, slot: usize, capacity: usize)
        -> Result<CaptureBuffer, CaptureError>;

    fn enqueue_buffer(&self, buffer: CaptureBuffer) -> Result<(), CaptureError>;

    fn enable_metering(&mut self) -> Result<(), CaptureError>;

    fn start(&mut self) -> Result<(), CaptureError>;

    /// Stop hardware capture. Returns only after in-flight callbacks finished.
    /// Must be harmless when nothing is running.
    fn stop(&mut self);

    /// Release the queue and every buffer it holds. Must be harmless when
    /// nothing is open.
    fn dispose(&mut self);

    /// Begin forwarding decoded f32 blocks to `fanout`.
    fn start_fetching(&mut self, fanout: SampleFanout);

    fn stop_fetching(&mut self);

    /// Device frames discarded because no free buffer was available.
    fn dropped_frames(&self) -> usize {
        0
    }
}

/// Free-buffer queue shared between a device's producer and its delivery
/// callback.
#[derive(Clone)]
pub struct BufferQueue {
    free_tx: Sender<CaptureBuffer>,
    free_rx: Receiver<CaptureBuffer>,
    metering: Arc<AtomicBool>,
    disposed: Arc<AtomicBool>,
}

impl BufferQueue {
    pub fn new() -> Self {
        let (free_tx, free_rx) = unbounded();
        Self {
            free_tx,
            free_rx,
            metering: Arc::new(AtomicBool::new(false)),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Next free buffer, without waiting.
    pub fn take_free(&self) -> Option<CaptureBuffer> {
        self.free_rx.try_recv().ok()
    }

    pub fn free_len(&self) -> usize {
        self.free_rx.len()
    }

    pub fn set_metering(&self, enabled: bool) {
        self.metering.store(enabled, Ordering::Relaxed);
    }

    pub fn metering_enabled(&self) -> bool {
        self.metering.load(Ordering::Relaxed)
    }

    /// Drop every queued buffer and refuse further enqueues.
    pub fn dispose(&self) -> usize {
        self.disposed.store(true, Ordering::Release);
        self.free_rx.try_iter().count()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Default for BufferQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueHandle for BufferQueue {
    fn enqueue_buffer(&self, mut buffer: CaptureBuffer) -> Result<(), CaptureError> {
        if self.is_disposed() {
            return Err(CaptureError::device(format!(
                "queue disposed; buffer {} released",
                buffer.slot()
            )));
        }
        buffer.clear();
        self.free_tx
            .send(buffer)
            .map_err(|_| CaptureError::device("buffer queue disconnected"))
    }

    fn average_power_db(&self, buffer: &CaptureBuffer) -> Option<f64> {
        if !self.metering_enabled() {
            return None;
        }
        buffer.level_db().map(f64::from)
    }
}
