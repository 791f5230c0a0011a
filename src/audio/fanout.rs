//! Decoded-sample forwarding for live visualization.
//!
//! Runs beside the gate: every decoded block goes to the consumer whether or not
//! the gate kept the matching buffer. The producer side never blocks; a full
//! queue drops the block and counts it.

use super::error::CaptureError;
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Consumer of decoded blocks: the samples and their count.
pub type SampleCallback = Arc<dyn Fn(&[f32], u32) + Send + Sync>;

/// Producer handle; cheap to clone into capture callbacks.
#[derive(Clone)]
pub struct SampleFanout {
    sender: Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
}

/// Owns the forwarding thread.
pub struct FanoutWorker {
    handle: Option<JoinHandle<usize>>,
    dropped: Arc<AtomicUsize>,
}

impl SampleFanout {
    /// Spawn a forwarding thread that calls `consumer` for every block.
    pub fn spawn(
        capacity: usize,
        consumer: SampleCallback,
    ) -> Result<(SampleFanout, FanoutWorker), CaptureError> {
        let (sender, receiver) = bounded::<Vec<f32>>(capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let handle = thread::Builder::new()
            .name("gatekeep-fanout".to_string())
            .spawn(move || {
                let mut forwarded = 0usize;
                for block in receiver.iter() {
                    consumer(&block, block.len() as u32);
                    forwarded += 1;
                }
                forwarded
            })
            .map_err(|err| CaptureError::device(format!("failed to spawn fan-out thread: {err}")))?;
        Ok((
            SampleFanout {
                sender,
                dropped: dropped.clone(),
            },
            FanoutWorker {
                handle: Some(handle),
                dropped,
            },
        ))
    }

    /// Queue a copy of `block` for the consumer. Returns false if it was dropped.
    pub fn forward(&self, block: &[f32]) -> bool {
        if block.is_empty() {
            return true;
        }
        match self.sender.try_send(block.to_vec()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FanoutWorker {
    /// Wait for the consumer to drain. Every `SampleFanout` clone must be gone
    /// first or this blocks. Returns the number of dropped blocks.
    pub fn join(mut self) -> usize {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                crate::log_debug("fan-out consumer panicked");
            }
        }
        self.dropped.load(Ordering::Relaxed)
    }
}
