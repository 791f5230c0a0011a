use super::device::BufferQueue;
use super::fanout::SampleFanout;
use super::meter::pcm16_rms_db;
use super::pool::CaptureBuffer;
use super::resample::FrameConverter;
use crossbeam_channel::Sender;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};

/// Filled buffer plus its capture time relative to stream start.
pub(super) type Delivery = (CaptureBuffer, Duration);

/// Downmix multi-channel input to mono while applying the provided converter so
/// the gate always sees a single channel regardless of the microphone layout.
pub(super) fn append_downmixed_samples<T, F>(
    buf: &mut Vec<f32>,
    data: &[T],
    channels: usize,
    mut convert: F,
) where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }

    // Average each interleaved frame to produce a mono representation.
    let mut acc = 0.0f32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += convert(sample);
        count += 1;
        if count == channels {
            buf.push(acc / channels as f32);
            acc = 0.0;
            count = 0;
        }
    }
    if count > 0 {
        buf.push(acc / count as f32);
    }
}

/// Clamp to [-1, 1] and pack as little-endian signed 16-bit.
pub(super) fn encode_pcm16(samples: &[f32], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(samples.len() * 2);
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Producer half of the device queue, driven from the hardware callback.
///
/// Converts raw device samples into 16 kHz mono frames, forwards each frame to
/// the decoded-sample fan-out, then packs it into the current pool buffer. A
/// full buffer is metered and handed to the delivery thread. When the pool has
/// no free buffer the frame is counted as dropped; this never allocates a new
/// buffer.
pub(super) struct BufferFiller {
    frame_samples: usize,
    converter: FrameConverter,
    pending: Vec<f32>,
    scratch: Vec<f32>,
    frame: Vec<f32>,
    pcm: Vec<u8>,
    current: Option<CaptureBuffer>,
    queue: BufferQueue,
    filled: Sender<Delivery>,
    fanout: Arc<Mutex<Option<SampleFanout>>>,
    started: Instant,
    dropped: Arc<AtomicUsize>,
}

impl BufferFiller {
    pub(super) fn new(
        frame_samples: usize,
        converter: FrameConverter,
        queue: BufferQueue,
        filled: Sender<Delivery>,
        fanout: Arc<Mutex<Option<SampleFanout>>>,
        dropped: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            frame_samples: frame_samples.max(1),
            pending: Vec::with_capacity(frame_samples),
            scratch: Vec::new(),
            frame: Vec::with_capacity(frame_samples),
            pcm: Vec::with_capacity(converter.target_len() * 2),
            converter,
            current: None,
            queue,
            filled,
            fanout,
            started: Instant::now(),
            dropped,
        }
    }

    pub(super) fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        self.scratch.clear();
        append_downmixed_samples(&mut self.scratch, data, channels, convert);
        self.pending.extend_from_slice(&self.scratch);

        while self.pending.len() >= self.frame_samples {
            // The frame vector comes back from the converter and is refilled
            // next time, so target-rate input never allocates here.
            let mut frame = std::mem::take(&mut self.frame);
            frame.clear();
            frame.extend(self.pending.drain(..self.frame_samples));
            let decoded = self.converter.convert(frame);
            self.forward(&decoded);
            self.store(&decoded);
            self.frame = decoded;
        }
    }

    #[cfg(test)]
    pub(super) fn frame_storage(&self) -> *const f32 {
        self.frame.as_ptr()
    }

    fn forward(&self, decoded: &[f32]) {
        // Never wait on the fan-out slot from the hardware thread.
        if let Ok(slot) = self.fanout.try_lock() {
            if let Some(fanout) = slot.as_ref() {
                fanout.forward(decoded);
            }
        }
    }

    fn store(&mut self, decoded: &[f32]) {
        encode_pcm16(decoded, &mut self.pcm);
        let mut offset = 0usize;
        while offset < self.pcm.len() {
            if self.current.is_none() {
                self.current = self.queue.take_free();
            }
            let Some(buffer) = self.current.as_mut() else {
                let lost_samples = (self.pcm.len() - offset) / 2;
                self.dropped.fetch_add(lost_samples, Ordering::Relaxed);
                return;
            };
            offset += buffer.fill(&self.pcm[offset..]);
            if buffer.is_full() {
                self.deliver();
            }
        }
    }

    fn deliver(&mut self) {
        if let Some(mut buffer) = self.current.take() {
            buffer.set_level_db(Some(pcm16_rms_db(buffer.bytes())));
            // A closed channel means the session is stopping; the buffer is released.
            let _ = self.filled.send((buffer, self.started.elapsed()));
        }
    }
}
