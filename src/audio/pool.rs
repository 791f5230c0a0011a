//! Fixed set of reusable capture buffers cycled between the device and the
//! session callback.

use super::device::CaptureDevice;
use super::error::CaptureError;
use super::format::CaptureFormat;

/// Number of buffers kept in flight with the device.
pub const DEFAULT_BUFFER_COUNT: usize = 5;

/// Audio held by one buffer.
pub const DEFAULT_BUFFER_SECONDS: f64 = 0.5;

/// Absolute cap on a single buffer, regardless of format.
pub const MAX_BUFFER_BYTES: usize = 0x50000;

/// One hardware-delivered chunk of raw PCM bytes.
///
/// The backing storage is allocated once and never grows; `fill` copies at most
/// the remaining capacity. Ownership moves device → callback → device, so a
/// buffer can only be re-enqueued by handing the value back.
#[derive(Debug)]
pub struct CaptureBuffer {
    slot: usize,
    data: Box<[u8]>,
    valid: usize,
    level_db: Option<f32>,
}

impl CaptureBuffer {
    pub fn new(slot: usize, capacity: usize) -> Self {
        Self {
            slot,
            data: vec![0u8; capacity].into_boxed_slice(),
            valid: 0,
            level_db: None,
        }
    }

    /// Pool slot index this buffer was allocated for.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn valid_bytes(&self) -> usize {
        self.valid
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.valid
    }

    pub fn is_full(&self) -> bool {
        self.valid == self.data.len()
    }

    /// Valid PCM bytes of this delivery.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.valid]
    }

    /// Append as many bytes as fit; returns how many were copied.
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let count = bytes.len().min(self.remaining());
        self.data[self.valid..self.valid + count].copy_from_slice(&bytes[..count]);
        self.valid += count;
        count
    }

    /// Level the device metered while filling this buffer.
    pub fn level_db(&self) -> Option<f32> {
        self.level_db
    }

    pub fn set_level_db(&mut self, level: Option<f32>) {
        self.level_db = level;
    }

    /// Forget the previous delivery; capacity is kept.
    pub fn clear(&mut self) {
        self.valid = 0;
        self.level_db = None;
    }
}

/// Pool sizing knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    pub buffer_count: usize,
    pub buffer_seconds: f64,
    pub max_buffer_bytes: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_BUFFER_COUNT,
            buffer_seconds: DEFAULT_BUFFER_SECONDS,
            max_buffer_bytes: MAX_BUFFER_BYTES,
        }
    }
}

/// Bytes needed for `seconds` of audio, capped at `max_buffer_bytes`.
///
/// A zero `bytes_per_packet` means the format is variable bit-rate, so the
/// device's maximum packet size stands in. The result is rounded down to a whole
/// frame so a buffer never splits a sample.
pub fn derive_buffer_size<F>(
    format: &CaptureFormat,
    seconds: f64,
    max_buffer_bytes: usize,
    max_packet_size: F,
) -> Result<usize, CaptureError>
where
    F: FnOnce() -> Result<u32, CaptureError>,
{
    let packet_bytes = match format.bytes_per_packet {
        0 => max_packet_size()?,
        bytes => bytes,
    };
    let for_time = (f64::from(format.sample_rate) * f64::from(packet_bytes) * seconds).round();
    let for_time = if for_time.is_finite() && for_time > 0.0 {
        for_time as usize
    } else {
        0
    };
    let mut size = for_time.min(max_buffer_bytes);
    let frame = format.bytes_per_frame().max(1);
    size -= size % frame;
    if size == 0 {
        return Err(CaptureError::device(format!(
            "capture buffer size resolved to zero ({packet_bytes} bytes/packet, {seconds}s)"
        )));
    }
    Ok(size)
}

/// Allocation plan for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPool {
    slots: usize,
    buffer_bytes: usize,
}

impl BufferPool {
    pub fn plan<D>(
        config: &PoolConfig,
        format: &CaptureFormat,
        device: &D,
    ) -> Result<Self, CaptureError>
    where
        D: CaptureDevice + ?Sized,
    {
        if config.buffer_count == 0 {
            return Err(CaptureError::device("buffer pool needs at least one slot"));
        }
        let buffer_bytes = derive_buffer_size(
            format,
            config.buffer_seconds,
            config.max_buffer_bytes,
            || device.max_packet_size(),
        )?;
        Ok(Self {
            slots: config.buffer_count,
            buffer_bytes,
        })
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }

    /// Allocate every slot and hand it to the device queue.
    pub fn prime<D>(&self, device: &mut D) -> Result<(), CaptureError>
    where
        D: CaptureDevice + ?Sized,
    {
        for slot in 0..self.slots {
            let buffer = device.allocate_buffer(slot, self.buffer_bytes)?;
            device.enqueue_buffer(buffer)?;
        }
        Ok(())
    }
}
