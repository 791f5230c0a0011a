use super::device::QueueHandle;
use super::pool::CaptureBuffer;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Average signal power in decibels; 0 is full scale, more negative is quieter.
pub type PowerDb = f64;

const DEFAULT_METER_DB: f32 = -60.0;

/// Read the average power the device metered for `buffer`.
///
/// Any failure of the metering query, including a non-finite value, is an
/// absent reading rather than an error.
pub fn measure(queue: &dyn QueueHandle, buffer: &CaptureBuffer) -> Option<PowerDb> {
    queue.average_power_db(buffer).filter(|db| db.is_finite())
}

/// Last observed level, shared lock-free with whoever draws it.
#[derive(Clone, Debug)]
pub struct LiveMeter {
    level_bits: Arc<AtomicU32>,
}

impl LiveMeter {
    pub fn new() -> Self {
        Self {
            level_bits: Arc::new(AtomicU32::new(DEFAULT_METER_DB.to_bits())),
        }
    }

    pub fn set_db(&self, db: f32) {
        self.level_bits.store(db.to_bits(), Ordering::Relaxed);
    }

    pub fn level_db(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.set_db(DEFAULT_METER_DB);
    }
}

impl Default for LiveMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// RMS level of a decoded block in dBFS. Digital silence bottoms out at -120;
/// an empty block reads as the meter's idle -60.
pub fn rms_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return DEFAULT_METER_DB;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    energy_to_db(energy)
}

/// RMS level of packed little-endian 16-bit PCM.
pub(crate) fn pcm16_rms_db(bytes: &[u8]) -> f32 {
    let mut energy = 0.0f64;
    let mut count = 0usize;
    for pair in bytes.chunks_exact(2) {
        let sample = f64::from(i16::from_le_bytes([pair[0], pair[1]])) / 32_768.0;
        energy += sample * sample;
        count += 1;
    }
    if count == 0 {
        return DEFAULT_METER_DB;
    }
    energy_to_db((energy / count as f64) as f32)
}

fn energy_to_db(energy: f32) -> f32 {
    let rms = energy.sqrt().max(1e-6);
    20.0 * rms.log10()
}
