//! Sample-rate conversion from whatever the microphone runs at to the 16 kHz
//! capture format.

use super::TARGET_RATE;
use crate::log_debug;
#[cfg(feature = "high-quality-audio")]
use anyhow::{anyhow, Result};
#[cfg(feature = "high-quality-audio")]
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
use std::cmp::Ordering as CmpOrdering;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};

// Practical device range around the 16 kHz target (~0.01x .. 8x).
pub(super) const MIN_DEVICE_RATE: u32 = 2_000;
pub(super) const MAX_DEVICE_RATE: u32 = 1_600_000;
const MAX_DOWNSAMPLING_TAPS: usize = 129;

static FALLBACK_LOGGED: AtomicBool = AtomicBool::new(false);

/// Converts fixed-size device-rate frames into fixed-size target-rate frames.
///
/// Low-pass taps are designed once per stream instead of once per frame.
pub(super) struct FrameConverter {
    device_rate: u32,
    target_len: usize,
    taps: Vec<f32>,
}

impl FrameConverter {
    pub(super) fn new(device_rate: u32, target_len: usize) -> Self {
        let taps = if device_rate > TARGET_RATE && in_device_range(device_rate) {
            let normalized_cutoff = (TARGET_RATE as f32 * 0.5 / device_rate as f32).min(0.499);
            design_low_pass(normalized_cutoff, downsampling_tap_count(device_rate))
        } else {
            Vec::new()
        };
        Self {
            device_rate,
            target_len: target_len.max(1),
            taps,
        }
    }

    pub(super) fn target_len(&self) -> usize {
        self.target_len
    }

    pub(super) fn convert(&self, frame: Vec<f32>) -> Vec<f32> {
        if frame.is_empty() {
            return frame;
        }
        if self.device_rate == TARGET_RATE || self.device_rate == 0 {
            return adjust_frame_length(frame, self.target_len);
        }

        #[cfg(feature = "high-quality-audio")]
        {
            match resample_with_rubato(&frame, self.device_rate) {
                Ok(output) => return adjust_frame_length(output, self.target_len),
                Err(err) => {
                    if !FALLBACK_LOGGED.swap(true, Ordering::AcqRel) {
                        log_debug(&format!(
                            "sinc resampler failed ({err}); using FIR + linear path"
                        ));
                    }
                }
            }
        }

        adjust_frame_length(self.basic(&frame), self.target_len)
    }

    fn basic(&self, frame: &[f32]) -> Vec<f32> {
        if !in_device_range(self.device_rate) {
            if !FALLBACK_LOGGED.swap(true, Ordering::AcqRel) {
                log_debug(&format!(
                    "device rate {}Hz outside resampler range; passing audio through",
                    self.device_rate
                ));
            }
            return frame.to_vec();
        }
        let ratio = TARGET_RATE as f32 / self.device_rate as f32;
        if self.taps.is_empty() {
            resample_linear(frame, ratio)
        } else {
            resample_linear(&apply_fir(frame, &self.taps), ratio)
        }
    }
}

fn in_device_range(rate: u32) -> bool {
    (MIN_DEVICE_RATE..=MAX_DEVICE_RATE).contains(&rate)
}

#[cfg(feature = "high-quality-audio")]
pub(super) fn resample_with_rubato(input: &[f32], device_rate: u32) -> Result<Vec<f32>> {
    if !in_device_range(device_rate) {
        return Err(anyhow!(
            "unsupported device sample rate {device_rate}Hz for resampling"
        ));
    }
    let ratio = TARGET_RATE as f64 / device_rate as f64;
    let chunk = input.len().max(1);
    let params = InterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.90,
        interpolation: InterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk, 1)
        .map_err(|e| anyhow!("failed to construct sinc resampler: {e:?}"))?;
    let produced = resampler
        .process(std::slice::from_ref(&input.to_vec()), None)
        .map_err(|e| anyhow!("resampler process failed: {e:?}"))?;
    produced
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("resampler produced no channels"))
}

/// Linear interpolation; `ratio` > 1 upsamples.
pub(super) fn resample_linear(input: &[f32], ratio: f32) -> Vec<f32> {
    let output_len = (input.len() as f32 * ratio).round() as usize;
    let pad = input.last().copied().unwrap_or(0.0);
    (0..output_len)
        .map(|i| {
            let src = i as f32 / ratio;
            let idx = src.floor() as usize;
            let frac = src - idx as f32;
            match (input.get(idx), input.get(idx + 1)) {
                (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
                _ => pad,
            }
        })
        .collect()
}

/// Longer filters for steeper decimation, always odd, capped.
pub(super) fn downsampling_tap_count(device_rate: u32) -> usize {
    let decimation = device_rate as f32 / TARGET_RATE as f32;
    let mut taps = (decimation * 4.0).ceil().max(11.0) as usize;
    if taps % 2 == 0 {
        taps += 1;
    }
    taps.min(MAX_DOWNSAMPLING_TAPS)
}

fn apply_fir(input: &[f32], coeffs: &[f32]) -> Vec<f32> {
    let half = coeffs.len() / 2;
    (0..input.len())
        .map(|n| {
            coeffs
                .iter()
                .enumerate()
                .filter_map(|(k, coeff)| {
                    (n + k)
                        .checked_sub(half)
                        .and_then(|idx| input.get(idx))
                        .map(|sample| sample * coeff)
                })
                .sum()
        })
        .collect()
}

/// Hamming-windowed sinc low-pass, normalized to unity gain at DC.
pub(super) fn design_low_pass(normalized_cutoff: f32, taps: usize) -> Vec<f32> {
    if taps <= 1 {
        return vec![1.0];
    }
    let m = (taps - 1) as f32;
    let mut coeffs: Vec<f32> = (0..taps)
        .map(|n| {
            let centered = n as f32 - m / 2.0;
            let x = 2.0 * PI * normalized_cutoff * centered;
            let sinc = if centered == 0.0 {
                2.0 * normalized_cutoff
            } else {
                (2.0 * normalized_cutoff * x.sin()) / x
            };
            let window = 0.54 - 0.46 * ((2.0 * PI * n as f32) / m).cos();
            sinc * window
        })
        .collect();

    let sum: f32 = coeffs.iter().sum();
    if sum != 0.0 {
        coeffs.iter_mut().for_each(|c| *c /= sum);
    }
    coeffs
}

pub(super) fn adjust_frame_length(mut data: Vec<f32>, desired: usize) -> Vec<f32> {
    match data.len().cmp(&desired) {
        CmpOrdering::Greater => data.truncate(desired),
        CmpOrdering::Less => {
            let pad = data.last().copied().unwrap_or(0.0);
            data.resize(desired, pad);
        }
        CmpOrdering::Equal => {}
    }
    data
}
