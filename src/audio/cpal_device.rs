//! System microphone capture via CPAL.
//!
//! cpal delivers interleaved samples in whatever format the hardware prefers.
//! The hardware callback normalizes them to 16 kHz mono PCM16, packs them into
//! pool buffers, and a dedicated delivery thread runs the session callback for
//! each filled buffer.

use super::device::{AudioCategory, BufferCallback, BufferQueue, CaptureDevice, QueueHandle};
use super::dispatch::{BufferFiller, Delivery};
use super::error::CaptureError;
use super::fanout::SampleFanout;
use super::format::CaptureFormat;
use super::pool::{CaptureBuffer, MAX_BUFFER_BYTES};
use super::resample::FrameConverter;
use super::TARGET_RATE;
use crate::{lock_or_recover, log_debug};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig, SupportedStreamConfig};
use crossbeam_channel::unbounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Conversion granularity between the hardware callback and pool buffers.
const FRAME_MS: u64 = 20;

/// Input device wrapper implementing the capture queue on top of a cpal stream.
pub struct CpalDevice {
    device: cpal::Device,
    format: Option<CaptureFormat>,
    queue: Option<BufferQueue>,
    callback: Option<BufferCallback>,
    stream: Option<Stream>,
    delivery: Option<JoinHandle<()>>,
    fanout: Arc<Mutex<Option<SampleFanout>>>,
    dropped: Arc<AtomicUsize>,
}

impl CpalDevice {
    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_devices() -> Result<Vec<String>, CaptureError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|err| CaptureError::device(format!("no input devices available: {err}")))?;
        Ok(devices.filter_map(|device| device.name().ok()).collect())
    }

    /// Use the default input, or the device named `preferred_device`.
    pub fn new(preferred_device: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices().map_err(|err| {
                    CaptureError::device(format!("no input devices available: {err}"))
                })?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| CaptureError::device(format!("input device '{name}' not found")))?
            }
            None => host
                .default_input_device()
                .ok_or_else(|| CaptureError::device("no default input device available"))?,
        };
        Ok(Self {
            device,
            format: None,
            queue: None,
            callback: None,
            stream: None,
            delivery: None,
            fanout: Arc::new(Mutex::new(None)),
            dropped: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn open_queue(&self) -> Result<&BufferQueue, CaptureError> {
        self.queue
            .as_ref()
            .ok_or_else(|| CaptureError::device("capture queue is not open"))
    }

    fn build_stream(
        &self,
        supported: SupportedStreamConfig,
        filler: BufferFiller,
    ) -> Result<Stream, CaptureError> {
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let channels = usize::from(config.channels.max(1));
        let filler = Arc::new(Mutex::new(filler));
        let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));

        // Convert every supported sample type to f32 up front so the filler can
        // stay format-agnostic.
        let stream = match sample_format {
            SampleFormat::F32 => {
                let (filler, dropped) = (filler.clone(), self.dropped.clone());
                self.device.build_input_stream(
                    &config,
                    move |data: &[f32], _| match filler.try_lock() {
                        Ok(mut pump) => pump.push(data, channels, |sample| sample),
                        Err(_) => {
                            dropped.fetch_add(data.len() / channels, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let (filler, dropped) = (filler.clone(), self.dropped.clone());
                self.device.build_input_stream(
                    &config,
                    move |data: &[i16], _| match filler.try_lock() {
                        Ok(mut pump) => {
                            pump.push(data, channels, |sample| sample as f32 / 32_768.0)
                        }
                        Err(_) => {
                            dropped.fetch_add(data.len() / channels, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let (filler, dropped) = (filler.clone(), self.dropped.clone());
                self.device.build_input_stream(
                    &config,
                    move |data: &[u16], _| match filler.try_lock() {
                        Ok(mut pump) => pump.push(data, channels, |sample| {
                            (sample as f32 - 32_768.0) / 32_768.0
                        }),
                        Err(_) => {
                            dropped.fetch_add(data.len() / channels, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(CaptureError::device(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        }
        .map_err(|err| CaptureError::device(format!("failed to build input stream: {err}")))?;
        Ok(stream)
    }
}

impl CaptureDevice for CpalDevice {
    fn name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Desktop hosts have no process-wide audio mode; the closest equivalent is
    /// confirming the OS will hand us an input configuration at all.
    fn activate_category(&mut self, category: AudioCategory) -> Result<(), CaptureError> {
        self.device
            .default_input_config()
            .map(|_| ())
            .map_err(|err| CaptureError::Permission {
                category: category.label(),
                reason: format!("{err}. {}", mic_permission_hint()),
            })
    }

    fn open(
        &mut self,
        format: CaptureFormat,
        callback: BufferCallback,
    ) -> Result<CaptureFormat, CaptureError> {
        if format.sample_rate != TARGET_RATE || format.channels != 1 || !format.is_pcm16() {
            return Err(CaptureError::device(format!(
                "cpal capture only produces {TARGET_RATE} Hz mono PCM16, requested {format:?}"
            )));
        }
        self.dispose();
        let negotiated = CaptureFormat {
            bytes_per_packet: format.bytes_per_frame() as u32,
            ..format
        };
        self.format = Some(negotiated);
        self.queue = Some(BufferQueue::new());
        self.callback = Some(callback);
        self.dropped.store(0, Ordering::Relaxed);
        Ok(negotiated)
    }

    fn max_packet_size(&self) -> Result<u32, CaptureError> {
        self.format
            .map(|format| format.bytes_per_frame() as u32)
            .ok_or_else(|| CaptureError::device("capture queue is not open"))
    }

    fn allocate_buffer(
        &mut self,
        slot: usize,
        capacity: usize,
    ) -> Result<CaptureBuffer, CaptureError> {
        self.open_queue()?;
        if capacity == 0 || capacity > MAX_BUFFER_BYTES {
            return Err(CaptureError::device(format!(
                "buffer capacity {capacity} outside 1..={MAX_BUFFER_BYTES}"
            )));
        }
        Ok(CaptureBuffer::new(slot, capacity))
    }

    fn enqueue_buffer(&self, buffer: CaptureBuffer) -> Result<(), CaptureError> {
        self.open_queue()?.enqueue_buffer(buffer)
    }

    fn enable_metering(&mut self) -> Result<(), CaptureError> {
        self.open_queue()?.set_metering(true);
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let queue = self.open_queue()?.clone();
        let mut callback = self
            .callback
            .take()
            .ok_or_else(|| CaptureError::device("capture queue has no delivery callback"))?;

        let supported = self
            .device
            .default_input_config()
            .map_err(|err| CaptureError::device(format!("no input config: {err}")))?;
        let sample_rate = supported.sample_rate().0;
        log_debug(&format!(
            "CpalDevice start: device='{}' format={:?} sample_rate={sample_rate}Hz channels={}",
            self.name(),
            supported.sample_format(),
            supported.channels()
        ));
        let device_frame_samples = ((u64::from(sample_rate) * FRAME_MS) / 1000).max(1) as usize;
        let target_frame_samples = ((u64::from(TARGET_RATE) * FRAME_MS) / 1000) as usize;

        let (filled_tx, filled_rx) = unbounded::<Delivery>();
        let filler = BufferFiller::new(
            device_frame_samples,
            FrameConverter::new(sample_rate, target_frame_samples),
            queue.clone(),
            filled_tx,
            self.fanout.clone(),
            self.dropped.clone(),
        );
        let stream = self.build_stream(supported, filler)?;

        // Exits once the stream (and with it the filler's sender) is dropped.
        let delivery = thread::Builder::new()
            .name("gatekeep-capture".to_string())
            .spawn(move || {
                for (buffer, timestamp) in filled_rx.iter() {
                    callback(&queue, buffer, timestamp);
                }
            })
            .map_err(|err| {
                CaptureError::device(format!("failed to spawn delivery thread: {err}"))
            })?;

        if let Err(err) = stream.play() {
            drop(stream);
            let _ = delivery.join();
            return Err(CaptureError::device(format!(
                "failed to start input stream: {err}"
            )));
        }
        self.stream = Some(stream);
        self.delivery = Some(delivery);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log_debug(&format!("failed to pause audio stream: {err}"));
            }
            drop(stream);
        }
        if let Some(delivery) = self.delivery.take() {
            if delivery.join().is_err() {
                log_debug("capture delivery thread panicked");
            }
        }
    }

    fn dispose(&mut self) {
        self.stop();
        self.callback = None;
        if let Some(queue) = self.queue.take() {
            let released = queue.dispose();
            log_debug(&format!("capture queue disposed; released {released} buffers"));
        }
        self.format = None;
    }

    fn start_fetching(&mut self, fanout: SampleFanout) {
        *lock_or_recover(&self.fanout, "cpal fan-out slot") = Some(fanout);
    }

    fn stop_fetching(&mut self) {
        lock_or_recover(&self.fanout, "cpal fan-out slot").take();
    }

    fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: System Settings > Privacy & Security > Microphone (enable your terminal)."
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio permissions and ensure the device is not muted."
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: Settings > Privacy & Security > Microphone (allow access for your terminal)."
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "Check OS microphone permissions."
    }
}
