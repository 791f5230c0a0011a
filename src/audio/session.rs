//! Gated capture session.
//!
//! Owns a `CaptureDevice`, primes its buffer pool, and runs every delivered
//! buffer through meter → gate → file sink before handing it back. The gate and
//! the write cursor live in one mutex-guarded `GatedWriter`; only the device's
//! delivery thread mutates it while capture runs, and `prepare`/`stop` replace
//! or take it while no delivery is in flight.

use super::device::{AudioCategory, BufferCallback, CaptureDevice, QueueHandle};
use super::error::CaptureError;
use super::fanout::{FanoutWorker, SampleCallback, SampleFanout};
use super::format::CaptureFormat;
use super::gate::{Gate, GateDecision, GateState, DEFAULT_SILENCE_THRESHOLD_DB};
use super::meter::{self, LiveMeter, PowerDb};
use super::pool::{BufferPool, CaptureBuffer, PoolConfig};
use super::sink::WavFileSink;
use crate::{lock_or_recover, log_debug};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default bound on decoded blocks waiting for the visualization consumer.
pub const DEFAULT_FANOUT_CAPACITY: usize = 64;

/// Parameters fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub format: CaptureFormat,
    pub threshold_db: PowerDb,
    pub pool: PoolConfig,
    pub fanout_capacity: usize,
    pub category: AudioCategory,
    /// Log per-buffer capture time and handling latency.
    pub log_timings: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            format: CaptureFormat::speech(),
            threshold_db: DEFAULT_SILENCE_THRESHOLD_DB,
            pool: PoolConfig::default(),
            fanout_capacity: DEFAULT_FANOUT_CAPACITY,
            category: AudioCategory::PlayAndRecord,
            log_timings: false,
        }
    }
}

/// Notification called once when the gate ends a take.
pub type EndedCallback = Arc<dyn Fn() + Send + Sync>;

/// UI-facing hooks. Both run off the control thread and must not block.
#[derive(Clone)]
pub struct SessionObservers {
    pub on_samples: SampleCallback,
    pub on_ended: EndedCallback,
}

impl SessionObservers {
    pub fn new(on_samples: SampleCallback, on_ended: EndedCallback) -> Self {
        Self {
            on_samples,
            on_ended,
        }
    }

    /// Observers that ignore everything.
    pub fn silent() -> Self {
        Self::new(Arc::new(|_: &[f32], _: u32| {}), Arc::new(|| {}))
    }
}

/// Summary returned by `stop`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionReport {
    pub output: PathBuf,
    pub gate_state: GateState,
    pub buffers_delivered: u64,
    pub buffers_accepted: u64,
    pub buffers_rejected: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
    pub last_write_error: Option<String>,
    pub fanout_dropped: usize,
    pub device_dropped_frames: usize,
}

/// Gate, sink, and counters for one take.
pub(crate) struct GatedWriter {
    gate: Gate,
    sink: WavFileSink,
    delivered: u64,
    accepted: u64,
    rejected: u64,
    write_errors: u64,
    last_write_error: Option<String>,
}

impl GatedWriter {
    pub(crate) fn new(gate: Gate, sink: WavFileSink) -> Self {
        Self {
            gate,
            sink,
            delivered: 0,
            accepted: 0,
            rejected: 0,
            write_errors: 0,
            last_write_error: None,
        }
    }

    /// Decide on one buffer and persist it if accepted.
    pub(crate) fn process(
        &mut self,
        bytes: &[u8],
        power: Option<PowerDb>,
    ) -> Result<GateDecision, CaptureError> {
        self.delivered += 1;
        let decision = self.gate.observe(power);
        if decision.is_accepted() {
            self.sink.append(bytes)?;
            self.accepted += 1;
        } else {
            self.rejected += 1;
        }
        Ok(decision)
    }

    /// `process` for the delivery thread: write failures are recorded for the
    /// report instead of propagated. Returns true on the ended edge.
    fn handle(&mut self, bytes: &[u8], power: Option<PowerDb>) -> bool {
        match self.process(bytes, power) {
            Ok(decision) => decision.ended(),
            Err(err) => {
                log_debug(&format!("gated write failed: {err}"));
                tracing::warn!(error = %err, cursor = self.sink.cursor(), "gated write failed");
                self.write_errors += 1;
                self.last_write_error = Some(err.to_string());
                false
            }
        }
    }

    pub(crate) fn state(&self) -> GateState {
        self.gate.state()
    }

    pub(crate) fn cursor(&self) -> u64 {
        self.sink.cursor()
    }

    pub(crate) fn report(&self) -> SessionReport {
        SessionReport {
            output: self.sink.location().to_path_buf(),
            gate_state: self.gate.state(),
            buffers_delivered: self.delivered,
            buffers_accepted: self.accepted,
            buffers_rejected: self.rejected,
            bytes_written: self.sink.cursor(),
            write_errors: self.write_errors,
            last_write_error: self.last_write_error.clone(),
            ..SessionReport::default()
        }
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        self.sink.close()
    }
}

type SharedWriter = Arc<Mutex<Option<GatedWriter>>>;

pub(crate) fn timing_line(slot: usize, captured_at: Duration, handled_in: Duration) -> String {
    format!(
        "timing|phase=buffer_delivery|slot={slot}|captured_s={:.3}|handle_ms={:.3}",
        captured_at.as_secs_f64(),
        handled_in.as_secs_f64() * 1000.0
    )
}

/// Body of the device callback: meter, gate, maybe write, notify, re-enqueue.
///
/// The buffer is handed back on every path, including the one that ends the
/// take and the ones where no take is active.
pub(crate) fn on_buffer_delivered(
    writer: &SharedWriter,
    on_ended: &EndedCallback,
    live: Option<&LiveMeter>,
    queue: &dyn QueueHandle,
    buffer: CaptureBuffer,
) {
    let power = meter::measure(queue, &buffer);
    if let (Some(live), Some(db)) = (live, power) {
        live.set_db(db as f32);
    }

    let ended = match lock_or_recover(writer, "gated writer").as_mut() {
        Some(writer) => writer.handle(buffer.bytes(), power),
        None => false,
    };
    if ended {
        tracing::info!(slot = buffer.slot(), "gate ended take");
        on_ended();
    }

    if let Err(err) = queue.enqueue_buffer(buffer) {
        log_debug(&format!("failed to re-enqueue capture buffer: {err}"));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Prepared,
    Running,
}

pub struct CaptureSession<D: CaptureDevice> {
    device: D,
    config: SessionConfig,
    output: PathBuf,
    observers: SessionObservers,
    live: Option<LiveMeter>,
    writer: SharedWriter,
    fanout: Option<FanoutWorker>,
    format: CaptureFormat,
    phase: Phase,
}

impl<D: CaptureDevice> CaptureSession<D> {
    pub fn new(
        device: D,
        config: SessionConfig,
        output: impl Into<PathBuf>,
        observers: SessionObservers,
    ) -> Self {
        let format = config.format;
        Self {
            device,
            config,
            output: output.into(),
            observers,
            live: None,
            writer: Arc::new(Mutex::new(None)),
            fanout: None,
            format,
            phase: Phase::Idle,
        }
    }

    /// Publish every reading to `meter` as it arrives.
    pub fn with_live_meter(mut self, meter: LiveMeter) -> Self {
        self.live = Some(meter);
        self
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Format negotiated with the device at the last `prepare`.
    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Gate state of the current take, or `Ready` when none is prepared.
    pub fn gate_state(&self) -> GateState {
        lock_or_recover(&self.writer, "gated writer")
            .as_ref()
            .map(GatedWriter::state)
            .unwrap_or_default()
    }

    /// Write cursor of the current take.
    pub fn cursor(&self) -> u64 {
        lock_or_recover(&self.writer, "gated writer")
            .as_ref()
            .map(GatedWriter::cursor)
            .unwrap_or(0)
    }

    /// Reset the gate and cursor, open the device queue, prime the pool, enable
    /// metering, and create a fresh output file.
    ///
    /// On failure the device queue is disposed and no take is active.
    pub fn prepare(&mut self) -> Result<(), CaptureError> {
        if self.phase != Phase::Idle {
            self.stop()?;
        }
        lock_or_recover(&self.writer, "gated writer").take();

        if let Err(err) = self.prepare_device() {
            self.device.dispose();
            return Err(err);
        }

        let sink = match WavFileSink::create(&self.output, self.format) {
            Ok(sink) => sink,
            Err(err) => {
                self.device.dispose();
                return Err(err);
            }
        };
        *lock_or_recover(&self.writer, "gated writer") =
            Some(GatedWriter::new(Gate::new(self.config.threshold_db), sink));
        self.phase = Phase::Prepared;

        tracing::info!(
            output = %self.output.display(),
            threshold_db = self.config.threshold_db,
            "capture session prepared"
        );
        Ok(())
    }

    fn prepare_device(&mut self) -> Result<(), CaptureError> {
        let callback = self.delivery_callback();
        self.format = self.device.open(self.config.format, callback)?;
        let pool = BufferPool::plan(&self.config.pool, &self.format, &self.device)?;
        pool.prime(&mut self.device)?;
        self.device.enable_metering()?;
        log_debug(&format!(
            "capture pool primed: {} x {} bytes on '{}'",
            pool.slots(),
            pool.buffer_bytes(),
            self.device.name()
        ));
        Ok(())
    }

    fn delivery_callback(&self) -> BufferCallback {
        let writer = Arc::clone(&self.writer);
        let on_ended = Arc::clone(&self.observers.on_ended);
        let live = self.live.clone();
        let log_timings = self.config.log_timings;
        Box::new(move |queue: &dyn QueueHandle, buffer: CaptureBuffer, captured_at: Duration| {
            let slot = buffer.slot();
            let started = Instant::now();
            on_buffer_delivered(&writer, &on_ended, live.as_ref(), queue, buffer);
            if log_timings {
                log_debug(&timing_line(slot, captured_at, started.elapsed()));
            }
        })
    }

    /// Request the audio category, prepare a fresh take, then start hardware
    /// capture and decoded-sample forwarding. A running session is stopped
    /// first.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.phase != Phase::Idle {
            log_debug("start requested on an active session; stopping current take");
            self.stop()?;
        }
        self.device.activate_category(self.config.category)?;
        self.prepare()?;

        if let Err(err) = self.device.start() {
            self.abort();
            return Err(err);
        }
        let (fanout, worker) = match SampleFanout::spawn(
            self.config.fanout_capacity,
            Arc::clone(&self.observers.on_samples),
        ) {
            Ok(pair) => pair,
            Err(err) => {
                self.abort();
                return Err(err);
            }
        };
        self.device.start_fetching(fanout);
        self.fanout = Some(worker);
        self.phase = Phase::Running;
        tracing::info!(device = %self.device.name(), "capture session started");
        Ok(())
    }

    /// Stop capture, release the queue, finalize the file, stop forwarding.
    ///
    /// Returns the report for the take, or `None` if nothing was active. A
    /// second call is a no-op. Forwarding is stopped even when finalizing fails.
    pub fn stop(&mut self) -> Result<Option<SessionReport>, CaptureError> {
        if self.phase == Phase::Idle {
            return Ok(None);
        }
        self.phase = Phase::Idle;

        self.device.stop();
        self.device.dispose();

        let writer = lock_or_recover(&self.writer, "gated writer").take();
        let closed = writer.map(|mut writer| {
            let report = writer.report();
            writer.close().map(|()| report)
        });

        self.device.stop_fetching();
        let fanout_dropped = self.fanout.take().map(FanoutWorker::join).unwrap_or(0);
        if let Some(live) = &self.live {
            live.reset();
        }

        let Some(report) = closed.transpose()? else {
            return Ok(None);
        };
        let report = SessionReport {
            fanout_dropped,
            device_dropped_frames: self.device.dropped_frames(),
            ..report
        };
        tracing::info!(
            gate_state = report.gate_state.label(),
            bytes_written = report.bytes_written,
            buffers_delivered = report.buffers_delivered,
            "capture session stopped"
        );
        Ok(Some(report))
    }

    /// Tear down after a failed start. The take's file is finalized so it stays
    /// readable.
    fn abort(&mut self) {
        self.phase = Phase::Prepared;
        if let Err(err) = self.stop() {
            log_debug(&format!("cleanup after failed start: {err}"));
        }
    }
}

impl<D: CaptureDevice> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log_debug(&format!("capture session drop: {err}"));
        }
    }
}
