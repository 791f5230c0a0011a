use super::device::BufferQueue;
use super::dispatch::{append_downmixed_samples, encode_pcm16, BufferFiller, Delivery};
use super::resample::{
    adjust_frame_length, design_low_pass, downsampling_tap_count, resample_linear,
    FrameConverter, MAX_DEVICE_RATE, MIN_DEVICE_RATE,
};
use super::session::{on_buffer_delivered, timing_line, GatedWriter};
use super::{
    AudioCategory, BufferCallback, CaptureBuffer, CaptureDevice, CaptureError, CaptureFormat,
    CaptureSession, Gate, GateState, LiveMeter, QueueHandle, SampleFanout, SessionConfig,
    SessionObservers, WavFileSink, MAX_BUFFER_BYTES, TARGET_RATE,
};
use crossbeam_channel::unbounded;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Queue handle that counts how often a buffer is handed back.
struct CountingQueue<'a> {
    inner: &'a BufferQueue,
    enqueued: &'a AtomicUsize,
}

impl QueueHandle for CountingQueue<'_> {
    fn enqueue_buffer(&self, buffer: CaptureBuffer) -> Result<(), CaptureError> {
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        self.inner.enqueue_buffer(buffer)
    }

    fn average_power_db(&self, buffer: &CaptureBuffer) -> Option<f64> {
        self.inner.average_power_db(buffer)
    }
}

/// In-memory device: buffers only move when a test calls `deliver`.
#[derive(Default)]
struct ScriptedDevice {
    queue: Option<BufferQueue>,
    callback: Option<BufferCallback>,
    fetching: Option<SampleFanout>,
    packet_bytes: Option<u32>,
    max_packet: u32,
    deny_category: bool,
    fail_allocation: bool,
    enqueued: AtomicUsize,
    allocations: Vec<usize>,
    running: bool,
    starts: usize,
    disposals: usize,
}

impl ScriptedDevice {
    fn new() -> Self {
        Self {
            max_packet: 2,
            ..Self::default()
        }
    }

    /// Fill the next free buffer with `payload`, tag it with `reading`, and run
    /// the delivery callback. Returns false when no buffer was available.
    fn deliver(&mut self, reading: Option<f64>, payload: &[u8]) -> bool {
        let Some(queue) = self.queue.clone() else {
            return false;
        };
        let Some(mut buffer) = queue.take_free() else {
            return false;
        };
        buffer.fill(payload);
        buffer.set_level_db(reading.map(|db| db as f32));
        if let Some(fanout) = &self.fetching {
            let decoded: Vec<f32> = payload
                .chunks_exact(2)
                .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32_768.0)
                .collect();
            fanout.forward(&decoded);
        }
        let Some(callback) = self.callback.as_mut() else {
            return false;
        };
        let counting = CountingQueue {
            inner: &queue,
            enqueued: &self.enqueued,
        };
        callback(&counting, buffer, Duration::ZERO);
        true
    }

    fn enqueued(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }

    fn free_buffers(&self) -> usize {
        self.queue.as_ref().map(BufferQueue::free_len).unwrap_or(0)
    }
}

impl CaptureDevice for ScriptedDevice {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn activate_category(&mut self, category: AudioCategory) -> Result<(), CaptureError> {
        if self.deny_category {
            return Err(CaptureError::Permission {
                category: category.label(),
                reason: "denied by test".to_string(),
            });
        }
        Ok(())
    }

    fn open(
        &mut self,
        format: CaptureFormat,
        callback: BufferCallback,
    ) -> Result<CaptureFormat, CaptureError> {
        self.dispose();
        self.queue = Some(BufferQueue::new());
        self.callback = Some(callback);
        Ok(CaptureFormat {
            bytes_per_packet: self.packet_bytes.unwrap_or(format.bytes_per_packet),
            ..format
        })
    }

    fn max_packet_size(&self) -> Result<u32, CaptureError> {
        Ok(self.max_packet)
    }

    fn allocate_buffer(
        &mut self,
        slot: usize,
        capacity: usize,
    ) -> Result<CaptureBuffer, CaptureError> {
        if self.fail_allocation {
            return Err(CaptureError::device("allocation refused by test"));
        }
        self.allocations.push(capacity);
        Ok(CaptureBuffer::new(slot, capacity))
    }

    fn enqueue_buffer(&self, buffer: CaptureBuffer) -> Result<(), CaptureError> {
        self.queue
            .as_ref()
            .ok_or_else(|| CaptureError::device("queue not open"))?
            .enqueue_buffer(buffer)
    }

    fn enable_metering(&mut self) -> Result<(), CaptureError> {
        self.queue
            .as_ref()
            .ok_or_else(|| CaptureError::device("queue not open"))?
            .set_metering(true);
        Ok(())
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.running = true;
        self.starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn dispose(&mut self) {
        self.stop();
        self.callback = None;
        if let Some(queue) = self.queue.take() {
            queue.dispose();
            self.disposals += 1;
        }
    }

    fn start_fetching(&mut self, fanout: SampleFanout) {
        self.fetching = Some(fanout);
    }

    fn stop_fetching(&mut self) {
        self.fetching = None;
    }
}

struct Harness {
    session: CaptureSession<ScriptedDevice>,
    ended: Arc<AtomicUsize>,
    blocks: Arc<AtomicUsize>,
    path: PathBuf,
    _dir: tempfile::TempDir,
}

fn harness_with(device: ScriptedDevice) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.wav");
    let ended = Arc::new(AtomicUsize::new(0));
    let blocks = Arc::new(AtomicUsize::new(0));
    let (ended_hook, blocks_hook) = (ended.clone(), blocks.clone());
    let observers = SessionObservers::new(
        Arc::new(move |_: &[f32], _: u32| {
            blocks_hook.fetch_add(1, Ordering::SeqCst);
        }),
        Arc::new(move || {
            ended_hook.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let session = CaptureSession::new(device, SessionConfig::default(), &path, observers);
    Harness {
        session,
        ended,
        blocks,
        path,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(ScriptedDevice::new())
}

fn payload(value: i16, samples: usize) -> Vec<u8> {
    std::iter::repeat(value)
        .take(samples)
        .flat_map(i16::to_le_bytes)
        .collect()
}

fn read_samples(path: &Path) -> Vec<i16> {
    hound::WavReader::open(path)
        .unwrap()
        .into_samples::<i16>()
        .map(Result::unwrap)
        .collect()
}

#[test]
fn leading_silence_is_skipped_and_trailing_pause_ends_take() {
    let mut h = harness();
    h.session.start().unwrap();

    let readings = [None, Some(-60.0), Some(-40.0), Some(-45.0), Some(-55.0)];
    for (i, reading) in readings.iter().enumerate() {
        let bytes = payload(i as i16 + 1, 160);
        assert!(h.session.device_mut().deliver(*reading, &bytes));
    }

    assert_eq!(h.session.gate_state(), GateState::Ended);
    assert_eq!(h.ended.load(Ordering::SeqCst), 1);
    assert_eq!(h.session.cursor(), 2 * 320);

    let report = h.session.stop().unwrap().unwrap();
    assert_eq!(report.buffers_delivered, 5);
    assert_eq!(report.buffers_accepted, 2);
    assert_eq!(report.buffers_rejected, 3);
    assert_eq!(report.bytes_written, 640);

    let samples = read_samples(&h.path);
    assert_eq!(samples.len(), 320);
    assert!(samples[..160].iter().all(|s| *s == 3));
    assert!(samples[160..].iter().all(|s| *s == 4));
}

#[test]
fn buffers_after_the_take_ends_are_returned_unwritten() {
    let mut h = harness();
    h.session.start().unwrap();
    let device = h.session.device_mut();
    assert!(device.deliver(Some(-20.0), &payload(5, 40)));
    assert!(device.deliver(Some(-70.0), &payload(6, 40)));
    assert_eq!(h.session.gate_state(), GateState::Ended);
    let cursor = h.session.cursor();

    let late = [Some(-10.0), None, Some(-80.0), Some(-5.0)];
    for reading in late {
        assert!(h.session.device_mut().deliver(reading, &payload(9, 40)));
    }

    assert_eq!(h.ended.load(Ordering::SeqCst), 1);
    assert_eq!(h.session.cursor(), cursor);
    assert_eq!(h.session.gate_state(), GateState::Ended);
    assert_eq!(h.session.device().enqueued(), 2 + late.len());

    let report = h.session.stop().unwrap().unwrap();
    assert_eq!(report.buffers_delivered, 6);
    assert_eq!(report.buffers_accepted, 1);
    assert!(read_samples(&h.path).iter().all(|s| *s == 5));
}

#[test]
fn continuous_speech_is_written_without_ending() {
    let mut h = harness();
    h.session.start().unwrap();
    let sizes = [100usize, 200, 300];
    for samples in sizes {
        h.session
            .device_mut()
            .deliver(Some(-30.0), &payload(7, samples));
    }

    assert_eq!(h.session.gate_state(), GateState::Recording);
    assert_eq!(h.ended.load(Ordering::SeqCst), 0);
    assert_eq!(h.session.cursor(), 2 * 600);

    h.session.stop().unwrap();
    assert_eq!(read_samples(&h.path).len(), 600);
}

#[test]
fn stop_before_speech_leaves_an_empty_file() {
    let mut h = harness();
    h.session.start().unwrap();
    let report = h.session.stop().unwrap().unwrap();

    assert_eq!(report.gate_state, GateState::Ready);
    assert_eq!(report.bytes_written, 0);
    assert!(h.path.exists());
    assert!(read_samples(&h.path).is_empty());
}

#[test]
fn every_delivered_buffer_is_reenqueued_once() {
    let mut h = harness();
    h.session.start().unwrap();
    let readings = [
        None,
        Some(-60.0),
        Some(-20.0),
        Some(f64::NAN),
        Some(-70.0),
        Some(-20.0),
    ];
    for reading in readings {
        h.session.device_mut().deliver(reading, &payload(1, 10));
    }

    let device = h.session.device();
    assert_eq!(device.enqueued(), readings.len());
    assert_eq!(device.free_buffers(), 5);
}

#[test]
fn pool_cycles_through_more_buffers_than_slots() {
    let mut h = harness();
    h.session.start().unwrap();
    for _ in 0..23 {
        assert!(h.session.device_mut().deliver(Some(-20.0), &payload(3, 8)));
    }
    assert_eq!(h.session.device().allocations.len(), 5);
    assert_eq!(h.session.cursor(), 23 * 16);
}

#[test]
fn stop_twice_is_a_noop() {
    let mut h = harness();
    h.session.start().unwrap();
    h.session.device_mut().deliver(Some(-20.0), &payload(9, 50));

    assert!(h.session.stop().unwrap().is_some());
    assert!(h.session.stop().unwrap().is_none());
    assert!(!h.session.is_running());
    assert!(!h.session.device().running);
    assert_eq!(h.session.device().disposals, 1);
    assert_eq!(read_samples(&h.path).len(), 50);
}

#[test]
fn stop_without_start_reports_nothing() {
    let mut h = harness();
    assert!(h.session.stop().unwrap().is_none());
    assert!(!h.path.exists());
}

#[test]
fn deliveries_after_stop_are_not_written() {
    let mut h = harness();
    h.session.start().unwrap();
    h.session.stop().unwrap();
    assert!(!h.session.device_mut().deliver(Some(-20.0), &payload(1, 10)));
    assert!(read_samples(&h.path).is_empty());
}

#[test]
fn denied_category_fails_start_without_creating_a_file() {
    let mut device = ScriptedDevice::new();
    device.deny_category = true;
    let mut h = harness_with(device);

    let err = h.session.start().unwrap_err();
    assert!(matches!(err, CaptureError::Permission { .. }), "{err}");
    assert_eq!(err.label(), "permission");
    assert!(!h.session.is_running());
    assert!(!h.path.exists());
    assert_eq!(h.session.device().starts, 0);
}

#[test]
fn allocation_failure_disposes_queue() {
    let mut device = ScriptedDevice::new();
    device.fail_allocation = true;
    let mut h = harness_with(device);

    let err = h.session.start().unwrap_err();
    assert!(matches!(err, CaptureError::Device(_)), "{err}");
    assert!(!h.session.is_running());
    assert!(h.session.device().queue.is_none());
    assert!(h.session.device().callback.is_none());
    assert_eq!(h.session.device().disposals, 1);
    assert_eq!(h.session.device().starts, 0);
}

#[test]
fn constant_bit_rate_buffers_hold_half_a_second() {
    let mut h = harness();
    h.session.prepare().unwrap();
    let device = h.session.device();
    assert_eq!(device.allocations, vec![16_000; 5]);
    assert_eq!(device.free_buffers(), 5);
    assert_eq!(h.session.gate_state(), GateState::Ready);
    assert_eq!(h.session.cursor(), 0);
}

#[test]
fn variable_bit_rate_sizes_buffers_from_max_packet() {
    let mut device = ScriptedDevice::new();
    device.packet_bytes = Some(0);
    device.max_packet = 4;
    let mut h = harness_with(device);

    h.session.prepare().unwrap();
    assert_eq!(h.session.format().bytes_per_packet, 0);
    assert_eq!(h.session.device().allocations, vec![32_000; 5]);
}

#[test]
fn oversized_packets_are_capped() {
    let mut device = ScriptedDevice::new();
    device.packet_bytes = Some(0);
    device.max_packet = 1_000;
    let mut h = harness_with(device);

    h.session.prepare().unwrap();
    assert_eq!(h.session.device().allocations[0], MAX_BUFFER_BYTES);
}

#[test]
fn rejected_buffers_still_reach_the_sample_consumer() {
    let mut h = harness();
    h.session.start().unwrap();
    for reading in [None, Some(-60.0), Some(-60.0)] {
        h.session.device_mut().deliver(reading, &payload(2, 32));
    }
    let report = h.session.stop().unwrap().unwrap();

    assert_eq!(report.bytes_written, 0);
    assert_eq!(report.fanout_dropped, 0);
    assert_eq!(h.blocks.load(Ordering::SeqCst), 3);
}

#[test]
fn restart_truncates_and_rearms() {
    let mut h = harness();
    h.session.start().unwrap();
    h.session
        .device_mut()
        .deliver(Some(-20.0), &payload(5, 400));
    h.session
        .device_mut()
        .deliver(Some(-70.0), &payload(5, 400));
    assert_eq!(h.session.gate_state(), GateState::Ended);

    h.session.start().unwrap();
    assert!(h.session.is_running());
    assert_eq!(h.session.gate_state(), GateState::Ready);
    assert_eq!(h.session.cursor(), 0);
    assert_eq!(h.session.device().starts, 2);
    assert_eq!(h.session.device().allocations.len(), 10);

    h.session.device_mut().deliver(Some(-20.0), &payload(6, 10));
    h.session.stop().unwrap();
    assert_eq!(read_samples(&h.path), vec![6; 10]);
    assert_eq!(h.ended.load(Ordering::SeqCst), 1);
}

#[test]
fn live_meter_follows_readings_and_resets_on_stop() {
    let dir = tempfile::tempdir().unwrap();
    let meter = LiveMeter::new();
    let mut session = CaptureSession::new(
        ScriptedDevice::new(),
        SessionConfig::default(),
        dir.path().join("meter.wav"),
        SessionObservers::silent(),
    )
    .with_live_meter(meter.clone());

    session.start().unwrap();
    session.device_mut().deliver(Some(-42.0), &payload(1, 4));
    assert!((meter.level_db() + 42.0).abs() < 1e-4);
    session.device_mut().deliver(None, &payload(1, 4));
    assert!((meter.level_db() + 42.0).abs() < 1e-4);

    session.stop().unwrap();
    assert!((meter.level_db() + 60.0).abs() < 1e-4);
}

#[test]
fn dropping_a_running_session_finalizes_the_file() {
    let mut h = harness();
    h.session.start().unwrap();
    h.session.device_mut().deliver(Some(-10.0), &payload(4, 25));
    let path = h.path.clone();
    let Harness { session, _dir, .. } = h;
    drop(session);
    assert_eq!(read_samples(&path).len(), 25);
}

#[test]
fn write_failures_are_counted_and_buffer_still_returns() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = WavFileSink::create(&dir.path().join("closed.wav"), CaptureFormat::speech())
        .unwrap();
    sink.close().unwrap();
    let writer = Arc::new(Mutex::new(Some(GatedWriter::new(Gate::default(), sink))));
    let ended: super::EndedCallback = Arc::new(|| {});

    let queue = BufferQueue::new();
    queue.set_metering(true);
    let enqueued = AtomicUsize::new(0);
    let counting = CountingQueue {
        inner: &queue,
        enqueued: &enqueued,
    };
    let mut buffer = CaptureBuffer::new(0, 64);
    buffer.fill(&payload(1, 8));
    buffer.set_level_db(Some(-10.0));

    on_buffer_delivered(&writer, &ended, None, &counting, buffer);

    assert_eq!(enqueued.load(Ordering::SeqCst), 1);
    let guard = writer.lock().unwrap();
    let report = guard.as_ref().unwrap().report();
    assert_eq!(report.gate_state, GateState::Recording);
    assert_eq!(report.write_errors, 1);
    assert!(report.last_write_error.is_some());
    assert_eq!(report.buffers_delivered, 1);
    assert_eq!(report.buffers_accepted, 0);
}

#[test]
fn delivery_without_active_take_only_reenqueues() {
    let writer = Arc::new(Mutex::new(None));
    let ended: super::EndedCallback = Arc::new(|| panic!("no take is active"));
    let queue = BufferQueue::new();
    let enqueued = AtomicUsize::new(0);
    let counting = CountingQueue {
        inner: &queue,
        enqueued: &enqueued,
    };

    on_buffer_delivered(&writer, &ended, None, &counting, CaptureBuffer::new(3, 16));
    assert_eq!(enqueued.load(Ordering::SeqCst), 1);
    assert_eq!(queue.free_len(), 1);
}

#[test]
fn timing_line_reports_capture_time_and_handling_latency() {
    let line = timing_line(3, Duration::from_millis(1_500), Duration::from_micros(250));
    assert_eq!(
        line,
        "timing|phase=buffer_delivery|slot=3|captured_s=1.500|handle_ms=0.250"
    );
}

#[test]
fn report_serializes_with_snake_case_state() {
    let mut h = harness();
    h.session.start().unwrap();
    let report = h.session.stop().unwrap().unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["gate_state"], "ready");
    assert_eq!(json["bytes_written"], 0);
}

// Buffer filler: the producer half that runs on the hardware thread.

fn filler_fixture(
    slots: usize,
    capacity: usize,
) -> (
    BufferFiller,
    crossbeam_channel::Receiver<Delivery>,
    BufferQueue,
    Arc<AtomicUsize>,
) {
    let queue = BufferQueue::new();
    queue.set_metering(true);
    for slot in 0..slots {
        queue
            .enqueue_buffer(CaptureBuffer::new(slot, capacity))
            .unwrap();
    }
    let (tx, rx) = unbounded();
    let dropped = Arc::new(AtomicUsize::new(0));
    let filler = BufferFiller::new(
        320,
        FrameConverter::new(TARGET_RATE, 320),
        queue.clone(),
        tx,
        Arc::new(Mutex::new(None)),
        dropped.clone(),
    );
    (filler, rx, queue, dropped)
}

#[test]
fn filler_delivers_full_buffers_with_levels() {
    let (mut filler, rx, queue, dropped) = filler_fixture(2, 640);
    filler.push(&vec![0.5f32; 640], 1, |s| s);

    let (first, _) = rx.try_recv().unwrap();
    let (second, _) = rx.try_recv().unwrap();
    assert!(rx.try_recv().is_err());
    assert_eq!(first.valid_bytes(), 640);
    assert_eq!(second.slot(), 1);
    let level = queue.average_power_db(&first).unwrap();
    assert!((level - (-6.02)).abs() < 0.1, "level {level}");
    assert_eq!(dropped.load(Ordering::Relaxed), 0);
}

#[test]
fn filler_counts_samples_when_pool_is_empty() {
    let (mut filler, rx, _queue, dropped) = filler_fixture(1, 640);
    filler.push(&vec![0.1f32; 960], 1, |s| s);

    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
    assert_eq!(dropped.load(Ordering::Relaxed), 640);
}

#[test]
fn filler_reuses_frame_storage_at_target_rate() {
    let (mut filler, rx, _queue, _) = filler_fixture(4, 640);
    filler.push(&vec![0.3f32; 320], 1, |s| s);
    let storage = filler.frame_storage();
    filler.push(&vec![0.3f32; 640], 1, |s| s);

    assert_eq!(filler.frame_storage(), storage);
    assert_eq!(rx.try_iter().count(), 3);
}

#[test]
fn filler_holds_partial_frames_until_complete() {
    let (mut filler, rx, queue, _) = filler_fixture(1, 1_280);
    filler.push(&vec![0.2f32; 300], 1, |s| s);
    assert_eq!(queue.free_len(), 1);
    filler.push(&vec![0.2f32; 20], 1, |s| s);
    // One frame taken from the pool but the buffer is only half full.
    assert_eq!(queue.free_len(), 0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn filler_forwards_every_frame_to_fanout() {
    let queue = BufferQueue::new();
    let (tx, _rx) = unbounded();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let (fanout, worker) = SampleFanout::spawn(
        16,
        Arc::new(move |_: &[f32], count: u32| {
            assert_eq!(count, 320);
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();
    let slot = Arc::new(Mutex::new(Some(fanout)));
    let mut filler = BufferFiller::new(
        640,
        FrameConverter::new(32_000, 320),
        queue,
        tx,
        slot.clone(),
        Arc::new(AtomicUsize::new(0)),
    );

    // No pool buffers at all: storage drops, forwarding does not.
    filler.push(&vec![0.3f32; 640 * 3], 1, |s| s);
    slot.lock().unwrap().take();
    drop(filler);
    assert_eq!(worker.join(), 0);
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[test]
fn filler_downmixes_interleaved_input() {
    let (mut filler, rx, _queue, _) = filler_fixture(1, 640);
    let stereo: Vec<i16> = (0..640).map(|i| if i % 2 == 0 { 16_384 } else { 0 }).collect();
    filler.push(&stereo, 2, |s| f32::from(s) / 32_768.0);

    let (buffer, _) = rx.try_recv().unwrap();
    let first = i16::from_le_bytes([buffer.bytes()[0], buffer.bytes()[1]]);
    assert!((i32::from(first) - 8_192).abs() <= 1, "sample {first}");
}

#[test]
fn encode_pcm16_clamps_and_packs_little_endian() {
    let mut out = vec![0xAA];
    encode_pcm16(&[1.0, -1.0, 0.0, 2.0, -3.0], &mut out);
    let decoded: Vec<i16> = out
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    assert_eq!(decoded, vec![32_767, -32_767, 0, 32_767, -32_767]);
}

#[test]
fn downmixes_multi_channel_audio() {
    let mut buf = Vec::new();
    let samples = [1.0f32, -1.0, 0.5, 0.5];
    append_downmixed_samples(&mut buf, &samples, 2, |sample| sample);
    assert_eq!(buf, vec![0.0, 0.5]);
}

#[test]
fn preserves_single_channel_audio() {
    let mut buf = Vec::new();
    let samples = [0.1f32, 0.2, 0.3];
    append_downmixed_samples(&mut buf, &samples, 1, |sample| sample);
    assert_eq!(buf, samples);
}

#[test]
fn append_downmixed_samples_handles_partial_frame() {
    let mut buf = Vec::new();
    let samples = [1.0f32, 3.0, 5.0];
    append_downmixed_samples(&mut buf, &samples, 2, |sample| sample);
    assert_eq!(buf, vec![2.0, 5.0]);
}

// Resampling.

#[test]
fn converter_passes_target_rate_through() {
    let converter = FrameConverter::new(TARGET_RATE, 4);
    assert_eq!(converter.convert(vec![0.1, 0.2, 0.3, 0.4]), vec![0.1, 0.2, 0.3, 0.4]);
    assert_eq!(converter.convert(vec![0.1, 0.2]), vec![0.1, 0.2, 0.2, 0.2]);
}

#[test]
fn converter_returns_empty_for_empty_input() {
    let converter = FrameConverter::new(48_000, 320);
    assert!(converter.convert(Vec::new()).is_empty());
}

#[test]
fn converter_always_yields_target_length() {
    for rate in [8_000u32, 22_050, 44_100, 48_000, 96_000] {
        let frame_len = (rate as usize * 20) / 1000;
        let converter = FrameConverter::new(rate, 320);
        let frame: Vec<f32> = (0..frame_len).map(|i| (i as f32 * 0.01).sin()).collect();
        assert_eq!(converter.convert(frame).len(), 320, "rate {rate}");
    }
}

#[test]
fn converter_out_of_range_rate_is_length_adjusted() {
    let converter = FrameConverter::new(MAX_DEVICE_RATE + 1, 8);
    let out = converter.convert(vec![0.25; 32]);
    assert_eq!(out, vec![0.25; 8]);
    let converter = FrameConverter::new(MIN_DEVICE_RATE - 1, 8);
    assert_eq!(converter.convert(vec![0.5; 3]), vec![0.5; 8]);
}

#[test]
fn resample_linear_interpolates_expected_values() {
    let input = vec![0.0f32, 1.0];
    let output = resample_linear(&input, 2.0);
    assert_eq!(output, vec![0.0, 0.5, 1.0, 1.0]);
}

#[test]
fn resample_linear_scales_length() {
    let input = vec![0.0f32, 1.0, 2.0, 3.0];
    let result = resample_linear(&input, 0.5);
    assert_eq!(result.len(), 2);
    assert!(result[0].abs() < 1e-6);
}

#[test]
fn downsampling_tap_count_is_odd_and_scaled() {
    assert_eq!(downsampling_tap_count(16_000), 11);
    assert_eq!(downsampling_tap_count(48_000), 13);
    assert_eq!(downsampling_tap_count(MAX_DEVICE_RATE), 129);
}

#[test]
fn design_low_pass_coeffs_are_normalized() {
    let coeffs = design_low_pass(0.1, 11);
    let sum: f32 = coeffs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-3);
    assert!((coeffs[0] - coeffs[10]).abs() < 1e-6);
    assert_eq!(design_low_pass(0.1, 1), vec![1.0]);
}

#[test]
fn adjust_frame_length_pads_with_last_sample() {
    assert_eq!(adjust_frame_length(vec![1.0, 2.0], 4), vec![1.0, 2.0, 2.0, 2.0]);
    assert_eq!(adjust_frame_length(vec![1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
    assert_eq!(adjust_frame_length(Vec::new(), 2), vec![0.0, 0.0]);
}

#[test]
fn converter_suppresses_aliasing_when_downsampling() {
    let frame_len = 48_000 / 10;
    let signal = multi_tone_signal(&[(6_000.0, 1.0), (12_000.0, 1.0)], 48_000, frame_len);
    let converted = FrameConverter::new(48_000, 1_600).convert(signal.clone());
    let naive = resample_linear(&signal, TARGET_RATE as f32 / 48_000.0);

    let alias_converted = goertzel_power(&converted, TARGET_RATE, 4_000.0);
    let alias_naive = goertzel_power(&naive, TARGET_RATE, 4_000.0);
    assert!(
        alias_converted < alias_naive * 0.6,
        "aliasing not reduced (converted={alias_converted}, naive={alias_naive})"
    );
}

fn multi_tone_signal(tones: &[(f32, f32)], sample_rate: u32, samples: usize) -> Vec<f32> {
    (0..samples)
        .map(|n| {
            tones.iter().fold(0.0, |acc, (freq, amp)| {
                acc + amp * (2.0 * PI * freq * n as f32 / sample_rate as f32).sin()
            })
        })
        .collect()
}

fn goertzel_power(samples: &[f32], sample_rate: u32, target_hz: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let omega = 2.0 * PI * target_hz / sample_rate as f32;
    let coeff = 2.0 * omega.cos();
    let (mut q1, mut q2) = (0.0, 0.0);
    for &sample in samples {
        let q0 = coeff * q1 - q2 + sample;
        q2 = q1;
        q1 = q0;
    }
    ((q1 * q1 + q2 * q2 - coeff * q1 * q2) / samples.len() as f32).max(0.0)
}
