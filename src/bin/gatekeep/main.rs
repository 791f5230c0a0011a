//! gatekeep: record one spoken take from the microphone.
//!
//! Listens until the level crosses the gate threshold, records while it stays
//! above, and stops at the first quiet buffer or when `--max-seconds` runs out.

mod cli_utils;
mod level_bar;

use anyhow::{Context, Result};
use clap::Parser;
use cli_utils::{list_input_devices, render_report_json, render_report_text, StopReason};
use crossbeam_channel::{bounded, RecvTimeoutError};
use gatekeep::audio::{
    rms_db, CaptureDevice, CaptureSession, CpalDevice, LiveMeter, SampleCallback,
    SessionConfig, SessionObservers,
};
use gatekeep::config::AppConfig;
use gatekeep::{init_logging, init_tracing, log_debug, log_file_path, log_panic};
use std::io::{self, IsTerminal, Write};
use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Redraw the level line every Nth decoded block (20 ms each).
const LEVEL_REDRAW_EVERY: usize = 5;

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        log_panic(info);
        previous(info);
    }));
}

fn level_display(threshold_db: f32, meter: LiveMeter) -> SampleCallback {
    if !io::stderr().is_terminal() {
        return Arc::new(|_: &[f32], _: u32| {});
    }
    let blocks = AtomicUsize::new(0);
    Arc::new(move |samples: &[f32], _count: u32| {
        if blocks.fetch_add(1, Ordering::Relaxed) % LEVEL_REDRAW_EVERY != 0 {
            return;
        }
        let line = level_bar::format_level_line(rms_db(samples), threshold_db);
        let mut stderr = io::stderr().lock();
        let _ = write!(stderr, "\r{line}  gate {:>4.0} dB", meter.level_db());
        let _ = stderr.flush();
    })
}

fn main() -> Result<()> {
    let mut config = AppConfig::parse();
    if config.list_input_devices {
        list_input_devices()?;
        return Ok(());
    }

    config.validate()?;
    init_logging(&config);
    init_tracing(&config);
    install_panic_hook();
    log_debug("=== gatekeep started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    let device = CpalDevice::new(config.input_device.as_deref())
        .context("failed to open audio input device")?;
    let device_name = device.name();

    let (ended_tx, ended_rx) = bounded::<()>(1);
    let meter = LiveMeter::new();
    let observers = SessionObservers::new(
        level_display(config.gate_threshold_db as f32, meter.clone()),
        Arc::new(move || {
            let _ = ended_tx.try_send(());
        }),
    );
    let mut session = CaptureSession::new(
        device,
        SessionConfig::from(&config),
        config.output.clone(),
        observers,
    )
    .with_live_meter(meter);

    session
        .start()
        .with_context(|| format!("failed to start capture on '{device_name}'"))?;
    eprintln!(
        "Listening on '{device_name}' (gate {:.0} dB, limit {} s). Speak to start recording.",
        config.gate_threshold_db, config.max_seconds
    );

    let reason = match ended_rx.recv_timeout(Duration::from_secs(config.max_seconds)) {
        Ok(()) => StopReason::GateEnded,
        Err(RecvTimeoutError::Timeout) => StopReason::TimeLimit,
        Err(RecvTimeoutError::Disconnected) => StopReason::Interrupted,
    };
    log_debug(&format!("stopping capture: {}", reason.label()));

    let format = session.format();
    let report = session
        .stop()
        .context("failed to finalize recording")?
        .unwrap_or_default();
    if io::stderr().is_terminal() {
        eprintln!();
    }

    if config.json {
        println!("{}", render_report_json(&report, reason, &format)?);
    } else {
        println!("{}", render_report_text(&report, reason, &format));
    }
    Ok(())
}
