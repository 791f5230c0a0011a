use anyhow::Result;
use gatekeep::audio::{CaptureFormat, CpalDevice, SessionReport};
use serde::Serialize;

/// Why the CLI stopped listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum StopReason {
    GateEnded,
    TimeLimit,
    Interrupted,
}

impl StopReason {
    pub(crate) fn label(self) -> &'static str {
        match self {
            StopReason::GateEnded => "speech ended",
            StopReason::TimeLimit => "time limit reached",
            StopReason::Interrupted => "capture interrupted",
        }
    }
}

#[derive(Serialize)]
struct CliReport<'a> {
    stop_reason: StopReason,
    seconds_written: f64,
    #[serde(flatten)]
    report: &'a SessionReport,
}

fn seconds_written(report: &SessionReport, format: &CaptureFormat) -> f64 {
    let bytes_per_second = f64::from(format.sample_rate) * format.bytes_per_frame() as f64;
    if bytes_per_second <= 0.0 {
        return 0.0;
    }
    report.bytes_written as f64 / bytes_per_second
}

pub(crate) fn render_report_json(
    report: &SessionReport,
    reason: StopReason,
    format: &CaptureFormat,
) -> Result<String> {
    let payload = CliReport {
        stop_reason: reason,
        seconds_written: seconds_written(report, format),
        report,
    };
    Ok(serde_json::to_string_pretty(&payload)?)
}

pub(crate) fn render_report_text(
    report: &SessionReport,
    reason: StopReason,
    format: &CaptureFormat,
) -> String {
    let mut lines = vec![
        format!("Stopped: {}", reason.label()),
        format!(
            "Wrote {:.2} s ({} bytes) to {}",
            seconds_written(report, format),
            report.bytes_written,
            report.output.display()
        ),
        format!(
            "Buffers: {} delivered, {} kept, {} skipped (gate {})",
            report.buffers_delivered,
            report.buffers_accepted,
            report.buffers_rejected,
            report.gate_state.label()
        ),
    ];
    if report.fanout_dropped > 0 || report.device_dropped_frames > 0 {
        lines.push(format!(
            "Dropped: {} display blocks, {} device frames",
            report.fanout_dropped, report.device_dropped_frames
        ));
    }
    if report.write_errors > 0 {
        lines.push(format!(
            "Write errors: {} (last: {})",
            report.write_errors,
            report.last_write_error.as_deref().unwrap_or("unknown")
        ));
    }
    lines.join("\n")
}

pub(crate) fn list_input_devices() -> Result<()> {
    // Support GATEKEEP_TEST_DEVICES for testing
    let devices = if let Ok(raw) = std::env::var("GATEKEEP_TEST_DEVICES") {
        parse_device_list(&raw)
    } else {
        CpalDevice::list_devices().unwrap_or_else(|err| {
            eprintln!("Failed to list audio input devices: {err}");
            Vec::new()
        })
    };

    if devices.is_empty() {
        println!("No audio input devices detected.");
    } else {
        println!("Available audio input devices:");
        for name in devices {
            println!("  - {name}");
        }
    }
    Ok(())
}

fn parse_device_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
