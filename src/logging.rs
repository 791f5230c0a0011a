use crate::config::AppConfig;
use std::{
    env, fs,
    io::Write,
    panic,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, OnceLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};

const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const CRASH_LOG_MAX_BYTES: u64 = 256 * 1024;
static LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_STATE: OnceLock<Mutex<LogState>> = OnceLock::new();

/// Debug log in the temp dir, truncated when it grows past its cap.
pub fn log_file_path() -> PathBuf {
    env::temp_dir().join("gatekeep.log")
}

/// Crash log (location and version only).
pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("gatekeep_crash.log")
}

struct LogWriter {
    path: PathBuf,
    file: fs::File,
    max_bytes: u64,
    bytes_written: u64,
}

impl LogWriter {
    fn new(path: PathBuf, max_bytes: u64) -> Option<Self> {
        let mut bytes_written = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if bytes_written > max_bytes {
            let _ = fs::remove_file(&path);
            bytes_written = 0;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;
        Some(Self {
            path,
            file,
            max_bytes,
            bytes_written,
        })
    }

    fn write_line(&mut self, line: &str) {
        if self.bytes_written.saturating_add(line.len() as u64) > self.max_bytes {
            if let Ok(file) = truncate(&self.path) {
                self.file = file;
                self.bytes_written = 0;
            }
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.bytes_written = self.bytes_written.saturating_add(line.len() as u64);
        }
    }
}

fn truncate(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

#[derive(Default)]
struct LogState {
    writer: Option<LogWriter>,
}

fn log_state() -> &'static Mutex<LogState> {
    LOG_STATE.get_or_init(|| Mutex::new(LogState::default()))
}

fn set_log_target(enabled: bool, path: PathBuf) {
    LOG_ENABLED.store(enabled, Ordering::Relaxed);
    let mut state = log_state()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    state.writer = if enabled {
        LogWriter::new(path, LOG_MAX_BYTES)
    } else {
        None
    };
}

/// Configure logging based on CLI flags or environment.
pub fn init_logging(config: &AppConfig) {
    set_log_target(config.logging_enabled(), log_file_path());
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn format_line(msg: &str) -> String {
    format!("[{}] {msg}\n", timestamp())
}

/// Append a line to the debug log. Capture threads call this, so it never
/// panics and never blocks on anything but the log mutex.
pub fn log_debug(msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let line = format_line(msg);
    let mut state = log_state()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(writer) = state.writer.as_mut() {
        writer.write_line(&line);
    }
}

/// Panic hook body: record where it happened, never the payload.
pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let line = format!(
        "[{}] panic at {location} (v{})\n",
        timestamp(),
        env!("CARGO_PKG_VERSION")
    );
    if let Some(mut writer) = LogWriter::new(crash_log_path(), CRASH_LOG_MAX_BYTES) {
        writer.write_line(&line);
    }
}
