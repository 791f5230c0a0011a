use super::defaults::{
    MAX_BUFFER_COUNT, MAX_BUFFER_SECONDS, MAX_DEVICE_NAME_LEN, MAX_FANOUT_CAPACITY,
    MAX_RECORD_SECONDS, MIN_BUFFER_COUNT, MIN_BUFFER_SECONDS, MIN_GATE_THRESHOLD_DB,
    MIN_MAX_BUFFER_BYTES,
};
use super::AppConfig;
use crate::audio::MAX_BUFFER_BYTES;
use anyhow::{bail, Context, Result};
use std::{env, path::Path};

impl AppConfig {
    /// Check CLI values and normalize the output path.
    pub fn validate(&mut self) -> Result<()> {
        if !self.gate_threshold_db.is_finite()
            || !(MIN_GATE_THRESHOLD_DB..=0.0).contains(&self.gate_threshold_db)
        {
            bail!(
                "--gate-threshold-db must be between {MIN_GATE_THRESHOLD_DB} and 0.0 dB, got {}",
                self.gate_threshold_db
            );
        }
        if !(MIN_BUFFER_SECONDS..=MAX_BUFFER_SECONDS).contains(&self.buffer_seconds) {
            bail!(
                "--buffer-seconds must be between {MIN_BUFFER_SECONDS} and {MAX_BUFFER_SECONDS}, got {}",
                self.buffer_seconds
            );
        }
        if !(MIN_BUFFER_COUNT..=MAX_BUFFER_COUNT).contains(&self.buffer_count) {
            bail!(
                "--buffer-count must be between {MIN_BUFFER_COUNT} and {MAX_BUFFER_COUNT}, got {}",
                self.buffer_count
            );
        }
        if !(MIN_MAX_BUFFER_BYTES..=MAX_BUFFER_BYTES).contains(&self.max_buffer_bytes) {
            bail!(
                "--max-buffer-bytes must be between {MIN_MAX_BUFFER_BYTES} and {MAX_BUFFER_BYTES}, got {}",
                self.max_buffer_bytes
            );
        }
        if !(1..=MAX_RECORD_SECONDS).contains(&self.max_seconds) {
            bail!(
                "--max-seconds must be between 1 and {MAX_RECORD_SECONDS}, got {}",
                self.max_seconds
            );
        }
        if !(1..=MAX_FANOUT_CAPACITY).contains(&self.fanout_capacity) {
            bail!(
                "--fanout-capacity must be between 1 and {MAX_FANOUT_CAPACITY}, got {}",
                self.fanout_capacity
            );
        }

        if let Some(device) = &self.input_device {
            let trimmed = device.trim();
            if trimmed.is_empty()
                || trimmed.len() > MAX_DEVICE_NAME_LEN
                || trimmed.chars().any(char::is_control)
            {
                bail!(
                    "--input-device must be 1-{MAX_DEVICE_NAME_LEN} characters with no control characters"
                );
            }
            self.input_device = Some(trimmed.to_string());
        }

        self.output = normalize_output(&self.output)?;
        Ok(())
    }
}

/// Resolve the output path against the working directory and make sure its
/// parent exists; the file itself is created (or truncated) at start.
pub(super) fn normalize_output(path: &Path) -> Result<std::path::PathBuf> {
    if path.as_os_str().is_empty() {
        bail!("--output must not be empty");
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .context("failed to resolve current directory")?
            .join(path)
    };
    if absolute.is_dir() {
        bail!("--output {} is a directory", absolute.display());
    }
    let has_wav_extension = absolute
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
    if !has_wav_extension {
        bail!("--output must end in .wav, got {}", absolute.display());
    }
    let parent = absolute
        .parent()
        .context("--output has no parent directory")?;
    let parent = parent
        .canonicalize()
        .with_context(|| format!("--output directory {} does not exist", parent.display()))?;
    let file_name = absolute
        .file_name()
        .context("--output has no file name")?;
    Ok(parent.join(file_name))
}
