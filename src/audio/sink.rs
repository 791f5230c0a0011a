//! WAV output for accepted buffers.
//!
//! The write cursor is the byte offset of the next append within the PCM
//! payload. Appends are strictly sequential, so the cursor is also the payload
//! length once the file is finalized. Calling `append` twice with the same
//! buffer writes it twice; exactly-once delivery is the caller's job.

use super::error::CaptureError;
use super::format::CaptureFormat;
use hound::WavWriter;
use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

pub struct FileSink<W: Write + Seek> {
    writer: Option<WavWriter<W>>,
    cursor: u64,
    bytes_per_sample: usize,
    location: PathBuf,
}

/// Sink backed by a file on disk.
pub type WavFileSink = FileSink<BufWriter<File>>;

impl FileSink<BufWriter<File>> {
    /// Create `path` (truncating anything already there) and write the header.
    pub fn create(path: &Path, format: CaptureFormat) -> Result<Self, CaptureError> {
        ensure_pcm16(&format)?;
        let writer = WavWriter::create(path, format.to_wav_spec()).map_err(|err| {
            CaptureError::io(format!("failed to create '{}'", path.display()), err)
        })?;
        Ok(Self::from_writer(writer, &format, path.to_path_buf()))
    }
}

impl<W: Write + Seek> FileSink<W> {
    /// Wrap an arbitrary seekable writer; mostly useful for in-memory output.
    pub fn new(inner: W, format: CaptureFormat) -> Result<Self, CaptureError> {
        ensure_pcm16(&format)?;
        let writer = WavWriter::new(inner, format.to_wav_spec())
            .map_err(|err| CaptureError::io("failed to write WAV header", err))?;
        Ok(Self::from_writer(writer, &format, PathBuf::from("<memory>")))
    }

    fn from_writer(writer: WavWriter<W>, format: &CaptureFormat, location: PathBuf) -> Self {
        Self {
            writer: Some(writer),
            cursor: 0,
            bytes_per_sample: format.bytes_per_sample(),
            location,
        }
    }

    /// Append whole samples from `bytes` at the cursor.
    ///
    /// Returns the bytes written. On failure the cursor still covers every
    /// sample that made it out before the error; nothing is rolled back.
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize, CaptureError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(CaptureError::io(
                format!("'{}' is already closed", self.location.display()),
                hound::Error::IoError(io::Error::other("sink closed")),
            ));
        };
        let mut written = 0usize;
        for pair in bytes.chunks_exact(self.bytes_per_sample) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            if let Err(err) = writer.write_sample(sample) {
                self.cursor += written as u64;
                return Err(CaptureError::io(
                    format!(
                        "write at byte {} of '{}' failed",
                        self.cursor,
                        self.location.display()
                    ),
                    err,
                ));
            }
            written += self.bytes_per_sample;
        }
        self.cursor += written as u64;
        Ok(written)
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Finalize the header. Later calls are no-ops.
    pub fn close(&mut self) -> Result<(), CaptureError> {
        match self.writer.take() {
            Some(writer) => writer.finalize().map_err(|err| {
                CaptureError::io(
                    format!("failed to finalize '{}'", self.location.display()),
                    err,
                )
            }),
            None => Ok(()),
        }
    }
}

fn ensure_pcm16(format: &CaptureFormat) -> Result<(), CaptureError> {
    if format.is_pcm16() {
        Ok(())
    } else {
        Err(CaptureError::device(format!(
            "unsupported output format: {} bits, {} channels",
            format.bits_per_sample, format.channels
        )))
    }
}
