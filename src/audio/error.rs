use thiserror::Error;

/// Failures surfaced by the capture pipeline.
///
/// Metering failures are not represented here: a missing level reading is an
/// absent gate input, not an error.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The audio category could not be activated, so nothing was prepared.
    #[error("audio category '{category}' could not be activated: {reason}")]
    Permission {
        category: &'static str,
        reason: String,
    },

    /// Queue creation, buffer allocation, or stream control failed.
    #[error("capture device error: {0}")]
    Device(String),

    /// Output file create/write/finalize failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: hound::Error,
    },
}

impl CaptureError {
    pub(crate) fn device(msg: impl Into<String>) -> Self {
        CaptureError::Device(msg.into())
    }

    pub(crate) fn io(context: impl Into<String>, source: hound::Error) -> Self {
        CaptureError::Io {
            context: context.into(),
            source,
        }
    }

    /// Short machine-readable label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            CaptureError::Permission { .. } => "permission",
            CaptureError::Device(_) => "device",
            CaptureError::Io { .. } => "io",
        }
    }
}
