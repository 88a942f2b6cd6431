// Error types and user-facing error messages
//
// Fallible operations return anyhow::Result. Conditions a caller may want
// to match on are raised as TelemetryError and can be recovered with
// `err.downcast_ref::<TelemetryError>()`.

use std::path::Path;
use thiserror::Error;

/// Errors raised by the telemetry layer
#[derive(Debug, Error, PartialEq)]
pub enum TelemetryError {
    /// A record was written after the sink was closed
    #[error("metrics writer is already closed")]
    WriterClosed,

    /// Configuration failed validation
    #[error("invalid telemetry config: {0}")]
    InvalidConfig(String),

    /// The GPU driver could not be loaded or queried
    #[error("GPU memory query failed: {0}")]
    GpuQuery(String),

    /// An event file record failed framing or checksum validation
    #[error("corrupt event record at byte {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    /// Event files store steps as int64
    #[error("step {0} exceeds the int64 range of event files")]
    StepOutOfRange(u64),

    /// An event file carried a step below zero
    #[error("event file holds negative step {0}")]
    NegativeStep(i64),
}

/// Format a log directory creation error with helpful suggestions
pub fn log_dir_error(path: &Path, error: &str) -> String {
    format!(
        "Could not prepare metrics log directory: {}\n\n\
        \x1b[1;33mError:\x1b[0m {}\n\n\
        \x1b[1;33mPossible causes:\x1b[0m\n\
        • Parent directory not writable\n\
        • A file already exists at that path\n\
        • Disk is full\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Check the parent directory:\n\
           \x1b[36mls -la $(dirname \"{}\")\x1b[0m\n\n\
        2. Point log_dir somewhere writable in the telemetry config",
        path.display(),
        error,
        path.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_error_mentions_path_and_cause() {
        let msg = log_dir_error(Path::new("/read-only/runs"), "permission denied");
        assert!(msg.contains("/read-only/runs"));
        assert!(msg.contains("permission denied"));
        assert!(msg.contains("log_dir"));
    }

    #[test]
    fn test_telemetry_error_survives_anyhow_round_trip() {
        let err: anyhow::Error = TelemetryError::WriterClosed.into();
        assert_eq!(
            err.downcast_ref::<TelemetryError>(),
            Some(&TelemetryError::WriterClosed)
        );
        assert_eq!(err.to_string(), "metrics writer is already closed");
    }
}
