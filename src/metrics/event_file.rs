// TensorBoard event file writer and reader

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::proto;
use super::sink::ScalarSink;
use super::tfrecord;
use super::types::{wall_time_now, ScalarRecord};
use crate::errors::{log_dir_error, TelemetryError};

const FILE_VERSION: &str = "brain.Event:2";

/// Per-process suffix so two writers opened in the same second get distinct files
static FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Appends scalar summaries to an `events.out.tfevents.*` file
pub struct EventFileWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    flush_interval: Duration,
    last_flush: Instant,
}

impl EventFileWriter {
    /// Create a writer that flushes at most every two minutes
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_flush_interval(log_dir, Duration::from_secs(120))
    }

    pub fn with_flush_interval(log_dir: impl AsRef<Path>, flush_interval: Duration) -> Result<Self> {
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir).map_err(|e| anyhow!(log_dir_error(log_dir, &e.to_string())))?;

        let path = log_dir.join(event_file_name());
        let file = File::create(&path)
            .with_context(|| format!("Failed to create event file: {}", path.display()))?;

        let mut writer = Self {
            path,
            writer: Some(BufWriter::new(file)),
            flush_interval,
            last_flush: Instant::now(),
        };

        writer.write_event(&proto::encode_file_version(wall_time_now(), FILE_VERSION))?;
        writer.flush()?;

        tracing::info!(path = %writer.path.display(), "Created event file");
        Ok(writer)
    }

    /// Location of the event file on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    fn write_event(&mut self, event: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(TelemetryError::WriterClosed)?;
        tfrecord::write_record(writer, event)
            .with_context(|| format!("Failed to write to {}", self.path.display()))?;

        if self.last_flush.elapsed() >= self.flush_interval {
            self.flush()?;
        }
        Ok(())
    }
}

impl ScalarSink for EventFileWriter {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        let step = i64::try_from(step).map_err(|_| TelemetryError::StepOutOfRange(step))?;
        let event = proto::encode_scalar(wall_time_now(), step, tag, value as f32);
        self.write_event(&event)
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        }
        self.last_flush = Instant::now();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        writer
            .get_ref()
            .sync_all()
            .with_context(|| format!("Failed to sync {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), "Closed event file");
        Ok(())
    }
}

impl Drop for EventFileWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to flush abandoned event file");
            }
        }
    }
}

/// `events.out.tfevents.<unix secs>.<host>.<pid>.<counter>`
fn event_file_name() -> String {
    let host = sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string());
    format!(
        "events.out.tfevents.{}.{}.{}.{}",
        Utc::now().timestamp(),
        host,
        std::process::id(),
        FILE_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Read every scalar summary from an event file
pub fn read_event_file(path: impl AsRef<Path>) -> Result<Vec<ScalarRecord>> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let mut scalars = Vec::new();
    for record in tfrecord::read_records(&bytes)? {
        let event = proto::decode_event(record)
            .with_context(|| format!("Malformed event in {}", path.display()))?;
        let step = u64::try_from(event.step)
            .map_err(|_| TelemetryError::NegativeStep(event.step))
            .with_context(|| format!("Malformed event in {}", path.display()))?;
        for (tag, value) in event.scalars {
            scalars.push(ScalarRecord {
                tag,
                value: value as f64,
                step,
                wall_time: event.wall_time,
            });
        }
    }

    Ok(scalars)
}

/// Event files in `log_dir`, oldest name first
pub fn find_event_files(log_dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let log_dir = log_dir.as_ref();
    let mut files = Vec::new();

    for entry in fs::read_dir(log_dir)
        .with_context(|| format!("Failed to list {}", log_dir.display()))?
    {
        let path = entry?.path();
        let is_event_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("events.out.tfevents."))
            .unwrap_or(false);
        if is_event_file {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_file_holds_only_version_event() {
        let temp_dir = TempDir::new().unwrap();
        let writer = EventFileWriter::new(temp_dir.path()).unwrap();

        let bytes = fs::read(writer.path()).unwrap();
        let records = tfrecord::read_records(&bytes).unwrap();
        assert_eq!(records.len(), 1);

        let event = proto::decode_event(records[0]).unwrap();
        assert_eq!(event.file_version.as_deref(), Some(FILE_VERSION));
    }

    #[test]
    fn test_two_writers_in_one_dir_get_distinct_files() {
        let temp_dir = TempDir::new().unwrap();
        let a = EventFileWriter::new(temp_dir.path()).unwrap();
        let b = EventFileWriter::new(temp_dir.path()).unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(find_event_files(temp_dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_write_after_close_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = EventFileWriter::new(temp_dir.path()).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(writer.is_closed());

        let err = writer.add_scalar("loss", 1.0, 1).unwrap_err();
        assert_eq!(
            err.downcast_ref::<TelemetryError>(),
            Some(&TelemetryError::WriterClosed)
        );
    }

    #[test]
    fn test_zero_flush_interval_writes_through() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer =
            EventFileWriter::with_flush_interval(temp_dir.path(), Duration::ZERO).unwrap();
        writer.add_scalar("loss", 0.5, 3).unwrap();

        // Still open, but the record is already on disk
        let scalars = read_event_file(writer.path()).unwrap();
        assert_eq!(scalars.len(), 1);
        assert_eq!(scalars[0].step, 3);
    }

    #[test]
    fn test_step_beyond_int64_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = EventFileWriter::new(temp_dir.path()).unwrap();

        let largest = i64::MAX as u64;
        writer.add_scalar("loss", 1.0, largest).unwrap();
        let err = writer.add_scalar("loss", 1.0, largest + 1).unwrap_err();
        assert_eq!(
            err.downcast_ref::<TelemetryError>(),
            Some(&TelemetryError::StepOutOfRange(largest + 1))
        );
        writer.close().unwrap();

        // The rejected record never reached the file
        let scalars = read_event_file(writer.path()).unwrap();
        assert_eq!(scalars.len(), 1);
        assert_eq!(scalars[0].step, largest);
    }

    #[test]
    fn test_negative_step_on_disk_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.out.tfevents.0.host.1.0");
        let mut file = File::create(&path).unwrap();
        tfrecord::write_record(&mut file, &proto::encode_scalar(0.0, -5, "loss", 1.0)).unwrap();
        drop(file);

        let err = read_event_file(&path).unwrap_err();
        assert_eq!(
            err.downcast_ref::<TelemetryError>(),
            Some(&TelemetryError::NegativeStep(-5))
        );
    }
}
