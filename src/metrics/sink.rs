// Scalar sinks - destinations for metrics records

use anyhow::{anyhow, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::event_file::EventFileWriter;
use super::types::ScalarRecord;
use crate::config::{SinkKind, TelemetryConfig};
use crate::errors::{log_dir_error, TelemetryError};

/// A metrics log that accepts named scalars at a step index
pub trait ScalarSink: Send {
    /// Append one record
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()>;

    /// Push buffered records to storage
    fn flush(&mut self) -> Result<()>;

    /// Flush and release the underlying resource. Calling twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Open the sink selected by the config
pub fn open_sink(config: &TelemetryConfig) -> Result<Box<dyn ScalarSink>> {
    let flush_interval = Duration::from_secs(config.flush_secs);
    let sink: Box<dyn ScalarSink> = match config.sink {
        SinkKind::Tensorboard => Box::new(EventFileWriter::with_flush_interval(
            &config.log_dir,
            flush_interval,
        )?),
        SinkKind::Jsonl => Box::new(JsonlSink::new(&config.log_dir)?),
    };
    Ok(sink)
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<ScalarRecord>,
    flushes: usize,
    closes: usize,
}

/// In-process sink; clones share one buffer so a caller can keep a handle
/// after moving the sink into a logger
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of every record written so far
    pub fn records(&self) -> Vec<ScalarRecord> {
        self.lock().records.clone()
    }

    /// Records with a given tag, in write order
    pub fn records_for(&self, tag: &str) -> Vec<ScalarRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.tag == tag)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    /// Number of times close() was called, including repeats
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }
}

impl ScalarSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        let mut state = self.lock();
        if state.closes > 0 {
            return Err(TelemetryError::WriterClosed.into());
        }
        state.records.push(ScalarRecord::new(tag, value, step));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.lock().flushes += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.lock().closes += 1;
        Ok(())
    }
}

/// Appends one JSON object per record to `<log_dir>/scalars.jsonl`
pub struct JsonlSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl JsonlSink {
    pub const FILE_NAME: &'static str = "scalars.jsonl";

    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self> {
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir).map_err(|e| anyhow!(log_dir_error(log_dir, &e.to_string())))?;

        let path = log_dir.join(Self::FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        tracing::info!(path = %path.display(), "Writing scalars as JSON lines");
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScalarSink for JsonlSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(TelemetryError::WriterClosed)?;
        serde_json::to_writer(&mut *writer, &ScalarRecord::new(tag, value, step))
            .context("Failed to serialize scalar record")?;
        writer
            .write_all(b"\n")
            .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        }
        Ok(())
    }
}

/// Parse a scalars.jsonl file back into records
pub fn read_jsonl(path: impl AsRef<Path>) -> Result<Vec<ScalarRecord>> {
    let path = path.as_ref();
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Bad record on line {} of {}", i + 1, path.display()))
        })
        .collect()
}
