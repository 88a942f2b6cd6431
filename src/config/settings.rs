// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::TelemetryError;

/// Where scalar records are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// TensorBoard event file (events.out.tfevents.*)
    #[default]
    Tensorboard,
    /// One JSON object per line in scalars.jsonl
    Jsonl,
}

/// Which GPU memory probe to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GpuBackend {
    /// Use NVML when the driver loads, otherwise report no GPU
    #[default]
    Auto,
    /// Never emit GPU scalars
    None,
    /// Require NVML (logger construction fails without it)
    Nvml,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Directory for the metrics log
    pub log_dir: PathBuf,

    /// Samples per step, used for throughput (0 disables Samples_per_sec)
    pub batch_size: usize,

    /// Output format
    pub sink: SinkKind,

    /// GPU probe selection
    pub gpu: GpuBackend,

    /// Device index passed to the GPU probe
    pub gpu_device: u32,

    /// Seconds between automatic flushes of buffered records
    pub flush_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("runs/system_metrics"),
            batch_size: 0,
            sink: SinkKind::default(),
            gpu: GpuBackend::default(),
            gpu_device: 0,
            flush_secs: 120,
        }
    }
}

impl TelemetryConfig {
    pub fn new(log_dir: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            log_dir: log_dir.into(),
            batch_size,
            ..Self::default()
        }
    }

    pub fn with_sink(mut self, sink: SinkKind) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_gpu(mut self, gpu: GpuBackend) -> Self {
        self.gpu = gpu;
        self
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.log_dir.as_os_str().is_empty() {
            return Err(TelemetryError::InvalidConfig(
                "log_dir must not be empty".to_string(),
            ));
        }
        if self.flush_secs == 0 {
            return Err(TelemetryError::InvalidConfig(
                "flush_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
