// Trainscope - GPU and timing telemetry for training loops
// Library exports

pub mod config;
pub mod errors;
pub mod gpu; // Accelerator memory probes
pub mod logging;
pub mod metrics; // Scalar records and sinks (TensorBoard event files, JSONL)
pub mod training; // Metrics logger and trainer lifecycle callbacks

pub use config::TelemetryConfig;
pub use errors::TelemetryError;
pub use training::{GpuLoggingCallback, SystemMetricsLogger};
