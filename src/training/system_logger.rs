// System metrics logger - step timing, throughput and GPU memory per training step

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::clock::{Clock, SystemClock};
use crate::config::TelemetryConfig;
use crate::errors::TelemetryError;
use crate::gpu::{self, GpuMemoryProbe};
use crate::metrics::{
    open_sink, EventFileWriter, ScalarSink, TAG_ELAPSED_TRAINING_TIME, TAG_GPU_ALLOCATED,
    TAG_GPU_MAX_ALLOCATED, TAG_GPU_RESERVED, TAG_SAMPLES_PER_SEC, TAG_STEP_TIME,
    TAG_TOTAL_TRAINING_TIME,
};

/// Records wall-clock deltas and GPU memory for one training run.
///
/// Expected call order is `start_training`, then any number of
/// `start_step`/`end_step` pairs, then `close`. Out-of-order calls are
/// tolerated: an `end_*` without its matching `start_*` writes nothing.
pub struct SystemMetricsLogger {
    sink: Box<dyn ScalarSink>,
    gpu: Box<dyn GpuMemoryProbe>,
    clock: Arc<dyn Clock>,
    step_start_time: Option<Instant>,
    train_start_time: Option<Instant>,
    train_end_time: Option<Instant>,
    closed: bool,
}

impl SystemMetricsLogger {
    /// TensorBoard event file in `log_dir`, GPU auto-detected
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self> {
        let sink = EventFileWriter::new(log_dir)?;
        let gpu = gpu::detect(Default::default(), 0)?;
        Ok(Self::with_parts(Box::new(sink), gpu))
    }

    pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
        config.validate()?;
        let sink = open_sink(config)?;
        let gpu = gpu::detect(config.gpu, config.gpu_device)?;
        Ok(Self::with_parts(sink, gpu))
    }

    /// Assemble from an explicit sink and probe, using the system clock
    pub fn with_parts(sink: Box<dyn ScalarSink>, gpu: Box<dyn GpuMemoryProbe>) -> Self {
        tracing::debug!(gpu = gpu.name(), "System metrics logger ready");
        Self {
            sink,
            gpu,
            clock: Arc::new(SystemClock),
            step_start_time: None,
            train_start_time: None,
            train_end_time: None,
            closed: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Mark the start of training. Calling again restarts the timer.
    pub fn start_training(&mut self) {
        self.train_start_time = Some(self.clock.now());
    }

    /// Log total training time at index 0. Returns the total in seconds, or
    /// None when training was never started.
    pub fn end_training(&mut self) -> Result<Option<f64>> {
        self.ensure_open()?;

        let now = self.clock.now();
        self.train_end_time = Some(now);

        let Some(start) = self.train_start_time else {
            return Ok(None);
        };

        let total = now.saturating_duration_since(start).as_secs_f64();
        self.sink.add_scalar(TAG_TOTAL_TRAINING_TIME, total, 0)?;
        tracing::info!(total_secs = total, "Total training time: {:.2} seconds", total);

        Ok(Some(total))
    }

    /// Mark the start of a step
    pub fn start_step(&mut self) {
        self.step_start_time = Some(self.clock.now());
    }

    /// Log step time, throughput, elapsed time and GPU memory at `step`
    pub fn end_step(&mut self, step: u64, batch_size: usize) -> Result<()> {
        self.ensure_open()?;

        let Some(step_start) = self.step_start_time else {
            return Ok(());
        };

        let now = self.clock.now();
        let step_time = now.saturating_duration_since(step_start).as_secs_f64();

        if batch_size > 0 {
            if step_time > 0.0 {
                self.sink
                    .add_scalar(TAG_SAMPLES_PER_SEC, batch_size as f64 / step_time, step)?;
            } else {
                tracing::warn!(step, "Zero step time, skipping throughput");
            }
        }
        self.sink.add_scalar(TAG_STEP_TIME, step_time, step)?;

        if let Some(train_start) = self.train_start_time {
            let elapsed = now.saturating_duration_since(train_start).as_secs_f64();
            self.sink.add_scalar(TAG_ELAPSED_TRAINING_TIME, elapsed, step)?;
        }

        if let Some(memory) = self.gpu.snapshot()? {
            self.sink.add_scalar(TAG_GPU_ALLOCATED, memory.allocated_gb(), step)?;
            self.sink.add_scalar(TAG_GPU_RESERVED, memory.reserved_gb(), step)?;
            self.sink
                .add_scalar(TAG_GPU_MAX_ALLOCATED, memory.max_allocated_gb(), step)?;
        }

        tracing::debug!(step, step_time, "Logged step metrics");
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.sink.flush()
    }

    /// Log total training time and close the sink. Later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            tracing::debug!("System metrics logger already closed");
            return Ok(());
        }

        let total = self.end_training();
        self.closed = true;
        let closed = self.sink.close();

        total?;
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Seconds between start and end of training, once both are recorded
    pub fn training_time(&self) -> Option<f64> {
        let start = self.train_start_time?;
        let end = self.train_end_time?;
        Some(end.saturating_duration_since(start).as_secs_f64())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TelemetryError::WriterClosed.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::NoGpu;
    use crate::metrics::MemorySink;
    use crate::training::ManualClock;

    fn logger() -> (SystemMetricsLogger, MemorySink, ManualClock) {
        let sink = MemorySink::new();
        let clock = ManualClock::new();
        let logger = SystemMetricsLogger::with_parts(Box::new(sink.clone()), Box::new(NoGpu))
            .with_clock(Arc::new(clock.clone()));
        (logger, sink, clock)
    }

    #[test]
    fn test_zero_step_time_skips_throughput_only() {
        let (mut logger, sink, _clock) = logger();
        logger.start_step();
        logger.end_step(1, 16).unwrap();

        assert!(sink.records_for(TAG_SAMPLES_PER_SEC).is_empty());
        assert_eq!(sink.records_for(TAG_STEP_TIME)[0].value, 0.0);
    }

    #[test]
    fn test_zero_batch_size_skips_throughput() {
        let (mut logger, sink, clock) = logger();
        logger.start_step();
        clock.advance_secs(0.5);
        logger.end_step(2, 0).unwrap();

        assert!(sink.records_for(TAG_SAMPLES_PER_SEC).is_empty());
        assert_eq!(sink.records_for(TAG_STEP_TIME)[0].value, 0.5);
    }

    #[test]
    fn test_training_time_available_after_end() {
        let (mut logger, _sink, clock) = logger();
        assert_eq!(logger.training_time(), None);
        logger.start_training();
        clock.advance_secs(3.0);
        assert_eq!(logger.end_training().unwrap(), Some(3.0));
        assert_eq!(logger.training_time(), Some(3.0));
    }

    #[test]
    fn test_restarting_training_resets_the_origin() {
        let (mut logger, sink, clock) = logger();
        logger.start_training();
        clock.advance_secs(10.0);
        logger.start_training();
        clock.advance_secs(2.0);
        logger.end_training().unwrap();

        assert_eq!(sink.records_for(TAG_TOTAL_TRAINING_TIME)[0].value, 2.0);
    }

    #[test]
    fn test_flush_after_close_is_rejected() {
        let (mut logger, sink, _clock) = logger();
        logger.flush().unwrap();
        logger.close().unwrap();
        assert!(logger.flush().is_err());
        assert_eq!(sink.flush_count(), 1);
    }
}
