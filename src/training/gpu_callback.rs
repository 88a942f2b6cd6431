// Trainer callback that feeds lifecycle events to the system metrics logger

use anyhow::Result;
use std::path::Path;

use super::callback::{TrainerCallback, TrainerControl, TrainerState, TrainingArgs};
use super::system_logger::SystemMetricsLogger;
use crate::config::TelemetryConfig;

pub struct GpuLoggingCallback {
    logger: SystemMetricsLogger,
    batch_size: usize,
}

impl GpuLoggingCallback {
    pub fn new(log_dir: impl AsRef<Path>, batch_size: usize) -> Result<Self> {
        Ok(Self::with_logger(SystemMetricsLogger::new(log_dir)?, batch_size))
    }

    pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
        Ok(Self::with_logger(
            SystemMetricsLogger::from_config(config)?,
            config.batch_size,
        ))
    }

    pub fn with_logger(logger: SystemMetricsLogger, batch_size: usize) -> Self {
        Self { logger, batch_size }
    }

    pub fn logger(&self) -> &SystemMetricsLogger {
        &self.logger
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl TrainerCallback for GpuLoggingCallback {
    fn name(&self) -> &str {
        "GpuLoggingCallback"
    }

    fn on_train_begin(
        &mut self,
        _args: &TrainingArgs,
        _state: &TrainerState,
        _control: &mut TrainerControl,
    ) -> Result<()> {
        self.logger.start_training();
        Ok(())
    }

    fn on_step_begin(
        &mut self,
        _args: &TrainingArgs,
        _state: &TrainerState,
        _control: &mut TrainerControl,
    ) -> Result<()> {
        self.logger.start_step();
        Ok(())
    }

    fn on_step_end(
        &mut self,
        _args: &TrainingArgs,
        state: &TrainerState,
        _control: &mut TrainerControl,
    ) -> Result<()> {
        self.logger.end_step(state.global_step, self.batch_size)
    }

    fn on_train_end(
        &mut self,
        _args: &TrainingArgs,
        _state: &TrainerState,
        _control: &mut TrainerControl,
    ) -> Result<()> {
        // Logs total training time and closes the writer
        self.logger.close()
    }
}
