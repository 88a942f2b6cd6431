// Metrics data types

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const TAG_TOTAL_TRAINING_TIME: &str = "System/Total_Training_Time_sec";
pub const TAG_STEP_TIME: &str = "System/Step_Time_sec";
pub const TAG_SAMPLES_PER_SEC: &str = "System/Samples_per_sec";
pub const TAG_ELAPSED_TRAINING_TIME: &str = "System/Elapsed_Training_Time_sec";
pub const TAG_GPU_ALLOCATED: &str = "GPU/Allocated_Memory_GB";
pub const TAG_GPU_RESERVED: &str = "GPU/Reserved_Memory_GB";
pub const TAG_GPU_MAX_ALLOCATED: &str = "GPU/Max_Memory_Allocated_GB";

/// One named measurement at a step index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub value: f64,
    /// Index on the dashboard x-axis (the global step, or 0 for run totals)
    pub step: u64,
    /// Seconds since the Unix epoch when the record was written
    pub wall_time: f64,
}

impl ScalarRecord {
    pub fn new(tag: impl Into<String>, value: f64, step: u64) -> Self {
        Self {
            tag: tag.into(),
            value,
            step,
            wall_time: wall_time_now(),
        }
    }
}

/// Current wall-clock time as fractional Unix seconds
pub fn wall_time_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1e6
}
