// NVIDIA memory probe backed by NVML
//
// allocated     = memory held by this process on the device
// reserved      = memory in use on the device by all processes
// max_allocated = highest `allocated` this probe has observed

use anyhow::Result;
use nvml_wrapper::enums::device::UsedGpuMemory;
use nvml_wrapper::Nvml;

use super::{process_memory_bytes, GpuMemoryProbe, GpuMemorySnapshot, PeakTracker};
use crate::errors::TelemetryError;

pub struct NvmlProbe {
    nvml: Nvml,
    device: u32,
    pid: u32,
    peak: PeakTracker,
}

impl NvmlProbe {
    /// Load the driver library and check that `device` exists
    pub fn new(device: u32) -> Result<Self> {
        let nvml = Nvml::init()
            .map_err(|e| TelemetryError::GpuQuery(format!("NVML init failed: {}", e)))?;

        let name = nvml
            .device_by_index(device)
            .and_then(|d| d.name())
            .map_err(|e| TelemetryError::GpuQuery(format!("GPU {} unavailable: {}", device, e)))?;
        tracing::info!(device, name = %name, "NVML ready, GPU memory will be logged");

        Ok(Self {
            nvml,
            device,
            pid: std::process::id(),
            peak: PeakTracker::default(),
        })
    }
}

impl GpuMemoryProbe for NvmlProbe {
    fn name(&self) -> &str {
        "nvml"
    }

    fn snapshot(&mut self) -> Result<Option<GpuMemorySnapshot>> {
        let query_error = |e: nvml_wrapper::error::NvmlError| TelemetryError::GpuQuery(e.to_string());

        let device = self.nvml.device_by_index(self.device).map_err(query_error)?;
        let memory = device.memory_info().map_err(query_error)?;
        let processes: Vec<(u32, Option<u64>)> = device
            .running_compute_processes()
            .map_err(query_error)?
            .into_iter()
            .map(|p| {
                let used = match p.used_gpu_memory {
                    UsedGpuMemory::Used(bytes) => Some(bytes),
                    UsedGpuMemory::Unavailable => None,
                };
                (p.pid, used)
            })
            .collect();

        let allocated_bytes = process_memory_bytes(&processes, self.pid);
        Ok(Some(GpuMemorySnapshot {
            allocated_bytes,
            reserved_bytes: memory.used,
            max_allocated_bytes: self.peak.observe(allocated_bytes),
        }))
    }
}
