// GPU memory probes
//
// The metrics logger never talks to a driver directly. It asks a probe for a
// snapshot and skips the GPU scalars when the probe reports no device.
// Probes are built once per run by `detect`; snapshots are in-process
// library calls.

#[cfg(feature = "nvidia")]
mod nvml;

use anyhow::Result;

use crate::config::GpuBackend;
#[cfg(not(feature = "nvidia"))]
use crate::errors::TelemetryError;

#[cfg(feature = "nvidia")]
pub use nvml::NvmlProbe;

const BYTES_PER_GB: f64 = 1e9;

/// Memory counters for one device, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuMemorySnapshot {
    pub allocated_bytes: u64,
    pub reserved_bytes: u64,
    pub max_allocated_bytes: u64,
}

impl GpuMemorySnapshot {
    pub fn allocated_gb(&self) -> f64 {
        self.allocated_bytes as f64 / BYTES_PER_GB
    }

    pub fn reserved_gb(&self) -> f64 {
        self.reserved_bytes as f64 / BYTES_PER_GB
    }

    pub fn max_allocated_gb(&self) -> f64 {
        self.max_allocated_bytes as f64 / BYTES_PER_GB
    }
}

/// Source of accelerator memory counters
pub trait GpuMemoryProbe: Send {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Current counters, or None when no device is present
    fn snapshot(&mut self) -> Result<Option<GpuMemorySnapshot>>;
}

/// Probe for hosts without an accelerator
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGpu;

impl GpuMemoryProbe for NoGpu {
    fn name(&self) -> &str {
        "none"
    }

    fn snapshot(&mut self) -> Result<Option<GpuMemorySnapshot>> {
        Ok(None)
    }
}

/// Running maximum of observed allocations
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakTracker {
    peak: u64,
}

impl PeakTracker {
    /// Record a reading and return the peak so far
    pub fn observe(&mut self, bytes: u64) -> u64 {
        self.peak = self.peak.max(bytes);
        self.peak
    }

    pub fn peak(&self) -> u64 {
        self.peak
    }
}

/// Bytes used by `pid` in a driver process list of `(pid, used bytes)`.
/// Entries whose usage the driver cannot report count as zero.
pub fn process_memory_bytes(processes: &[(u32, Option<u64>)], pid: u32) -> u64 {
    processes
        .iter()
        .filter(|(p, _)| *p == pid)
        .filter_map(|(_, used)| *used)
        .sum()
}

/// Build the probe for the configured backend
pub fn detect(backend: GpuBackend, device: u32) -> Result<Box<dyn GpuMemoryProbe>> {
    match backend {
        GpuBackend::None => Ok(Box::new(NoGpu)),
        GpuBackend::Nvml => nvml_probe(device),
        GpuBackend::Auto => match nvml_probe(device) {
            Ok(probe) => Ok(probe),
            Err(e) => {
                tracing::debug!(error = %e, "No GPU detected, skipping GPU memory scalars");
                Ok(Box::new(NoGpu))
            }
        },
    }
}

#[cfg(feature = "nvidia")]
fn nvml_probe(device: u32) -> Result<Box<dyn GpuMemoryProbe>> {
    Ok(Box::new(NvmlProbe::new(device)?))
}

#[cfg(not(feature = "nvidia"))]
fn nvml_probe(_device: u32) -> Result<Box<dyn GpuMemoryProbe>> {
    Err(TelemetryError::GpuQuery("built without the `nvidia` feature".to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gigabytes_are_decimal() {
        let snapshot = GpuMemorySnapshot {
            allocated_bytes: 2_500_000_000,
            reserved_bytes: 4_000_000_000,
            max_allocated_bytes: 3_000_000_000,
        };
        assert_eq!(snapshot.allocated_gb(), 2.5);
        assert_eq!(snapshot.reserved_gb(), 4.0);
        assert_eq!(snapshot.max_allocated_gb(), 3.0);
    }

    #[test]
    fn test_no_gpu_never_reports_a_device() {
        let mut probe = NoGpu;
        assert_eq!(probe.snapshot().unwrap(), None);
        assert_eq!(detect(GpuBackend::None, 0).unwrap().name(), "none");
    }

    #[test]
    fn test_peak_survives_lower_readings() {
        let mut peak = PeakTracker::default();
        assert_eq!(peak.observe(100), 100);
        assert_eq!(peak.observe(400), 400);
        assert_eq!(peak.observe(250), 400);
        assert_eq!(peak.observe(0), 400);
        assert_eq!(peak.peak(), 400);
    }

    #[test]
    fn test_process_memory_filters_by_pid() {
        let processes = [(1001, Some(512)), (2002, Some(2048)), (1001, Some(256))];
        assert_eq!(process_memory_bytes(&processes, 1001), 768);
        assert_eq!(process_memory_bytes(&processes, 2002), 2048);
        assert_eq!(process_memory_bytes(&processes, 3003), 0);
    }

    #[test]
    fn test_unavailable_usage_counts_as_zero() {
        let processes = [(1001, None), (1001, Some(64))];
        assert_eq!(process_memory_bytes(&processes, 1001), 64);
        assert_eq!(process_memory_bytes(&[], 1001), 0);
    }

    #[cfg(not(feature = "nvidia"))]
    #[test]
    fn test_auto_falls_back_without_nvml() {
        assert_eq!(detect(GpuBackend::Auto, 0).unwrap().name(), "none");
        let err = detect(GpuBackend::Nvml, 0).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<TelemetryError>(),
            Some(TelemetryError::GpuQuery(_))
        ));
    }
}
