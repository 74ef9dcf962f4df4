use std::fmt;

use sysinfo::{CpuRefreshKind, RefreshKind, System, MINIMUM_CPU_UPDATE_INTERVAL};

/// Mean utilization across all logical cores at one instant, in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UtilizationSample(f64);

impl UtilizationSample {
    pub fn new(percent: f64) -> Self {
        if percent.is_finite() {
            Self(percent.clamp(0.0, 100.0))
        } else {
            Self(0.0)
        }
    }

    /// Average of per-core usage figures; no cores means idle.
    pub fn from_cores(per_core: &[f32]) -> Self {
        if per_core.is_empty() {
            return Self(0.0);
        }
        let total: f64 = per_core.iter().map(|&u| u as f64).sum();
        Self::new(total / per_core.len() as f64)
    }

    pub fn percent(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for UtilizationSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

/// Source of utilization samples for the estimator.
pub trait LoadSampler: Send + Sync {
    fn sample_utilization(&self) -> UtilizationSample;
}

/// Samples the host through `sysinfo`. Holds no state between calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoSampler;

impl LoadSampler for SysinfoSampler {
    fn sample_utilization(&self) -> UtilizationSample {
        sample_utilization()
    }
}

/// Take a fresh utilization sample.
///
/// CPU usage is a delta between two refreshes, so this blocks for
/// `sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`.
pub fn sample_utilization() -> UtilizationSample {
    let mut sys = System::new_with_specifics(
        RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage()),
    );

    // Usage is the delta against the refresh done at construction
    std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu_usage();

    let per_core: Vec<f32> = sys.cpus().iter().map(|cpu| cpu.cpu_usage()).collect();
    let sample = UtilizationSample::from_cores(&per_core);
    log::debug!("utilization across {} cores: {}", per_core.len(), sample);
    sample
}

/// CPU brand as reported by `sysinfo`; used where CPUID is not available.
pub fn sysinfo_brand() -> Option<String> {
    let mut sys = System::new();
    sys.refresh_cpu_all();

    sys.cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|brand| !brand.is_empty())
}
