//! cpuclock: host CPU clock reporting.
//!
//! Reports the current, base and maximum CPU frequency in GHz. Each value is
//! probed from the best source the platform offers:
//!   - Windows: PDH `% Processor Performance`, WMI clock speeds, registry
//!   - Linux: cpufreq sysfs nodes, `/proc/cpuinfo`
//!   - macOS: `sysctl hw.cpufrequency*`
//!   - everywhere: CPU brand string and CPUID leaf 0x16
//!
//! When every source fails, documented defaults and a load-based estimate
//! take over, so the three reporting functions never fail.
//!
//! ```no_run
//! let monitor = cpuclock::Monitor::new();
//! println!(
//!     "{:.2} GHz (base {:.2}, max {:.2})",
//!     cpuclock::get_current_cpu_frequency(&monitor),
//!     cpuclock::get_cpu_base_frequency(&monitor),
//!     cpuclock::get_cpu_max_frequency(&monitor),
//! );
//! ```

pub mod config;
pub mod system;

pub use config::MonitorConfig;
pub use system::cpu::{FrequencySource, FrequencyValue, ProbeResult, Unavailable};
pub use system::estimator::estimate_current;
pub use system::monitor::{FrequencyReading, Monitor, ReadingOrigin};
pub use system::probe::{detect_probe, FrequencyProbe, Platform};
pub use system::sampler::{sample_utilization, LoadSampler, UtilizationSample};

/// Current clock in GHz, inside `(0.1, 10.0]`.
pub fn get_current_cpu_frequency(monitor: &Monitor) -> FrequencyValue {
    monitor.current()
}

/// Nominal clock in GHz; fixed after the first call.
pub fn get_cpu_base_frequency(monitor: &Monitor) -> FrequencyValue {
    monitor.base()
}

/// Turbo ceiling in GHz, never below the base clock.
pub fn get_cpu_max_frequency(monitor: &Monitor) -> FrequencyValue {
    monitor.max()
}
