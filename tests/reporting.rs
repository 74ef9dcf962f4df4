use std::sync::atomic::{AtomicU64, Ordering};

use cpuclock::{
    estimate_current, get_cpu_base_frequency, get_cpu_max_frequency, get_current_cpu_frequency,
    FrequencyProbe, FrequencySource, FrequencyValue, LoadSampler, Monitor, MonitorConfig,
    ProbeResult, Unavailable, UtilizationSample,
};

/// A host where nothing can be read: no counters, no management
/// interface, no filesystem nodes, no identification registers.
struct BarrenHost;

impl FrequencyProbe for BarrenHost {
    fn name(&self) -> &'static str {
        "barren"
    }

    fn probe_base(&self) -> ProbeResult {
        ProbeResult::Unavailable(Unavailable::Unsupported)
    }

    fn probe_max(&self, _base: FrequencyValue) -> ProbeResult {
        ProbeResult::Unavailable(Unavailable::Missing("cpu brand string"))
    }

    fn probe_current(&self, _base: FrequencyValue) -> ProbeResult {
        ProbeResult::Unavailable(Unavailable::Unsupported)
    }
}

/// Utilization that changes on every sample.
struct RisingLoad(AtomicU64);

impl LoadSampler for RisingLoad {
    fn sample_utilization(&self) -> UtilizationSample {
        let step = self.0.fetch_add(25, Ordering::SeqCst);
        UtilizationSample::new(step as f64)
    }
}

#[test]
fn test_barren_host_reports_defaults() {
    let monitor = Monitor::with_parts(
        Box::new(BarrenHost),
        Box::new(RisingLoad(AtomicU64::new(25))),
        MonitorConfig::default(),
    );

    assert_eq!(get_cpu_base_frequency(&monitor), 2.0);
    assert!((get_cpu_max_frequency(&monitor) - 2.6).abs() < 1e-9);
    assert_eq!(monitor.base_source(), Some(FrequencySource::Default));

    let current = get_current_cpu_frequency(&monitor);
    assert!(current > 0.0);
    assert!((current - estimate_current(2.0, 2.6, 25.0)).abs() < 1e-9);

    // Within the sticky window the first estimate stands
    assert_eq!(get_current_cpu_frequency(&monitor), current);
}

#[test]
fn test_barren_host_reestimates_without_stickiness_window() {
    let config = MonitorConfig {
        sticky_max_age: Some(std::time::Duration::ZERO),
        ..MonitorConfig::default()
    };
    let monitor = Monitor::with_parts(
        Box::new(BarrenHost),
        Box::new(RisingLoad(AtomicU64::new(0))),
        config,
    );

    let first = get_current_cpu_frequency(&monitor);
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = get_current_cpu_frequency(&monitor);
    assert_eq!(first, 2.0);
    assert!(second > first);
}

#[test]
fn test_live_host_invariants() {
    let monitor = Monitor::new();

    let base = get_cpu_base_frequency(&monitor);
    let max = get_cpu_max_frequency(&monitor);
    let current = get_current_cpu_frequency(&monitor);

    assert!(base > 0.0);
    assert!(max >= base);
    assert!(current > 0.1 && current <= 10.0, "current = {}", current);
    assert_eq!(get_cpu_base_frequency(&monitor), base);
    assert_eq!(get_cpu_max_frequency(&monitor), max);
}
