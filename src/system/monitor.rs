//! Frequency cache: resolves base/max once, arbitrates current readings
//! between live probes, the last accepted value and the estimator.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Local};

use crate::config::{MonitorConfig, DEFAULT_BASE_GHZ};
use crate::system::cpu::{
    in_current_window, FrequencySource, FrequencyValue, ProbeResult, MAX_PLAUSIBLE_GHZ,
};
use crate::system::estimator::estimate_current;
use crate::system::probe::{detect_probe, FrequencyProbe};
use crate::system::sampler::{LoadSampler, SysinfoSampler};

/// Where a current-frequency reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadingOrigin {
    /// A live platform probe.
    #[default]
    Probe,
    /// The last accepted reading, reused because the probe failed.
    Cache,
    /// The load-based estimator.
    Estimate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyReading {
    pub ghz: FrequencyValue,
    pub origin: ReadingOrigin,
    pub measured_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Resolved {
    ghz: FrequencyValue,
    source: FrequencySource,
}

#[derive(Debug, Default)]
struct MonitorState {
    /// Never recomputed once set.
    base_frequency: Option<Resolved>,
    max_frequency: Option<Resolved>,
    /// 0 until the first accepted reading.
    current_frequency: FrequencyValue,
    current_origin: ReadingOrigin,
    last_measured_at: Option<Instant>,
    last_measured_wall: Option<DateTime<Local>>,
}

/// Host CPU frequency monitor. Create one per process and share it by reference.
///
/// The state lock is only held to copy values in or out; probes and
/// utilization samples always run without it.
pub struct Monitor {
    probe: Box<dyn FrequencyProbe>,
    sampler: Box<dyn LoadSampler>,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
}

impl Monitor {
    /// Monitor for the host platform with default settings.
    pub fn new() -> Self {
        Self::with_config(MonitorConfig::default())
    }

    pub fn with_config(config: MonitorConfig) -> Self {
        let probe = detect_probe(config.counter_sample_delay);
        Self::with_parts(probe, Box::new(SysinfoSampler), config)
    }

    /// Assemble a monitor from explicit parts, e.g. substitute probes in tests.
    pub fn with_parts(
        probe: Box<dyn FrequencyProbe>,
        sampler: Box<dyn LoadSampler>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            probe,
            sampler,
            config,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn probe_name(&self) -> &'static str {
        self.probe.name()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        // Every write is a whole-field assignment, so a poisoned guard is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Base ────────────────────────────────────────────────────────────────

    /// Nominal clock in GHz. Resolved on first use, then fixed for the
    /// lifetime of the monitor.
    pub fn base(&self) -> FrequencyValue {
        self.resolve_base().ghz
    }

    pub fn base_source(&self) -> Option<FrequencySource> {
        self.lock().base_frequency.map(|r| r.source)
    }

    fn resolve_base(&self) -> Resolved {
        if let Some(resolved) = self.lock().base_frequency {
            return resolved;
        }

        let resolved = match self.probe.probe_base() {
            ProbeResult::Found(ghz) if in_current_window(ghz) => Resolved {
                ghz,
                source: FrequencySource::Probed(self.probe.name()),
            },
            outcome => {
                log_rejected("base", &outcome);
                let ghz = self.default_base();
                log::warn!("could not determine base frequency, using {:.2} GHz", ghz);
                Resolved {
                    ghz,
                    source: FrequencySource::Default,
                }
            }
        };

        // A concurrent resolver may have finished first; its value stands
        let mut state = self.lock();
        match state.base_frequency {
            Some(existing) => existing,
            None => {
                log::info!("base frequency {:.2} GHz ({})", resolved.ghz, resolved.source);
                state.base_frequency = Some(resolved);
                resolved
            }
        }
    }

    fn default_base(&self) -> FrequencyValue {
        if in_current_window(self.config.default_base_ghz) {
            self.config.default_base_ghz
        } else {
            DEFAULT_BASE_GHZ
        }
    }

    // ─── Max ─────────────────────────────────────────────────────────────────

    /// Turbo ceiling in GHz; never below [`base`](Self::base).
    pub fn max(&self) -> FrequencyValue {
        self.resolve_max().ghz
    }

    pub fn max_source(&self) -> Option<FrequencySource> {
        self.lock().max_frequency.map(|r| r.source)
    }

    fn resolve_max(&self) -> Resolved {
        if let Some(resolved) = self.lock().max_frequency {
            return resolved;
        }

        let base = self.base();
        let resolved = match self.probe.probe_max(base) {
            ProbeResult::Found(ghz) if in_current_window(ghz) && ghz >= base => Resolved {
                ghz,
                source: FrequencySource::Probed(self.probe.name()),
            },
            outcome => {
                log_rejected("max", &outcome);
                Resolved {
                    ghz: (base * self.config.max_fallback_factor)
                        .min(MAX_PLAUSIBLE_GHZ)
                        .max(base),
                    source: FrequencySource::Default,
                }
            }
        };

        let mut state = self.lock();
        match state.max_frequency {
            Some(existing) => existing,
            None => {
                log::info!("max frequency {:.2} GHz ({})", resolved.ghz, resolved.source);
                state.max_frequency = Some(resolved);
                resolved
            }
        }
    }

    // ─── Current ─────────────────────────────────────────────────────────────

    /// Current clock in GHz, always inside `(0.1, 10.0]`.
    pub fn current(&self) -> FrequencyValue {
        self.read_current().ghz
    }

    /// Current clock with its origin.
    ///
    /// A fresh probe is always attempted first. When it fails, the last
    /// accepted reading is reused while younger than `sticky_max_age`;
    /// otherwise the estimator runs on a fresh utilization sample.
    pub fn read_current(&self) -> FrequencyReading {
        let base = self.base();

        match self.probe.probe_current(base) {
            ProbeResult::Found(ghz) if in_current_window(ghz) => {
                return self.store_current(ghz, ReadingOrigin::Probe);
            }
            outcome => log_rejected("current", &outcome),
        }

        if let Some(reading) = self.sticky_current() {
            return reading;
        }

        let max = self.max();
        let utilization = self.sampler.sample_utilization();
        let ghz = estimate_current(base, max, utilization.percent());
        log::debug!(
            "estimated {:.3} GHz from {} load (base {:.2}, max {:.2})",
            ghz,
            utilization,
            base,
            max
        );
        self.store_current(ghz, ReadingOrigin::Estimate)
    }

    fn store_current(&self, ghz: FrequencyValue, origin: ReadingOrigin) -> FrequencyReading {
        let now = Local::now();
        let mut state = self.lock();
        state.current_frequency = ghz;
        state.current_origin = origin;
        state.last_measured_at = Some(Instant::now());
        state.last_measured_wall = Some(now);
        FrequencyReading {
            ghz,
            origin,
            measured_at: now,
        }
    }

    fn sticky_current(&self) -> Option<FrequencyReading> {
        let state = self.lock();
        if state.current_frequency <= 0.0 {
            return None;
        }
        let measured = state.last_measured_at?;
        if let Some(max_age) = self.config.sticky_max_age {
            if measured.elapsed() > max_age {
                log::debug!(
                    "cached {:.3} GHz is older than {:?}, re-estimating",
                    state.current_frequency,
                    max_age
                );
                return None;
            }
        }
        Some(FrequencyReading {
            ghz: state.current_frequency,
            origin: ReadingOrigin::Cache,
            measured_at: state.last_measured_wall.unwrap_or_else(Local::now),
        })
    }

    /// The last accepted current reading, without probing.
    pub fn last_reading(&self) -> Option<FrequencyReading> {
        let state = self.lock();
        if state.current_frequency <= 0.0 {
            return None;
        }
        Some(FrequencyReading {
            ghz: state.current_frequency,
            origin: state.current_origin,
            measured_at: state.last_measured_wall?,
        })
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

fn log_rejected(what: &str, outcome: &ProbeResult) {
    match outcome {
        ProbeResult::Found(ghz) => {
            log::debug!("{} probe: discarding implausible {:.3} GHz", what, ghz)
        }
        ProbeResult::Unavailable(reason) => log::debug!("{} probe: {}", what, reason),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::system::cpu::Unavailable;
    use crate::system::probe::windows::performance_to_ghz;
    use crate::system::sampler::UtilizationSample;

    /// Probe whose answers tests can change between calls. `None` is unavailable.
    #[derive(Default)]
    struct FakeProbe {
        base: Mutex<Option<f64>>,
        max: Mutex<Option<f64>>,
        /// `% Processor Performance` relative to base.
        performance: Mutex<Option<f64>>,
        current_calls: AtomicUsize,
    }

    fn answer(slot: &Mutex<Option<f64>>) -> ProbeResult {
        match *slot.lock().unwrap() {
            Some(v) => ProbeResult::Found(v),
            None => ProbeResult::Unavailable(Unavailable::Unsupported),
        }
    }

    impl FrequencyProbe for Arc<FakeProbe> {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn probe_base(&self) -> ProbeResult {
            answer(&self.base)
        }

        fn probe_max(&self, _base: FrequencyValue) -> ProbeResult {
            answer(&self.max)
        }

        fn probe_current(&self, base: FrequencyValue) -> ProbeResult {
            self.current_calls.fetch_add(1, Ordering::SeqCst);
            match *self.performance.lock().unwrap() {
                Some(percent) => ProbeResult::Found(performance_to_ghz(base, percent)),
                None => ProbeResult::Unavailable(Unavailable::Unsupported),
            }
        }
    }

    struct FixedSampler {
        percent: f64,
        calls: Arc<AtomicUsize>,
    }

    impl LoadSampler for FixedSampler {
        fn sample_utilization(&self) -> UtilizationSample {
            self.calls.fetch_add(1, Ordering::SeqCst);
            UtilizationSample::new(self.percent)
        }
    }

    fn monitor(probe: &Arc<FakeProbe>, percent: f64, config: MonitorConfig) -> (Monitor, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let sampler = FixedSampler {
            percent,
            calls: calls.clone(),
        };
        (
            Monitor::with_parts(Box::new(probe.clone()), Box::new(sampler), config),
            calls,
        )
    }

    #[test]
    fn test_no_probes_uses_defaults_and_estimator() {
        let probe = Arc::new(FakeProbe::default());
        let (mon, samples) = monitor(&probe, 50.0, MonitorConfig::default());

        assert_eq!(mon.base(), 2.0);
        assert!((mon.max() - 2.6).abs() < 1e-9);
        assert_eq!(mon.base_source(), Some(FrequencySource::Default));
        assert_eq!(mon.max_source(), Some(FrequencySource::Default));

        let reading = mon.read_current();
        assert_eq!(reading.origin, ReadingOrigin::Estimate);
        assert!((reading.ghz - estimate_current(2.0, 2.6, 50.0)).abs() < 1e-9);
        assert!(reading.ghz > 0.0);
        assert_eq!(samples.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_counter_above_nominal_is_accepted() {
        let probe = Arc::new(FakeProbe::default());
        *probe.base.lock().unwrap() = Some(2.0);
        *probe.performance.lock().unwrap() = Some(150.0);
        let (mon, samples) = monitor(&probe, 0.0, MonitorConfig::default());

        let reading = mon.read_current();
        assert_eq!(reading.ghz, 3.0);
        assert_eq!(reading.origin, ReadingOrigin::Probe);
        assert_eq!(mon.last_reading().map(|r| r.ghz), Some(3.0));
        assert_eq!(samples.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_implausible_reading_reuses_cached_value() {
        let probe = Arc::new(FakeProbe::default());
        *probe.base.lock().unwrap() = Some(2.0);
        *probe.performance.lock().unwrap() = Some(150.0);
        let (mon, samples) = monitor(&probe, 90.0, MonitorConfig::default());
        assert_eq!(mon.current(), 3.0);

        // 2.0 GHz * 2500% = 50 GHz
        *probe.performance.lock().unwrap() = Some(2500.0);
        let reading = mon.read_current();
        assert_eq!(reading.ghz, 3.0);
        assert_eq!(reading.origin, ReadingOrigin::Cache);

        *probe.performance.lock().unwrap() = None;
        assert_eq!(mon.current(), 3.0);
        assert_eq!(samples.load(Ordering::SeqCst), 0);
        assert_eq!(probe.current_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stale_cache_falls_back_to_estimator() {
        let probe = Arc::new(FakeProbe::default());
        *probe.base.lock().unwrap() = Some(2.0);
        *probe.max.lock().unwrap() = Some(3.0);
        *probe.performance.lock().unwrap() = Some(120.0);
        let config = MonitorConfig {
            sticky_max_age: Some(Duration::from_millis(1)),
            ..MonitorConfig::default()
        };
        let (mon, samples) = monitor(&probe, 100.0, config);
        assert!((mon.current() - 2.4).abs() < 1e-9);

        *probe.performance.lock().unwrap() = None;
        std::thread::sleep(Duration::from_millis(20));
        let reading = mon.read_current();
        assert_eq!(reading.origin, ReadingOrigin::Estimate);
        assert_eq!(reading.ghz, 3.0);
        assert_eq!(samples.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unbounded_stickiness() {
        let probe = Arc::new(FakeProbe::default());
        *probe.base.lock().unwrap() = Some(2.0);
        *probe.performance.lock().unwrap() = Some(100.0);
        let config = MonitorConfig {
            sticky_max_age: None,
            ..MonitorConfig::default()
        };
        let (mon, samples) = monitor(&probe, 100.0, config);
        assert_eq!(mon.current(), 2.0);

        *probe.performance.lock().unwrap() = None;
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(mon.current(), 2.0);
        assert_eq!(samples.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_base_is_resolved_once() {
        let probe = Arc::new(FakeProbe::default());
        *probe.base.lock().unwrap() = Some(3.5);
        let (mon, _) = monitor(&probe, 0.0, MonitorConfig::default());

        assert_eq!(mon.base(), 3.5);
        *probe.base.lock().unwrap() = Some(4.0);
        assert_eq!(mon.base(), 3.5);
        *probe.base.lock().unwrap() = None;
        assert_eq!(mon.base(), 3.5);
        assert_eq!(mon.base_source(), Some(FrequencySource::Probed("fake")));
    }

    #[test]
    fn test_default_base_is_not_retried() {
        let probe = Arc::new(FakeProbe::default());
        let (mon, _) = monitor(&probe, 0.0, MonitorConfig::default());

        assert_eq!(mon.base(), 2.0);
        *probe.base.lock().unwrap() = Some(3.0);
        assert_eq!(mon.base(), 2.0);
    }

    #[test]
    fn test_implausible_base_gets_default() {
        let probe = Arc::new(FakeProbe::default());
        *probe.base.lock().unwrap() = Some(0.0);
        let (mon, _) = monitor(&probe, 0.0, MonitorConfig::default());
        assert_eq!(mon.base(), 2.0);
    }

    #[test]
    fn test_max_below_base_is_rejected() {
        let probe = Arc::new(FakeProbe::default());
        *probe.base.lock().unwrap() = Some(3.0);
        *probe.max.lock().unwrap() = Some(2.5);
        let (mon, _) = monitor(&probe, 0.0, MonitorConfig::default());

        assert!((mon.max() - 3.9).abs() < 1e-9);
        assert!(mon.max() >= mon.base());
    }

    #[test]
    fn test_fallback_max_stays_plausible() {
        let probe = Arc::new(FakeProbe::default());
        *probe.base.lock().unwrap() = Some(9.0);
        let (mon, _) = monitor(&probe, 0.0, MonitorConfig::default());
        assert_eq!(mon.max(), MAX_PLAUSIBLE_GHZ);
    }

    #[test]
    fn test_bad_configured_default_base() {
        let probe = Arc::new(FakeProbe::default());
        let config = MonitorConfig {
            default_base_ghz: -1.0,
            max_fallback_factor: 0.5,
            ..MonitorConfig::default()
        };
        let (mon, _) = monitor(&probe, 0.0, config);
        assert_eq!(mon.base(), DEFAULT_BASE_GHZ);
        assert_eq!(mon.max(), DEFAULT_BASE_GHZ);
    }

    #[test]
    fn test_last_reading_before_any_probe() {
        let probe = Arc::new(FakeProbe::default());
        let (mon, _) = monitor(&probe, 0.0, MonitorConfig::default());
        assert!(mon.last_reading().is_none());
        assert!(mon.base_source().is_none());
    }

    #[test]
    fn test_shared_across_threads() {
        let probe = Arc::new(FakeProbe::default());
        *probe.base.lock().unwrap() = Some(2.4);
        *probe.performance.lock().unwrap() = Some(110.0);
        let (mon, _) = monitor(&probe, 0.0, MonitorConfig::default());
        let mon = Arc::new(mon);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mon = mon.clone();
                std::thread::spawn(move || (mon.base(), mon.max(), mon.current()))
            })
            .collect();

        for handle in handles {
            let (base, max, current) = handle.join().unwrap();
            assert_eq!(base, 2.4);
            assert!(max >= base);
            assert!((current - 2.64).abs() < 1e-9);
        }
    }
}
