//! Linux frequency probing through the kernel's cpufreq sysfs interface and
//! `/proc/cpuinfo`.
//!
//! Nodes read (all cpufreq values are kHz):
//!   /sys/devices/system/cpu/cpuN/cpufreq/scaling_cur_freq  (live, per core)
//!   /sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_cur_freq  (live, root-only on some kernels)
//!   /sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq  (hardware ceiling)
//!   /sys/devices/system/cpu/cpu0/cpufreq/base_frequency  (intel_pstate only)
//!   /proc/cpuinfo "cpu MHz" lines  (static-ish fallback)

use std::fs;
use std::path::{Path, PathBuf};

use crate::system::cpu::{FrequencyValue, ProbeResult, Unavailable};
use crate::system::probe::identify::{self, cpuid};
use crate::system::probe::FrequencyProbe;

/// Probe strategy for Linux. `root` is `/` on a real host.
///
/// CPUID and `sysinfo` describe the running machine, not `root`, so only the
/// default probe consults them. A probe built with [`LinuxProbe::new`] reads
/// nothing outside its tree.
#[derive(Debug, Clone)]
pub struct LinuxProbe {
    root: PathBuf,
    identify_host: bool,
}

impl Default for LinuxProbe {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            identify_host: true,
        }
    }
}

impl LinuxProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            identify_host: false,
        }
    }

    fn cpu_dir(&self) -> PathBuf {
        self.root.join("sys/devices/system/cpu")
    }

    fn cpu0_node(&self, name: &str) -> PathBuf {
        self.cpu_dir().join("cpu0/cpufreq").join(name)
    }

    fn cpuinfo_path(&self) -> PathBuf {
        self.root.join("proc/cpuinfo")
    }

    /// Mean of `scaling_cur_freq` across every core that exposes it.
    fn scaling_cur_freq(&self) -> ProbeResult {
        let dir = self.cpu_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(source) => {
                return ProbeResult::Unavailable(Unavailable::Io { path: dir, source });
            }
        };

        let readings: Vec<f64> = entries
            .filter_map(|e| e.ok())
            .filter(|e| is_cpu_dir_name(&e.file_name().to_string_lossy()))
            .filter_map(|e| read_number(&e.path().join("cpufreq/scaling_cur_freq")).ok())
            .filter(|&khz| khz > 0.0)
            .collect();

        if readings.is_empty() {
            return ProbeResult::Unavailable(Unavailable::Missing("scaling_cur_freq"));
        }
        ProbeResult::khz(readings.iter().sum::<f64>() / readings.len() as f64)
    }

    fn khz_node(&self, name: &str) -> ProbeResult {
        read_number(&self.cpu0_node(name))
            .map(ProbeResult::khz)
            .unwrap_or_else(ProbeResult::Unavailable)
    }

    fn cpuinfo_mhz(&self) -> ProbeResult {
        let path = self.cpuinfo_path();
        match fs::read_to_string(&path) {
            Ok(content) => match mean_cpuinfo_mhz(&content) {
                Some(mhz) => ProbeResult::mhz(mhz),
                None => ProbeResult::Unavailable(Unavailable::Missing("cpu MHz")),
            },
            Err(source) => ProbeResult::Unavailable(Unavailable::Io { path, source }),
        }
    }

    /// Brand from the `model name` line, then CPUID on the host.
    fn brand(&self) -> Option<String> {
        fs::read_to_string(self.cpuinfo_path())
            .ok()
            .and_then(|content| cpuinfo_model_name(&content))
            .or_else(|| self.identify_host.then(identify::brand_string).flatten())
    }

    fn cpuid_base(&self) -> ProbeResult {
        if self.identify_host {
            cpuid::base_frequency()
        } else {
            ProbeResult::Unavailable(Unavailable::Missing("cpuid outside the host root"))
        }
    }

    fn cpuid_max(&self) -> ProbeResult {
        if self.identify_host {
            cpuid::max_frequency()
        } else {
            ProbeResult::Unavailable(Unavailable::Missing("cpuid outside the host root"))
        }
    }
}

impl FrequencyProbe for LinuxProbe {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn probe_base(&self) -> ProbeResult {
        let brand = self.brand();
        identify::probe_brand_frequency(brand.as_deref())
            .or_else("brand string", || self.cpuid_base())
            .or_else("cpuid base", || self.khz_node("base_frequency"))
            .or_else("base_frequency", || self.cpuinfo_mhz())
    }

    fn probe_max(&self, base: FrequencyValue) -> ProbeResult {
        self.khz_node("cpuinfo_max_freq")
            .or_else("cpuinfo_max_freq", || self.cpuid_max())
            .or_else("cpuid max", || identify::boost_estimate(base, self.brand().as_deref()))
    }

    fn probe_current(&self, _base: FrequencyValue) -> ProbeResult {
        self.scaling_cur_freq()
            .or_else("scaling_cur_freq", || self.khz_node("cpuinfo_cur_freq"))
            .or_else("cpuinfo_cur_freq", || self.cpuinfo_mhz())
    }
}

fn is_cpu_dir_name(name: &str) -> bool {
    name.strip_prefix("cpu")
        .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn read_number(path: &Path) -> Result<f64, Unavailable> {
    let text = fs::read_to_string(path).map_err(|source| Unavailable::Io {
        path: path.to_path_buf(),
        source,
    })?;
    crate::system::cpu::parse_number("cpufreq node", &text)
}

/// Mean of the `cpu MHz : 2400.000` lines.
fn mean_cpuinfo_mhz(content: &str) -> Option<f64> {
    let values: Vec<f64> = content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(key, _)| key.trim() == "cpu MHz")
        .filter_map(|(_, value)| value.trim().parse::<f64>().ok())
        .filter(|&mhz| mhz > 0.0)
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn cpuinfo_model_name(content: &str) -> Option<String> {
    content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == "model name")
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}
