//! macOS frequency probing through `sysctl`.
//!
//! Intel Macs report `hw.cpufrequency` / `hw.cpufrequency_max` in Hz.
//! Apple silicon reports neither, so base/max fall through to the brand
//! string and the boost table.
//!
//! `hw.cpufrequency` is the nominal clock and never moves, so there is no
//! live current source here; the monitor estimates from load instead.

use crate::system::cpu::{parse_number, FrequencyValue, ProbeResult, Unavailable};
use crate::system::probe::identify::{self, cpuid};
use crate::system::probe::{run_query, FrequencyProbe};

#[derive(Debug, Default)]
pub struct MacProbe;

fn sysctl(key: &str) -> anyhow::Result<String> {
    run_query("sysctl", &["-n", key])
}

fn sysctl_hz(key: &'static str) -> ProbeResult {
    sysctl(key)
        .map_err(Unavailable::from)
        .and_then(|text| parse_number(key, &text))
        .map(ProbeResult::hz)
        .unwrap_or_else(ProbeResult::Unavailable)
}

fn brand() -> Option<String> {
    sysctl("machdep.cpu.brand_string")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(identify::brand_string)
}

impl FrequencyProbe for MacProbe {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn probe_base(&self) -> ProbeResult {
        sysctl_hz("hw.cpufrequency")
            .or_else("hw.cpufrequency", || {
                identify::probe_brand_frequency(brand().as_deref())
            })
            .or_else("brand string", cpuid::base_frequency)
    }

    fn probe_max(&self, base: FrequencyValue) -> ProbeResult {
        sysctl_hz("hw.cpufrequency_max")
            .or_else("hw.cpufrequency_max", cpuid::max_frequency)
            .or_else("cpuid max", || identify::boost_estimate(base, brand().as_deref()))
    }

    fn probe_current(&self, _base: FrequencyValue) -> ProbeResult {
        ProbeResult::Unavailable(Unavailable::Missing("live clock sysctl"))
    }
}
