//! CPU identification: brand string parsing, CPUID frequency leaves and the
//! boost-factor table used when no platform reports a turbo ceiling.
//!
//! Brand strings look like:
//!   "Intel(R) Core(TM) i7-8700K CPU @ 3.70GHz"
//!   "AMD Ryzen 7 5800X 8-Core Processor"
//!   "Apple M2 Pro"

use crate::system::cpu::{FrequencyValue, ProbeResult, Unavailable};
use crate::system::probe::FrequencyProbe;
use crate::system::sampler::sysinfo_brand;

// ─── Boost heuristic ─────────────────────────────────────────────────────────

/// Turbo multipliers by performance tier, checked in order. Markers are
/// matched as whole words against the brand with trademark marks removed,
/// so "i7" matches both "i7-8700K" and the older "i7 CPU 920".
const BOOST_TIERS: &[(&[&str], f64)] = &[
    (
        &[
            "i9", "i7", "Core Ultra 9", "Core Ultra 7", "Ryzen 9", "Ryzen 7",
            "Threadripper", "Xeon",
        ],
        1.35,
    ),
    (&["i5", "Core Ultra 5", "Ryzen 5"], 1.25),
    (&["i3", "Ryzen 3", "Pentium", "Celeron", "Athlon"], 1.15),
];

const UNKNOWN_TIER_BOOST: f64 = 1.2;

/// `Intel(R) Core(TM) Ultra 7 155H` becomes `Intel Core Ultra 7 155H`.
fn normalize_brand(brand: &str) -> String {
    brand
        .replace("(R)", " ")
        .replace("(TM)", " ")
        .replace("(tm)", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `marker` occurs in `brand` starting at a word and ending at a word or a
/// model-number hyphen.
fn has_marker(brand: &str, marker: &str) -> bool {
    brand.match_indices(marker).any(|(at, _)| {
        let before = brand[..at].chars().next_back();
        let after = brand[at + marker.len()..].chars().next();
        matches!(before, None | Some(' ')) && matches!(after, None | Some(' ') | Some('-'))
    })
}

/// Boost multiplier for a brand string.
pub fn boost_factor(brand: &str) -> f64 {
    let brand = normalize_brand(brand);
    BOOST_TIERS
        .iter()
        .find(|(markers, _)| markers.iter().any(|m| has_marker(&brand, m)))
        .map(|&(_, factor)| factor)
        .unwrap_or(UNKNOWN_TIER_BOOST)
}

/// Estimate the turbo ceiling from the resolved base and the brand tier.
pub fn boost_estimate(base: FrequencyValue, brand: Option<&str>) -> ProbeResult {
    match brand {
        Some(brand) => {
            let factor = boost_factor(brand);
            log::debug!("boost heuristic: {:.2} GHz x {} ({})", base, factor, brand);
            ProbeResult::ghz(base * factor)
        }
        None => ProbeResult::Unavailable(Unavailable::Missing("cpu brand string")),
    }
}

// ─── Brand string ────────────────────────────────────────────────────────────

/// Parse the nominal clock from a brand string (`... @ 3.70GHz`).
pub fn parse_brand_frequency(brand: &str) -> Option<FrequencyValue> {
    let (_, tail) = brand.rsplit_once('@')?;
    let tail = tail.trim_start();
    let end = tail
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(tail.len());
    let value: f64 = tail[..end].parse().ok()?;
    let unit = tail[end..].trim_start();

    if unit.starts_with("GHz") {
        Some(value)
    } else if unit.starts_with("MHz") {
        Some(value / 1000.0)
    } else {
        None
    }
}

/// Brand string from CPUID, or from `sysinfo` on other architectures.
pub fn brand_string() -> Option<String> {
    cpuid::brand_string().or_else(sysinfo_brand)
}

pub fn probe_brand_frequency(brand: Option<&str>) -> ProbeResult {
    let Some(brand) = brand else {
        return ProbeResult::Unavailable(Unavailable::Missing("cpu brand string"));
    };
    match parse_brand_frequency(brand) {
        Some(ghz) => ProbeResult::ghz(ghz),
        None => ProbeResult::Unavailable(Unavailable::Parse {
            what: "brand frequency",
            input: brand.to_string(),
        }),
    }
}

// ─── CPUID ───────────────────────────────────────────────────────────────────

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod cpuid {
    use raw_cpuid::CpuId;

    use crate::system::cpu::{ProbeResult, Unavailable};

    pub fn brand_string() -> Option<String> {
        CpuId::new()
            .get_processor_brand_string()
            .map(|b| b.as_str().trim().to_string())
            .filter(|b| !b.is_empty())
    }

    /// Leaf 0x16 base frequency (MHz). Zero means the leaf is not populated,
    /// which is common under hypervisors and on AMD parts.
    pub fn base_frequency() -> ProbeResult {
        match CpuId::new().get_processor_frequency_info() {
            Some(info) if info.processor_base_frequency() > 0 => {
                ProbeResult::mhz(info.processor_base_frequency() as f64)
            }
            Some(_) => ProbeResult::Unavailable(Unavailable::Missing("cpuid 0x16 base")),
            None => ProbeResult::Unavailable(Unavailable::Missing("cpuid leaf 0x16")),
        }
    }

    pub fn max_frequency() -> ProbeResult {
        match CpuId::new().get_processor_frequency_info() {
            Some(info) if info.processor_max_frequency() > 0 => {
                ProbeResult::mhz(info.processor_max_frequency() as f64)
            }
            Some(_) => ProbeResult::Unavailable(Unavailable::Missing("cpuid 0x16 max")),
            None => ProbeResult::Unavailable(Unavailable::Missing("cpuid leaf 0x16")),
        }
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub mod cpuid {
    use crate::system::cpu::{ProbeResult, Unavailable};

    pub fn brand_string() -> Option<String> {
        None
    }

    pub fn base_frequency() -> ProbeResult {
        ProbeResult::Unavailable(Unavailable::Unsupported)
    }

    pub fn max_frequency() -> ProbeResult {
        ProbeResult::Unavailable(Unavailable::Unsupported)
    }
}

// ─── Strategy ────────────────────────────────────────────────────────────────

/// Identification-only strategy for platforms without a dedicated backend.
#[derive(Debug, Default)]
pub struct IdentificationProbe;

impl FrequencyProbe for IdentificationProbe {
    fn name(&self) -> &'static str {
        "cpuid"
    }

    fn probe_base(&self) -> ProbeResult {
        let brand = brand_string();
        probe_brand_frequency(brand.as_deref()).or_else("brand string", cpuid::base_frequency)
    }

    fn probe_max(&self, base: FrequencyValue) -> ProbeResult {
        cpuid::max_frequency().or_else("cpuid max", || {
            boost_estimate(base, brand_string().as_deref())
        })
    }

    fn probe_current(&self, _base: FrequencyValue) -> ProbeResult {
        ProbeResult::Unavailable(Unavailable::Unsupported)
    }
}
