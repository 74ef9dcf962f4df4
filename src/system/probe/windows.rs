//! Windows frequency probing.
//!
//! Sources, in the order they are tried:
//!   \Processor Information(_Total)\% Processor Performance  (PDH, live)
//!   Win32_Processor.CurrentClockSpeed / MaxClockSpeed  (wmic, then CIM via PowerShell)
//!   HKLM\HARDWARE\DESCRIPTION\System\CentralProcessor\0\~MHz  (registry, static)
//!
//! The PDH and registry leaves only exist on Windows builds; elsewhere they
//! report `Unavailable::Unsupported`, which keeps the strategy testable.

use std::time::Duration;

use anyhow::Context;

use crate::system::cpu::{FrequencyValue, ProbeResult};
use crate::system::probe::identify::{self, cpuid};
use crate::system::probe::{run_query, FrequencyProbe};

#[derive(Debug, Clone)]
pub struct WindowsProbe {
    /// Gap between the two PDH collections.
    counter_delay: Duration,
}

impl WindowsProbe {
    pub fn new(counter_delay: Duration) -> Self {
        Self { counter_delay }
    }
}

impl FrequencyProbe for WindowsProbe {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn probe_base(&self) -> ProbeResult {
        management_mhz("MaxClockSpeed")
            .or_else("MaxClockSpeed", || {
                identify::probe_brand_frequency(identify::brand_string().as_deref())
            })
            .or_else("brand string", cpuid::base_frequency)
            .or_else("cpuid base", || registry::nominal_mhz().into())
    }

    fn probe_max(&self, base: FrequencyValue) -> ProbeResult {
        // Win32_Processor.MaxClockSpeed is the nominal clock, not the turbo ceiling.
        cpuid::max_frequency().or_else("cpuid max", || {
            identify::boost_estimate(base, identify::brand_string().as_deref())
        })
    }

    fn probe_current(&self, base: FrequencyValue) -> ProbeResult {
        let counter: ProbeResult = pdh::processor_performance(self.counter_delay)
            .map(|percent| performance_to_ghz(base, percent))
            .into();
        counter.or_else("processor performance counter", || {
            management_mhz("CurrentClockSpeed")
        })
    }
}

/// `% Processor Performance` is relative to nominal and exceeds 100 under turbo.
pub fn performance_to_ghz(base: FrequencyValue, percent: f64) -> FrequencyValue {
    base * (percent / 100.0)
}

// ─── Management queries ──────────────────────────────────────────────────────

/// Query a Win32_Processor clock property (MHz), averaging across sockets.
fn management_mhz(property: &'static str) -> ProbeResult {
    let result = wmic_mhz(property).or_else(|e| {
        log::debug!("wmic {}: {:#}", property, e);
        cim_mhz(property)
    });
    match result {
        Ok(mhz) => ProbeResult::mhz(mhz),
        Err(e) => ProbeResult::Unavailable(e.into()),
    }
}

fn wmic_mhz(property: &str) -> anyhow::Result<f64> {
    let text = run_query("wmic", &["cpu", "get", property, "/value"])?;
    parse_clock_speeds(&text, property).with_context(|| format!("no {} in wmic output", property))
}

fn cim_mhz(property: &str) -> anyhow::Result<f64> {
    let script = format!(
        "Get-CimInstance Win32_Processor | Select-Object -ExpandProperty {}",
        property
    );
    let text = run_query("powershell", &["-NoProfile", "-NonInteractive", "-Command", script.as_str()])?;
    parse_clock_speeds(&text, property).with_context(|| format!("no {} in CIM output", property))
}

/// Mean of the clock speeds in `Property=3600` or bare `3600` lines.
pub fn parse_clock_speeds(text: &str, property: &str) -> Option<f64> {
    let values: Vec<f64> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.strip_prefix(property)
                .and_then(|rest| rest.strip_prefix('='))
                .unwrap_or(line)
        })
        .filter_map(|v| v.trim().parse::<f64>().ok())
        .filter(|&mhz| mhz > 0.0)
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

// ─── PDH two-sample counter ──────────────────────────────────────────────────

#[cfg(windows)]
mod pdh {
    use std::time::Duration;

    use crate::system::cpu::Unavailable;

    type PdhQueryHandle = isize;
    type PdhCounterHandle = isize;

    const PDH_FMT_DOUBLE: u32 = 0x00000200;
    const PDH_CSTATUS_NEW_DATA: u32 = 0x00000001;

    const PERFORMANCE_COUNTER: &str = "\\Processor Information(_Total)\\% Processor Performance";

    #[repr(C)]
    #[derive(Copy, Clone, Default)]
    #[allow(non_snake_case, non_camel_case_types)]
    struct PDH_FMT_COUNTERVALUE_DOUBLE {
        CStatus: u32,
        doubleValue: f64,
    }

    #[link(name = "pdh")]
    extern "system" {
        fn PdhOpenQueryW(
            szDataSource: *const u16,
            dwUserData: usize,
            phQuery: *mut PdhQueryHandle,
        ) -> u32;

        fn PdhAddEnglishCounterW(
            hQuery: PdhQueryHandle,
            szFullCounterPath: *const u16,
            dwUserData: usize,
            phCounter: *mut PdhCounterHandle,
        ) -> u32;

        fn PdhCollectQueryData(hQuery: PdhQueryHandle) -> u32;

        fn PdhGetFormattedCounterValue(
            hCounter: PdhCounterHandle,
            dwFormat: u32,
            lpdwType: *mut u32,
            pValue: *mut PDH_FMT_COUNTERVALUE_DOUBLE,
        ) -> u32;

        fn PdhCloseQuery(hQuery: PdhQueryHandle) -> u32;
    }

    /// Open PDH query; closing it also releases every counter added to it.
    struct Query(PdhQueryHandle);

    impl Query {
        fn open() -> Result<Self, Unavailable> {
            let mut handle: PdhQueryHandle = 0;
            let status = unsafe { PdhOpenQueryW(std::ptr::null(), 0, &mut handle) };
            check("PdhOpenQueryW", status)?;
            Ok(Self(handle))
        }

        fn add_counter(&self, path: &str) -> Result<PdhCounterHandle, Unavailable> {
            let wide = to_wide(path);
            let mut counter: PdhCounterHandle = 0;
            let status = unsafe { PdhAddEnglishCounterW(self.0, wide.as_ptr(), 0, &mut counter) };
            check("PdhAddEnglishCounterW", status)?;
            Ok(counter)
        }

        fn collect(&self) -> Result<(), Unavailable> {
            check("PdhCollectQueryData", unsafe { PdhCollectQueryData(self.0) })
        }
    }

    impl Drop for Query {
        fn drop(&mut self) {
            if self.0 != 0 {
                unsafe { PdhCloseQuery(self.0) };
            }
        }
    }

    /// Sample `% Processor Performance` twice, `delay` apart.
    pub fn processor_performance(delay: Duration) -> Result<f64, Unavailable> {
        let query = Query::open()?;
        let counter = query.add_counter(PERFORMANCE_COUNTER)?;

        // Rate counter: the first collection is only a baseline
        query.collect()?;
        std::thread::sleep(delay);
        query.collect()?;

        let mut value = PDH_FMT_COUNTERVALUE_DOUBLE::default();
        let status = unsafe {
            PdhGetFormattedCounterValue(counter, PDH_FMT_DOUBLE, std::ptr::null_mut(), &mut value)
        };
        check("PdhGetFormattedCounterValue", status)?;
        if value.CStatus > PDH_CSTATUS_NEW_DATA {
            return Err(Unavailable::Counter {
                call: "CStatus",
                status: value.CStatus,
            });
        }

        log::debug!("processor performance: {:.1}%", value.doubleValue);
        Ok(value.doubleValue)
    }

    fn check(call: &'static str, status: u32) -> Result<(), Unavailable> {
        if status == 0 {
            Ok(())
        } else {
            Err(Unavailable::Counter { call, status })
        }
    }

    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }
}

#[cfg(not(windows))]
mod pdh {
    use std::time::Duration;

    use crate::system::cpu::Unavailable;

    pub fn processor_performance(_delay: Duration) -> Result<f64, Unavailable> {
        Err(Unavailable::Unsupported)
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[cfg(windows)]
mod registry {
    use std::ffi::c_void;

    use ::windows::core::w;
    use ::windows::Win32::Foundation::ERROR_SUCCESS;
    use ::windows::Win32::System::Registry::{RegGetValueW, HKEY_LOCAL_MACHINE, RRF_RT_REG_DWORD};

    use crate::system::cpu::{FrequencyValue, Unavailable};

    /// `~MHz` of the first processor, written by the firmware at boot.
    pub fn nominal_mhz() -> Result<FrequencyValue, Unavailable> {
        let mut mhz: u32 = 0;
        let mut size = std::mem::size_of::<u32>() as u32;

        let status = unsafe {
            RegGetValueW(
                HKEY_LOCAL_MACHINE,
                w!("HARDWARE\\DESCRIPTION\\System\\CentralProcessor\\0"),
                w!("~MHz"),
                RRF_RT_REG_DWORD,
                None,
                Some(&mut mhz as *mut u32 as *mut c_void),
                Some(&mut size),
            )
        };

        if status != ERROR_SUCCESS {
            return Err(Unavailable::Registry {
                value: "CentralProcessor\\0\\~MHz",
                status: status.0,
            });
        }
        Ok(mhz as f64 / 1000.0)
    }
}

#[cfg(not(windows))]
mod registry {
    use crate::system::cpu::{FrequencyValue, Unavailable};

    pub fn nominal_mhz() -> Result<FrequencyValue, Unavailable> {
        Err(Unavailable::Unsupported)
    }
}
